//! The continuation-passing evaluation engine.
//!
//! [`evaluate`] never computes a final value directly: it returns a
//! zero-argument suspended step ([`Thunk`]) that, when invoked, performs
//! one unit of work and either queues another step or lands on a plain
//! value ([`Step::Done`]). The continuation argument is itself a function
//! from a computed value to the next step; every evaluation path threads
//! one explicitly, which is what keeps the host stack bounded and what
//! makes `letcc` cheap - it just wraps the continuation already in hand
//! in an invokable [`Continuation`] value.
//!
//! Special forms live in a fixed dispatch table consulted for the
//! operator symbol *before* application dispatch, so `if`, `lambda`, and
//! friends cannot be rebound in operator position. Everything else is a
//! procedure application: operator first, then arguments left to right,
//! then [`apply`].
//!
//! Environments are parent-linked chains of mutable frames rooted at the
//! global frame. `define` always writes to the root frame, wherever it
//! lexically occurs; `set!` mutates the innermost existing binding.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Closure, Continuation, Value};
use crate::builtinops::BUILTIN_OPS;
use crate::Error;

/// One frame of the environment chain.
pub struct Environment {
    parent: Option<EnvRef>,
    bindings: HashMap<String, Value>,
}

pub type EnvRef = Rc<RefCell<Environment>>;

impl Environment {
    /// The root frame, pre-populated with the builtin procedures.
    pub fn global() -> EnvRef {
        let mut bindings = HashMap::new();
        for op in BUILTIN_OPS {
            bindings.insert(op.name.to_owned(), Value::Builtin(op));
        }
        Rc::new(RefCell::new(Environment {
            parent: None,
            bindings,
        }))
    }

    /// A fresh empty frame whose parent is `parent`.
    pub fn child_of(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            parent: Some(Rc::clone(parent)),
            bindings: HashMap::new(),
        }))
    }

    /// Insert a binding directly into `env`'s own frame. Used for closure
    /// formals and `letcc` names; `define` goes through
    /// [`Environment::define_global`] instead.
    pub fn bind(env: &EnvRef, name: &str, value: Value) {
        env.borrow_mut().bindings.insert(name.to_owned(), value);
    }

    /// Walk frames innermost to outermost for `name`.
    pub fn lookup(env: &EnvRef, name: &str) -> Result<Value, Error> {
        let mut frame = Rc::clone(env);
        loop {
            if let Some(value) = frame.borrow().bindings.get(name) {
                return Ok(value.clone());
            }
            let parent = frame.borrow().parent.clone();
            match parent {
                Some(next) => frame = next,
                None => return Err(Error::Unbound(format!("\"{name}\" is undefined"))),
            }
        }
    }

    /// Same walk as [`Environment::lookup`] without the error.
    pub fn is_bound(env: &EnvRef, name: &str) -> bool {
        let mut frame = Rc::clone(env);
        loop {
            if frame.borrow().bindings.contains_key(name) {
                return true;
            }
            let parent = frame.borrow().parent.clone();
            match parent {
                Some(next) => frame = next,
                None => return false,
            }
        }
    }

    /// `set!` semantics: mutate the innermost frame that already contains
    /// `name`.
    pub fn assign(env: &EnvRef, name: &str, value: Value) -> Result<(), Error> {
        let mut frame = Rc::clone(env);
        loop {
            if frame.borrow().bindings.contains_key(name) {
                frame.borrow_mut().bindings.insert(name.to_owned(), value);
                return Ok(());
            }
            let parent = frame.borrow().parent.clone();
            match parent {
                Some(next) => frame = next,
                None => {
                    return Err(Error::Unbound(format!("cannot assign {name}: not bound")));
                }
            }
        }
    }

    /// `define` semantics: always write into the chain's root frame, no
    /// matter which frame lexically issued the define.
    pub fn define_global(env: &EnvRef, name: &str, value: Value) {
        let mut frame = Rc::clone(env);
        loop {
            let parent = frame.borrow().parent.clone();
            match parent {
                Some(next) => frame = next,
                None => break,
            }
        }
        frame.borrow_mut().bindings.insert(name.to_owned(), value);
    }
}

/// Result of invoking a suspended step: either more work, or (at the root
/// continuation only) the expression's final value.
pub enum Step {
    Continue(Thunk),
    Done(Value),
}

/// A zero-argument suspended computation, the unit the trampoline drives.
pub type Thunk = Box<dyn FnOnce() -> Result<Step, Error>>;

/// A continuation: from a computed value to the next step. Shared via
/// `Rc` because `letcc` continuations may be invoked any number of times.
pub type Cont = Rc<dyn Fn(Value) -> Result<Step, Error>>;

type SpecialFormFn = fn(Value, EnvRef, Cont) -> Result<Step, Error>;

/// Special forms, consulted for operator symbols before application
/// dispatch. These names permanently shadow variable lookup in operator
/// position.
static SPECIAL_FORMS: phf::Map<&'static str, SpecialFormFn> = phf::phf_map! {
    "quote" => eval_quote,
    "if" => eval_if,
    "lambda" => eval_lambda,
    "letcc" => eval_letcc,
    "define" => eval_define,
    "set!" => eval_set,
    "begin" => eval_begin,
    "apply" => eval_apply,
};

fn special_form(name: &str) -> Option<SpecialFormFn> {
    SPECIAL_FORMS.get(name).copied()
}

/// Evaluate `expr`, delivering its value to `cont`. Returns a suspended
/// step rather than recursing, so calling this costs no host stack.
pub fn evaluate(expr: Value, env: EnvRef, cont: Cont) -> Thunk {
    Box::new(move || {
        log::trace!("eval: {expr}");
        match expr {
            Value::Number(_) | Value::Boolean(_) | Value::EmptyList => cont(expr),
            Value::Symbol(name) => cont(Environment::lookup(&env, &name)?),
            Value::Pair(pair) => {
                if let Value::Symbol(operator) = &pair.car {
                    if let Some(form) = special_form(operator) {
                        return form(pair.cdr.clone(), env, cont);
                    }
                }

                // Procedure application: operator, then arguments left to
                // right, then apply.
                let operator = pair.car.clone();
                let operands = pair.cdr.clone();
                let operator_env = Rc::clone(&env);
                let operator_cont: Cont = Rc::new(move |procedure: Value| {
                    if let Value::Undefined(origin) = &procedure {
                        return Err(Error::undefined_use(origin, "as a procedure"));
                    }
                    let cont = Rc::clone(&cont);
                    let apply_cont: Cont = Rc::new(move |args: Value| {
                        apply(procedure.clone(), args, Rc::clone(&cont))
                    });
                    Ok(Step::Continue(evaluate_list(
                        operands.clone(),
                        Rc::clone(&env),
                        apply_cont,
                    )))
                });
                Ok(Step::Continue(evaluate(operator, operator_env, operator_cont)))
            }
            other => Err(Error::Type(format!("cannot evaluate {other}"))),
        }
    })
}

/// Evaluate every expression of a proper list left to right, delivering
/// the list of evaluated values to `cont`.
fn evaluate_list(exprs: Value, env: EnvRef, cont: Cont) -> Thunk {
    Box::new(move || match exprs {
        Value::EmptyList => cont(Value::EmptyList),
        Value::Pair(pair) => {
            let rest = pair.cdr.clone();
            let first_env = Rc::clone(&env);
            let first_cont: Cont = Rc::new(move |first_value: Value| {
                if let Value::Undefined(origin) = &first_value {
                    return Err(Error::undefined_use(origin, "as an argument"));
                }
                let cont = Rc::clone(&cont);
                let collect_cont: Cont = Rc::new(move |rest_values: Value| {
                    cont(Value::cons(first_value.clone(), rest_values))
                });
                Ok(Step::Continue(evaluate_list(
                    rest.clone(),
                    Rc::clone(&env),
                    collect_cont,
                )))
            });
            Ok(Step::Continue(evaluate(pair.car.clone(), first_env, first_cont)))
        }
        other => Err(Error::Type(format!(
            "cannot evaluate an improper argument list: {other}"
        ))),
    })
}

/// Apply an already-evaluated procedure to an already-evaluated argument
/// list.
pub fn apply(procedure: Value, args: Value, cont: Cont) -> Result<Step, Error> {
    match procedure {
        Value::Closure(closure) => {
            let frame = Environment::child_of(&closure.env);
            let mut formals = &closure.formals;
            let mut remaining = &args;
            loop {
                match (formals, remaining) {
                    (Value::EmptyList, Value::EmptyList) => break,
                    (Value::EmptyList, _) => {
                        return Err(Error::Arity("too many arguments".to_owned()));
                    }
                    (_, Value::EmptyList) => {
                        return Err(Error::Arity("not enough arguments".to_owned()));
                    }
                    (Value::Pair(formal), Value::Pair(arg)) => {
                        if let Value::Symbol(name) = &formal.car {
                            Environment::bind(&frame, name, arg.car.clone());
                        }
                        formals = &formal.cdr;
                        remaining = &arg.cdr;
                    }
                    // `lambda` validated the formals and `evaluate_list`
                    // always builds proper lists.
                    _ => {
                        return Err(Error::Type(
                            "malformed formals in procedure application".to_owned(),
                        ));
                    }
                }
            }
            Ok(Step::Continue(evaluate(closure.body.clone(), frame, cont)))
        }
        Value::Continuation(k) => match &args {
            Value::Pair(pair) if matches!(pair.cdr, Value::EmptyList) => {
                // Escape: drive evaluation through the captured
                // continuation, discarding `cont` entirely.
                k.invoke(pair.car.clone())
            }
            _ => Err(Error::Arity(
                "a continuation must take exactly one argument".to_owned(),
            )),
        },
        Value::Builtin(op) => {
            let arg_count = args
                .list_len()
                .ok_or_else(|| Error::Type(format!("{} applied to an improper list", op.name)))?;
            op.validate_arity(arg_count)?;
            cont((op.func)(&args)?)
        }
        other => Err(Error::Type(format!("cannot apply {other}"))),
    }
}

//
// Special forms
//

/// Destructure a special form's unevaluated argument list into exactly N
/// expressions.
fn form_args<const N: usize>(form: &str, args: &Value) -> Result<[Value; N], Error> {
    let items: Vec<Value> = args.iter_list().cloned().collect();
    if args.list_len() != Some(N) {
        return Err(Error::Arity(format!(
            "{form} must take exactly {} argument{}",
            spelled(N),
            if N == 1 { "" } else { "s" }
        )));
    }
    // Length was just checked.
    items
        .try_into()
        .map_err(|_| Error::Arity(format!("{form}: malformed argument list")))
}

fn spelled(n: usize) -> &'static str {
    match n {
        1 => "one",
        2 => "two",
        3 => "three",
        _ => "several",
    }
}

/// `(quote E)` returns E unevaluated.
fn eval_quote(args: Value, _env: EnvRef, cont: Cont) -> Result<Step, Error> {
    let [quoted] = form_args("quote", &args)?;
    cont(quoted)
}

/// `(if TEST THEN ELSE)` evaluates exactly one branch; any test value
/// other than `#f` is truthy.
fn eval_if(args: Value, env: EnvRef, cont: Cont) -> Result<Step, Error> {
    let [test, then_branch, else_branch] = form_args("if", &args)?;
    let test_env = Rc::clone(&env);
    let branch_cont: Cont = Rc::new(move |tested: Value| {
        if let Value::Undefined(origin) = &tested {
            return Err(Error::undefined_use(origin, "as a condition"));
        }
        let branch = if tested.is_truthy() {
            then_branch.clone()
        } else {
            else_branch.clone()
        };
        Ok(Step::Continue(evaluate(
            branch,
            Rc::clone(&env),
            Rc::clone(&cont),
        )))
    });
    Ok(Step::Continue(evaluate(test, test_env, branch_cont)))
}

/// `(lambda FORMALS BODY)` closes over the current environment. FORMALS
/// must be a proper list of distinct symbols (or the empty list).
fn eval_lambda(args: Value, env: EnvRef, cont: Cont) -> Result<Step, Error> {
    let [formals, body] = form_args("lambda", &args)?;

    let mut seen: Vec<&str> = Vec::new();
    let mut cursor = &formals;
    loop {
        match cursor {
            Value::EmptyList => break,
            Value::Pair(pair) => {
                match &pair.car {
                    Value::Symbol(name) => {
                        if seen.contains(&name.as_str()) {
                            return Err(Error::Type(format!("duplicate formal name: {name}")));
                        }
                        seen.push(name);
                    }
                    other => {
                        return Err(Error::Type(format!(
                            "lambda's formals must be symbols, not {other}"
                        )));
                    }
                }
                cursor = &pair.cdr;
            }
            other => {
                return Err(Error::Type(format!(
                    "lambda's formals must be a proper list, not {other}"
                )));
            }
        }
    }

    cont(Value::Closure(Rc::new(Closure { formals, body, env })))
}

/// `(letcc NAME BODY)` binds NAME to the current continuation in a fresh
/// child frame and evaluates BODY there, under the original continuation.
fn eval_letcc(args: Value, env: EnvRef, cont: Cont) -> Result<Step, Error> {
    let [name_expr, body] = form_args("letcc", &args)?;
    let Value::Symbol(name) = name_expr else {
        return Err(Error::Type(format!(
            "letcc's first argument must be a symbol, not {name_expr}"
        )));
    };
    let frame = Environment::child_of(&env);
    Environment::bind(
        &frame,
        &name,
        Value::Continuation(Continuation::new(Rc::clone(&cont))),
    );
    Ok(Step::Continue(evaluate(body, frame, cont)))
}

/// `(define NAME E)` evaluates E and writes it into the global frame,
/// yielding the undefined-value marker.
fn eval_define(args: Value, env: EnvRef, cont: Cont) -> Result<Step, Error> {
    let [name_expr, value_expr] = form_args("define", &args)?;
    let Value::Symbol(name) = name_expr else {
        return Err(Error::Type(format!(
            "define's first argument must be a symbol, not {name_expr}"
        )));
    };
    let value_env = Rc::clone(&env);
    let define_cont: Cont = Rc::new(move |value: Value| {
        Environment::define_global(&env, &name, value);
        cont(Value::Undefined("define"))
    });
    Ok(Step::Continue(evaluate(value_expr, value_env, define_cont)))
}

/// `(set! NAME E)` requires NAME to be bound somewhere in the chain, then
/// mutates the innermost existing binding, yielding the undefined-value
/// marker.
fn eval_set(args: Value, env: EnvRef, cont: Cont) -> Result<Step, Error> {
    let [name_expr, value_expr] = form_args("set!", &args)?;
    let Value::Symbol(name) = name_expr else {
        return Err(Error::Type(format!(
            "set!'s first argument must be a symbol, not {name_expr}"
        )));
    };
    if !Environment::is_bound(&env, &name) {
        return Err(Error::Unbound(format!("cannot assign {name}: not bound")));
    }
    let value_env = Rc::clone(&env);
    let assign_cont: Cont = Rc::new(move |value: Value| {
        Environment::assign(&env, &name, value)?;
        cont(Value::Undefined("set!"))
    });
    Ok(Step::Continue(evaluate(value_expr, value_env, assign_cont)))
}

/// `(begin E ...)` evaluates each expression in order for effect; the last
/// one's value is the result.
fn eval_begin(args: Value, env: EnvRef, cont: Cont) -> Result<Step, Error> {
    if matches!(args, Value::EmptyList) {
        return Err(Error::Arity(
            "begin must take at least one argument".to_owned(),
        ));
    }
    eval_sequence(args, env, cont)
}

fn eval_sequence(exprs: Value, env: EnvRef, cont: Cont) -> Result<Step, Error> {
    match exprs {
        Value::Pair(pair) => {
            let first = pair.car.clone();
            let rest = pair.cdr.clone();
            if matches!(rest, Value::EmptyList) {
                return Ok(Step::Continue(evaluate(first, env, cont)));
            }
            let first_env = Rc::clone(&env);
            let next_cont: Cont = Rc::new(move |_discarded: Value| {
                eval_sequence(rest.clone(), Rc::clone(&env), Rc::clone(&cont))
            });
            Ok(Step::Continue(evaluate(first, first_env, next_cont)))
        }
        other => Err(Error::Type(format!(
            "begin expects a proper list of forms, not {other}"
        ))),
    }
}

/// `(apply PROC ARGS)` evaluates PROC and ARGS, then applies PROC to the
/// elements of the ARGS list. Kept as a special form so the application
/// consumes no extra native stack frames.
fn eval_apply(args: Value, env: EnvRef, cont: Cont) -> Result<Step, Error> {
    let [procedure_expr, list_expr] = form_args("apply", &args)?;
    let procedure_env = Rc::clone(&env);
    let procedure_cont: Cont = Rc::new(move |procedure: Value| {
        if let Value::Undefined(origin) = &procedure {
            return Err(Error::undefined_use(origin, "as a procedure"));
        }
        let cont = Rc::clone(&cont);
        let args_cont: Cont = Rc::new(move |arg_list: Value| {
            if let Value::Undefined(origin) = &arg_list {
                return Err(Error::undefined_use(origin, "as an argument list"));
            }
            if !arg_list.is_proper_list() {
                return Err(Error::Type(format!(
                    "apply's second argument must be a proper list, not {arg_list}"
                )));
            }
            apply(procedure.clone(), arg_list, Rc::clone(&cont))
        });
        Ok(Step::Continue(evaluate(
            list_expr.clone(),
            Rc::clone(&env),
            args_cont,
        )))
    });
    Ok(Step::Continue(evaluate(
        procedure_expr,
        procedure_env,
        procedure_cont,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{read, Tokenizer};

    /// Read every top-level expression in `source` and trampoline each to
    /// completion against a single shared global environment.
    fn eval_source(source: &str) -> Result<Vec<Value>, Error> {
        let env = Environment::global();
        let mut tokenizer = Tokenizer::new(source);
        let mut results = Vec::new();
        while let Some(expr) = read(&mut tokenizer)? {
            let done: Cont = Rc::new(|value| Ok(Step::Done(value)));
            let mut step = Step::Continue(evaluate(expr, Rc::clone(&env), done));
            loop {
                match step {
                    Step::Continue(thunk) => step = thunk()?,
                    Step::Done(value) => {
                        results.push(value);
                        break;
                    }
                }
            }
        }
        Ok(results)
    }

    /// Evaluate a single expression.
    fn eval_one(source: &str) -> Result<Value, Error> {
        eval_source(source).map(|mut results| results.pop().expect("no expression in source"))
    }

    fn number(n: i64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_core_evaluation_data_driven() {
        let test_cases = vec![
            // Self-evaluating expressions
            ("42", "42"),
            ("-17", "-17"),
            ("#t", "#t"),
            ("#f", "#f"),
            ("()", "()"),
            // if: only the literal #f is falsy, and only one branch runs
            ("(if #t 1 2)", "1"),
            ("(if #f 1 2)", "2"),
            ("(if 0 1 2)", "1"),
            ("(if () 1 2)", "1"),
            ("(if (< 1 2) (+ 1 1) (+ 2 2))", "2"),
            // Arithmetic
            ("(+ 1 2 3)", "6"),
            ("(+)", "0"),
            ("(*)", "1"),
            ("(* 2 3 4)", "24"),
            ("(- 5 2)", "3"),
            ("(add1 41)", "42"),
            ("(sub1 43)", "42"),
            ("(< 1 2)", "#t"),
            ("(> 1 2)", "#f"),
            // quote
            ("(quote a)", "a"),
            ("'(1 2 3)", "(1 2 3)"),
            ("''a", "(quote a)"),
            // List builtins
            ("(list 1 2 3)", "(1 2 3)"),
            ("(list)", "()"),
            ("(cons 1 '(2 3))", "(1 2 3)"),
            ("(car '(1 2))", "1"),
            ("(cdr '(1 2))", "(2)"),
            ("(null? '())", "#t"),
            ("(null? '(1))", "#f"),
            ("(atom? 'a)", "#t"),
            ("(atom? '(a))", "#f"),
            ("(not #f)", "#t"),
            ("(not 0)", "#f"),
            ("(eq? 'a 'a)", "#t"),
            ("(eq? 'a 'b)", "#f"),
            // lambda and application
            ("((lambda (x) x) 7)", "7"),
            ("((lambda (x y) (+ x y)) 3 4)", "7"),
            ("((lambda () 9))", "9"),
            ("((lambda (f) (f 2 3)) +)", "5"),
            // Operator position may be any expression
            ("((if #t + *) 2 3)", "5"),
            ("((if #f + *) 2 3)", "6"),
            // begin
            ("(begin 1 2 3)", "3"),
            // apply
            ("(apply + (list 1 2 3))", "6"),
            ("(apply car (list (list 1 2)))", "1"),
            // letcc escaping
            ("(letcc k (+ 1 (k 42)))", "42"),
            ("(letcc k 5)", "5"),
            ("(+ 1 (letcc k (+ 10 (k 2))))", "3"),
        ];

        for (source, expected) in test_cases {
            let value = eval_one(source).unwrap_or_else(|error| {
                panic!("failed to evaluate {source:?}: {error}");
            });
            assert_eq!(value.to_string(), expected, "source: {source:?}");
        }
    }

    #[test]
    fn test_error_cases_data_driven() {
        let test_cases: Vec<(&str, fn(&Error) -> bool)> = vec![
            ("nope", |e| matches!(e, Error::Unbound(_))),
            ("(set! never-defined 1)", |e| matches!(e, Error::Unbound(_))),
            ("(quote)", |e| matches!(e, Error::Arity(_))),
            ("(quote a b)", |e| matches!(e, Error::Arity(_))),
            ("(if #t 1)", |e| matches!(e, Error::Arity(_))),
            ("(begin)", |e| matches!(e, Error::Arity(_))),
            ("(lambda (x))", |e| matches!(e, Error::Arity(_))),
            ("(lambda 5 x)", |e| matches!(e, Error::Type(_))),
            ("(lambda (5) x)", |e| matches!(e, Error::Type(_))),
            ("(lambda (x x) x)", |e| matches!(e, Error::Type(_))),
            ("(define 5 1)", |e| matches!(e, Error::Type(_))),
            ("(set! 5 1)", |e| matches!(e, Error::Type(_))),
            ("(letcc 5 1)", |e| matches!(e, Error::Type(_))),
            ("((lambda (x) x))", |e| matches!(e, Error::Arity(_))),
            ("((lambda (x) x) 1 2)", |e| matches!(e, Error::Arity(_))),
            ("(5 1)", |e| matches!(e, Error::Type(_))),
            ("(car 5)", |e| matches!(e, Error::Type(_))),
            ("(cons 1 2)", |e| matches!(e, Error::Type(_))),
            ("(- 5)", |e| matches!(e, Error::Arity(_))),
            ("(< 1 2 3)", |e| matches!(e, Error::Arity(_))),
            ("(apply + 5)", |e| matches!(e, Error::Type(_))),
            ("(+ 1 (define x 2))", |e| matches!(e, Error::UndefinedValue(_))),
            ("(if (define x 2) 1 2)", |e| matches!(e, Error::UndefinedValue(_))),
            ("((define x 2))", |e| matches!(e, Error::UndefinedValue(_))),
        ];

        for (source, matches_expected) in test_cases {
            let error = eval_source(source).expect_err(source);
            assert!(matches_expected(&error), "source: {source:?}, got: {error}");
        }
    }

    #[test]
    fn test_closure_arity_messages() {
        let not_enough = eval_one("((lambda (x) x))").unwrap_err();
        assert_eq!(not_enough.to_string(), "not enough arguments");

        let too_many = eval_one("((lambda (x) x) 1 2)").unwrap_err();
        assert_eq!(too_many.to_string(), "too many arguments");
    }

    #[test]
    fn test_define_and_set_sequencing() {
        let results = eval_source("(define x 5) (set! x (+ x 1)) x").unwrap();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Value::Undefined("define")));
        assert!(matches!(results[1], Value::Undefined("set!")));
        assert_eq!(results[2], number(6));
    }

    #[test]
    fn test_define_targets_global_frame_from_nested_scope() {
        let results = eval_source(
            "((lambda (ignored) (define inner 10)) 0) \
             inner",
        )
        .unwrap();
        assert_eq!(results[1], number(10));
    }

    #[test]
    fn test_set_mutates_innermost_binding() {
        let results = eval_source(
            "(define x 1) \
             ((lambda (x) (begin (set! x 99) x)) 2) \
             x",
        )
        .unwrap();
        assert_eq!(results[1], number(99));
        assert_eq!(results[2], number(1));
    }

    #[test]
    fn test_closures_capture_their_environment() {
        let results = eval_source(
            "(define make-adder (lambda (n) (lambda (m) (+ n m)))) \
             (define add3 (make-adder 3)) \
             (add3 4)",
        )
        .unwrap();
        assert_eq!(results[2], number(7));
    }

    #[test]
    fn test_recursion_through_global_define() {
        let results = eval_source(
            "(define fact (lambda (n) (if (< n 2) 1 (* n (fact (- n 1)))))) \
             (fact 10)",
        )
        .unwrap();
        assert_eq!(results[1], number(3628800));
    }

    #[test]
    fn test_deep_recursion_is_stack_bounded() {
        let results = eval_source(
            "(define countdown (lambda (n) (if (< n 1) 0 (countdown (- n 1))))) \
             (countdown 100000)",
        )
        .unwrap();
        assert_eq!(results[1], number(0));
    }

    #[test]
    fn test_quote_is_idempotent() {
        let first = eval_one("(quote (a (b) 3))").unwrap();
        let second = eval_one("(quote (a (b) 3))").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "(a (b) 3)");
    }

    #[test]
    fn test_special_forms_shadow_bindings_in_operator_position() {
        let results = eval_source("(define if 3) (if #t 1 2) if").unwrap();
        assert_eq!(results[1], number(1));
        assert_eq!(results[2], number(3));
    }

    #[test]
    fn test_letcc_continuation_survives_its_form() {
        let results = eval_source(
            "(define saved 0) \
             (define r (+ 1 (letcc k (begin (set! saved k) 1)))) \
             r \
             (saved 10) \
             r \
             (saved 20) \
             r",
        )
        .unwrap();
        // The captured continuation re-runs (define r (+ 1 [])) each time
        // it is invoked, from any later top-level expression.
        assert_eq!(results[2], number(2));
        assert_eq!(results[4], number(11));
        assert_eq!(results[6], number(21));
    }

    #[test]
    fn test_continuations_are_first_class() {
        let results = eval_source(
            "(define call-with-42 (lambda (k) (k 42))) \
             (+ 1 (letcc k (call-with-42 k)))",
        )
        .unwrap();
        assert_eq!(results[1], number(43));
    }

    #[test]
    fn test_continuation_requires_one_argument() {
        let error = eval_one("(letcc k (k 1 2))").unwrap_err();
        assert_eq!(
            error.to_string(),
            "a continuation must take exactly one argument"
        );
    }

    #[test]
    fn test_apply_goes_through_continuations() {
        let results = eval_source("(+ 1 (letcc k (apply k (list 5))))").unwrap();
        assert_eq!(results[0], number(6));
    }

    #[test]
    fn test_environment_operations() {
        let global = Environment::global();
        Environment::bind(&global, "x", number(1));
        assert!(Environment::is_bound(&global, "x"));
        assert!(!Environment::is_bound(&global, "y"));
        assert_eq!(Environment::lookup(&global, "x").unwrap(), number(1));
        assert!(matches!(
            Environment::lookup(&global, "y"),
            Err(Error::Unbound(_))
        ));

        let child = Environment::child_of(&global);
        assert_eq!(Environment::lookup(&child, "x").unwrap(), number(1));

        // assign mutates the innermost frame containing the name
        Environment::bind(&child, "x", number(2));
        Environment::assign(&child, "x", number(3)).unwrap();
        assert_eq!(Environment::lookup(&child, "x").unwrap(), number(3));
        assert_eq!(Environment::lookup(&global, "x").unwrap(), number(1));

        // define_global writes through to the root
        Environment::define_global(&child, "z", number(9));
        assert_eq!(Environment::lookup(&global, "z").unwrap(), number(9));

        assert!(matches!(
            Environment::assign(&child, "missing", number(0)),
            Err(Error::Unbound(_))
        ));
    }

    #[test]
    fn test_builtins_are_ordinary_bindings() {
        // Builtins can be shadowed by define; special forms cannot.
        let results = eval_source("(define + -) (+ 5 2)").unwrap();
        assert_eq!(results[1], number(3));
    }

    #[test]
    fn test_unbound_error_message() {
        let error = eval_one("mystery").unwrap_err();
        assert_eq!(error.to_string(), "\"mystery\" is undefined");
    }
}
