//! Built-in procedure registry.
//!
//! Builtins are ordinary procedure values: the global environment is
//! populated from [`BUILTIN_OPS`] at construction, so `+` can be passed
//! around, stored in lists, and shadowed by `define` like any other
//! binding. Each entry carries its arity, validated by the evaluator
//! before the implementation runs.
//!
//! Unlike special forms, builtins receive the full *evaluated* argument
//! list and compute synchronously; they may recurse natively, but only in
//! proportion to the argument count, never to the evaluated program's
//! recursion depth.
//!
//! Arithmetic is exact `i64` arithmetic with checked operations: the value
//! domain is whole numbers, so overflow is reported as an error rather
//! than wrapped or rounded.

use crate::ast::{Number, Value};
use crate::Error;

/// Expected number of arguments for a builtin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub(crate) fn validate(&self, name: &str, got: usize) -> Result<(), Error> {
        match *self {
            Arity::Exact(expected) if got != expected => Err(Error::Arity(format!(
                "{name} must take exactly {} argument{}, got {got}",
                expected,
                if expected == 1 { "" } else { "s" }
            ))),
            Arity::AtLeast(expected) if got < expected => Err(Error::Arity(format!(
                "{name} must take at least {} argument{}, got {got}",
                expected,
                if expected == 1 { "" } else { "s" }
            ))),
            _ => Ok(()),
        }
    }
}

/// Definition of a built-in procedure.
pub struct BuiltinOp {
    pub name: &'static str,
    pub arity: Arity,
    /// Receives the evaluated arguments as a proper list.
    pub func: fn(&Value) -> Result<Value, Error>,
}

impl BuiltinOp {
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(self.name, arg_count)
    }
}

//
// Argument helpers
//

fn numbers(name: &'static str, args: &Value) -> Result<Vec<Number>, Error> {
    args.iter_list()
        .map(|arg| match arg {
            Value::Number(n) => Ok(*n),
            other => Err(Error::Type(format!(
                "{name} must take numeric arguments, not {other}"
            ))),
        })
        .collect()
}

fn one_arg(args: &Value) -> &Value {
    // Arity is validated before the implementation runs.
    match args {
        Value::Pair(pair) => &pair.car,
        _ => &Value::EmptyList,
    }
}

fn two_args(args: &Value) -> (&Value, &Value) {
    match args {
        Value::Pair(pair) => match &pair.cdr {
            Value::Pair(rest) => (&pair.car, &rest.car),
            _ => (&pair.car, &Value::EmptyList),
        },
        _ => (&Value::EmptyList, &Value::EmptyList),
    }
}

fn overflow(name: &'static str) -> Error {
    Error::Type(format!("integer overflow in {name}"))
}

//
// Builtin implementations
//

fn builtin_add(args: &Value) -> Result<Value, Error> {
    let mut sum: Number = 0;
    for n in numbers("+", args)? {
        sum = sum.checked_add(n).ok_or_else(|| overflow("+"))?;
    }
    Ok(Value::Number(sum))
}

fn builtin_mul(args: &Value) -> Result<Value, Error> {
    let mut product: Number = 1;
    for n in numbers("*", args)? {
        product = product.checked_mul(n).ok_or_else(|| overflow("*"))?;
    }
    Ok(Value::Number(product))
}

fn builtin_sub(args: &Value) -> Result<Value, Error> {
    match numbers("-", args)?.as_slice() {
        [a, b] => Ok(Value::Number(a.checked_sub(*b).ok_or_else(|| overflow("-"))?)),
        _ => Err(Error::Arity("- must take exactly 2 arguments".to_owned())),
    }
}

// Macro to generate the two-argument numeric comparisons
macro_rules! numeric_comparison {
    ($func:ident, $op:tt, $name:expr) => {
        fn $func(args: &Value) -> Result<Value, Error> {
            match numbers($name, args)?.as_slice() {
                [a, b] => Ok(Value::Boolean(a $op b)),
                _ => Err(Error::Arity(concat!($name, " must take exactly 2 arguments").to_owned())),
            }
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");

fn builtin_add1(args: &Value) -> Result<Value, Error> {
    match numbers("add1", args)?.as_slice() {
        [n] => Ok(Value::Number(n.checked_add(1).ok_or_else(|| overflow("add1"))?)),
        _ => Err(Error::Arity("add1 must take exactly 1 argument".to_owned())),
    }
}

fn builtin_sub1(args: &Value) -> Result<Value, Error> {
    match numbers("sub1", args)?.as_slice() {
        [n] => Ok(Value::Number(n.checked_sub(1).ok_or_else(|| overflow("sub1"))?)),
        _ => Err(Error::Arity("sub1 must take exactly 1 argument".to_owned())),
    }
}

/// True only for the literal `#f`; every other value is truthy.
fn builtin_not(args: &Value) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(
        one_arg(args),
        Value::Boolean(false)
    )))
}

/// Identity on the evaluated-argument list.
fn builtin_list(args: &Value) -> Result<Value, Error> {
    Ok(args.clone())
}

fn builtin_cons(args: &Value) -> Result<Value, Error> {
    let (car, cdr) = two_args(args);
    if !cdr.is_proper_list() {
        return Err(Error::Type(format!(
            "cons's second argument must be a proper list, not {cdr}"
        )));
    }
    Ok(Value::cons(car.clone(), cdr.clone()))
}

fn builtin_car(args: &Value) -> Result<Value, Error> {
    match one_arg(args) {
        Value::Pair(pair) => Ok(pair.car.clone()),
        other => Err(Error::Type(format!("car must take a pair, not {other}"))),
    }
}

fn builtin_cdr(args: &Value) -> Result<Value, Error> {
    match one_arg(args) {
        Value::Pair(pair) => Ok(pair.cdr.clone()),
        other => Err(Error::Type(format!("cdr must take a pair, not {other}"))),
    }
}

fn builtin_eq(args: &Value) -> Result<Value, Error> {
    let (a, b) = two_args(args);
    Ok(Value::Boolean(a.identical(b)))
}

fn builtin_null(args: &Value) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(one_arg(args), Value::EmptyList)))
}

/// Anything that is neither a pair nor the empty list.
fn builtin_atom(args: &Value) -> Result<Value, Error> {
    Ok(Value::Boolean(!matches!(
        one_arg(args),
        Value::Pair(_) | Value::EmptyList
    )))
}

/// Registry of all built-in procedures. The global environment binds each
/// name to its entry at construction time.
pub static BUILTIN_OPS: &[BuiltinOp] = &[
    BuiltinOp {
        name: "+",
        arity: Arity::AtLeast(0),
        func: builtin_add,
    },
    BuiltinOp {
        name: "*",
        arity: Arity::AtLeast(0),
        func: builtin_mul,
    },
    BuiltinOp {
        name: "-",
        arity: Arity::Exact(2),
        func: builtin_sub,
    },
    BuiltinOp {
        name: "<",
        arity: Arity::Exact(2),
        func: builtin_lt,
    },
    BuiltinOp {
        name: ">",
        arity: Arity::Exact(2),
        func: builtin_gt,
    },
    BuiltinOp {
        name: "add1",
        arity: Arity::Exact(1),
        func: builtin_add1,
    },
    BuiltinOp {
        name: "sub1",
        arity: Arity::Exact(1),
        func: builtin_sub1,
    },
    BuiltinOp {
        name: "not",
        arity: Arity::Exact(1),
        func: builtin_not,
    },
    BuiltinOp {
        name: "list",
        arity: Arity::AtLeast(0),
        func: builtin_list,
    },
    BuiltinOp {
        name: "cons",
        arity: Arity::Exact(2),
        func: builtin_cons,
    },
    BuiltinOp {
        name: "car",
        arity: Arity::Exact(1),
        func: builtin_car,
    },
    BuiltinOp {
        name: "cdr",
        arity: Arity::Exact(1),
        func: builtin_cdr,
    },
    BuiltinOp {
        name: "eq?",
        arity: Arity::Exact(2),
        func: builtin_eq,
    },
    BuiltinOp {
        name: "null?",
        arity: Arity::Exact(1),
        func: builtin_null,
    },
    BuiltinOp {
        name: "atom?",
        arity: Arity::Exact(1),
        func: builtin_atom,
    },
];

/// Look up a builtin by name.
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn find_builtin(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_OPS.iter().find(|op| op.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: Vec<Value>) -> Value {
        Value::list_from_vec(items)
    }

    fn call(name: &str, items: Vec<Value>) -> Result<Value, Error> {
        let op = find_builtin(name).expect("unknown builtin");
        let arg_list = args(items);
        op.validate_arity(arg_list.list_len().unwrap())?;
        (op.func)(&arg_list)
    }

    #[test]
    fn test_arity_validation() {
        assert!(Arity::Exact(2).validate("-", 2).is_ok());
        assert!(Arity::Exact(2).validate("-", 1).is_err());
        assert!(Arity::Exact(2).validate("-", 3).is_err());
        assert!(Arity::AtLeast(0).validate("+", 0).is_ok());
        assert!(Arity::AtLeast(1).validate("f", 0).is_err());

        let error = Arity::Exact(1).validate("car", 2).unwrap_err();
        assert_eq!(
            error.to_string(),
            "car must take exactly 1 argument, got 2"
        );
    }

    #[test]
    fn test_arithmetic_data_driven() {
        let test_cases = vec![
            ("+", vec![], Value::Number(0)),
            ("+", vec![Value::Number(1), Value::Number(2), Value::Number(3)], Value::Number(6)),
            ("*", vec![], Value::Number(1)),
            ("*", vec![Value::Number(2), Value::Number(3), Value::Number(4)], Value::Number(24)),
            ("-", vec![Value::Number(5), Value::Number(2)], Value::Number(3)),
            ("add1", vec![Value::Number(41)], Value::Number(42)),
            ("sub1", vec![Value::Number(0)], Value::Number(-1)),
            ("<", vec![Value::Number(1), Value::Number(2)], Value::Boolean(true)),
            ("<", vec![Value::Number(2), Value::Number(1)], Value::Boolean(false)),
            (">", vec![Value::Number(2), Value::Number(1)], Value::Boolean(true)),
        ];

        for (name, items, expected) in test_cases {
            let result = call(name, items).unwrap();
            assert_eq!(result, expected, "builtin: {name}");
        }
    }

    #[test]
    fn test_arithmetic_type_and_overflow_errors() {
        assert!(matches!(
            call("+", vec![Value::Number(1), Value::Boolean(true)]),
            Err(Error::Type(_))
        ));
        assert!(matches!(
            call("*", vec![Value::Number(i64::MAX), Value::Number(2)]),
            Err(Error::Type(_))
        ));
        assert!(matches!(
            call("add1", vec![Value::Number(i64::MAX)]),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn test_list_operations() {
        let one_two = call(
            "list",
            vec![Value::Number(1), Value::Number(2)],
        )
        .unwrap();
        assert_eq!(one_two.to_string(), "(1 2)");

        let extended = call("cons", vec![Value::Number(0), one_two.clone()]).unwrap();
        assert_eq!(extended.to_string(), "(0 1 2)");

        assert_eq!(call("car", vec![extended.clone()]).unwrap(), Value::Number(0));
        assert_eq!(call("cdr", vec![extended]).unwrap(), one_two);

        assert!(matches!(
            call("cons", vec![Value::Number(1), Value::Number(2)]),
            Err(Error::Type(_))
        ));
        assert!(matches!(
            call("car", vec![Value::Number(1)]),
            Err(Error::Type(_))
        ));
        assert!(matches!(
            call("cdr", vec![Value::EmptyList]),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn test_predicates() {
        assert_eq!(
            call("not", vec![Value::Boolean(false)]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            call("not", vec![Value::Number(0)]).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            call("null?", vec![Value::EmptyList]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            call("null?", vec![Value::Number(1)]).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            call("atom?", vec![Value::Number(1)]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            call("atom?", vec![Value::EmptyList]).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            call(
                "atom?",
                vec![Value::cons(Value::Number(1), Value::EmptyList)]
            )
            .unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_eq_is_cell_identity_for_pairs() {
        let cell = Value::cons(Value::Number(1), Value::EmptyList);
        assert_eq!(
            call("eq?", vec![cell.clone(), cell.clone()]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            call(
                "eq?",
                vec![cell, Value::cons(Value::Number(1), Value::EmptyList)]
            )
            .unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            call("eq?", vec![Value::Number(3), Value::Number(3)]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            call("eq?", vec![Value::EmptyList, Value::EmptyList]).unwrap(),
            Value::Boolean(true)
        );
    }
}
