//! The expression/value domain of the interpreter and its printer.
//!
//! The central enum, [`Value`], covers everything the reader can produce
//! (numbers, booleans, symbols, pairs, the empty list) and everything
//! evaluation can add on top (closures, builtin procedures, escape
//! continuations, and the undefined-value marker produced by `define` and
//! `set!`). Proper lists are chains of reference-counted [`Pair`] cells
//! terminated by [`Value::EmptyList`]; they are immutable once built, so
//! sharing cells between expressions and evaluated data is safe.
//!
//! Equality comes in two flavors: [`PartialEq`] is structural and exists
//! for tests and assertions, while [`Value::identical`] implements the
//! `eq?` builtin's cell-identity semantics.

use std::fmt;
use std::rc::Rc;

use crate::builtinops::BuiltinOp;
use crate::evaluator::{Cont, EnvRef, Step};
use crate::Error;

/// Number values in the interpreter. The reader only admits literals whose
/// magnitude is at most [`MAX_EXACT_NUMBER`].
pub type Number = i64;

/// 2^53, the largest magnitude a number literal may have.
pub const MAX_EXACT_NUMBER: Number = 1 << 53;

/// A two-slot cell; chains of pairs ending in `EmptyList` form proper lists.
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

/// A user procedure: formals, body, and the captured defining environment.
pub struct Closure {
    pub formals: Value,
    pub body: Value,
    pub env: EnvRef,
}

/// An escape continuation minted by `letcc`: an invokable capture of "the
/// rest of the computation" at the point the `letcc` was evaluated.
///
/// Invoking it abandons whatever computation is pending and resumes the
/// captured continuation with the supplied value. It may be invoked any
/// number of times, including after its establishing form has already
/// returned through normal control flow.
#[derive(Clone)]
pub struct Continuation(Cont);

impl Continuation {
    pub(crate) fn new(k: Cont) -> Self {
        Continuation(k)
    }

    /// Drive evaluation through the captured continuation, discarding the
    /// caller's own continuation entirely.
    pub(crate) fn invoke(&self, value: Value) -> Result<Step, Error> {
        (self.0)(value)
    }

    pub(crate) fn shares(&self, other: &Continuation) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Core expression/value type.
#[derive(Clone)]
pub enum Value {
    Number(Number),
    Boolean(bool),
    /// Identifiers; also the namespace atoms like `quote` live in.
    Symbol(String),
    Pair(Rc<Pair>),
    /// The unique `()` sentinel terminating proper lists.
    EmptyList,
    Closure(Rc<Closure>),
    Builtin(&'static BuiltinOp),
    Continuation(Continuation),
    /// Placeholder returned by side-effecting forms. The tag names the
    /// originating form (`"define"` or `"set!"`); consuming the marker
    /// where a real value is required is an error carrying that tag.
    Undefined(&'static str),
}

impl Value {
    /// Build a pair cell.
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair { car, cdr }))
    }

    /// Build a proper list from the given items.
    pub fn list_from_vec(items: Vec<Value>) -> Value {
        items
            .into_iter()
            .rfold(Value::EmptyList, |rest, item| Value::cons(item, rest))
    }

    /// Iterate over the elements of a proper list. Iteration stops at the
    /// first non-pair tail, so callers that care about properness should
    /// check [`Value::is_proper_list`] first.
    pub fn iter_list(&self) -> ListIter<'_> {
        ListIter(self)
    }

    /// Length of a proper list; `None` for anything with a non-empty tail.
    pub fn list_len(&self) -> Option<usize> {
        let mut len = 0;
        let mut cursor = self;
        loop {
            match cursor {
                Value::EmptyList => return Some(len),
                Value::Pair(pair) => {
                    len += 1;
                    cursor = &pair.cdr;
                }
                _ => return None,
            }
        }
    }

    pub fn is_proper_list(&self) -> bool {
        self.list_len().is_some()
    }

    /// Everything but the literal `#f` counts as true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false))
    }

    /// `eq?` semantics: value equality for atoms, cell identity for pairs,
    /// identity for closures, builtins, and continuations. The undefined
    /// marker is never `eq?` to anything, itself included.
    pub(crate) fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::EmptyList, Value::EmptyList) => true,
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Continuation(a), Value::Continuation(b)) => a.shares(b),
            _ => false,
        }
    }
}

pub struct ListIter<'a>(&'a Value);

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<&'a Value> {
        match self.0 {
            Value::Pair(pair) => {
                self.0 = &pair.cdr;
                Some(&pair.car)
            }
            _ => None,
        }
    }
}

/// Structural equality, used by tests and assertions. Procedure-like
/// values compare by identity; the undefined marker never equals anything,
/// itself included.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => {
                Rc::ptr_eq(a, b) || (a.car == b.car && a.cdr == b.cdr)
            }
            (Value::Undefined(_), _) | (_, Value::Undefined(_)) => false,
            _ => self.identical(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Symbol(name) => write!(f, "{name}"),
            Value::EmptyList => write!(f, "()"),
            Value::Pair(_) => {
                write!(f, "(")?;
                let mut cursor = self;
                let mut first = true;
                loop {
                    match cursor {
                        Value::Pair(pair) => {
                            if !first {
                                write!(f, " ")?;
                            }
                            write!(f, "{}", pair.car)?;
                            first = false;
                            cursor = &pair.cdr;
                        }
                        Value::EmptyList => break,
                        // Nothing in this implementation constructs an
                        // improper list, but the printer stays total.
                        tail => {
                            write!(f, " . {tail}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Closure(_) => write!(f, "#closure"),
            Value::Builtin(op) => write!(f, "#<builtin-{}>", op.name),
            Value::Continuation(_) => write!(f, "#continuation"),
            Value::Undefined(_) => write!(f, "#<undefined>"),
        }
    }
}

// Closures and continuations hold values that are not Debug, so the
// implementation is written out by hand.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Symbol(name) => write!(f, "Symbol({name})"),
            Value::EmptyList => write!(f, "EmptyList"),
            Value::Pair(_) => write!(f, "Pair({self})"),
            Value::Closure(closure) => {
                write!(
                    f,
                    "Closure(formals={}, body={})",
                    closure.formals, closure.body
                )
            }
            Value::Builtin(op) => write!(f, "Builtin({})", op.name),
            Value::Continuation(_) => write!(f, "Continuation(<captured>)"),
            Value::Undefined(origin) => write!(f, "Undefined({origin})"),
        }
    }
}
