//! Settlement state of one computation.
//!
//! **Pending → Fulfilled | Rejected**, exactly one transition, terminal.

use std::fmt;

use sequel_types::Value;

use crate::Promise;

/// Coarse status of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Fulfilled => write!(f, "FULFILLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Terminal outcome of a settled promise.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Ordered fulfillment values (zero, one, or many).
    Fulfilled(Vec<Value>),
    /// The rejection reason, kept as one opaque value.
    Rejected(Value),
}

impl Outcome {
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Fulfilled(_) => Status::Fulfilled,
            Self::Rejected(_) => Status::Rejected,
        }
    }

    pub fn into_result(self) -> Result<Vec<Value>, Value> {
        match self {
            Self::Fulfilled(values) => Ok(values),
            Self::Rejected(reason) => Err(reason),
        }
    }
}

/// What a promise is resolved with.
///
/// `Values` fulfills directly; a `Vec<Value>` converts to a multi-value
/// fulfillment while a single [`Value`] (a `List` included) is one value.
/// `Deferred` adopts another promise's eventual outcome, one level deep.
pub enum Resolution {
    Values(Vec<Value>),
    Deferred(Promise),
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Values(values) => f.debug_tuple("Values").field(values).finish(),
            Self::Deferred(p) => f.debug_tuple("Deferred").field(&p.id()).finish(),
        }
    }
}

impl From<Value> for Resolution {
    fn from(value: Value) -> Self {
        Self::Values(vec![value])
    }
}

impl From<Vec<Value>> for Resolution {
    fn from(values: Vec<Value>) -> Self {
        Self::Values(values)
    }
}

impl From<()> for Resolution {
    fn from((): ()) -> Self {
        Self::Values(Vec::new())
    }
}

impl From<Promise> for Resolution {
    fn from(promise: Promise) -> Self {
        Self::Deferred(promise)
    }
}

impl From<&Promise> for Resolution {
    fn from(promise: &Promise) -> Self {
        Self::Deferred(promise.clone())
    }
}

impl From<&str> for Resolution {
    fn from(s: &str) -> Self {
        Self::from(Value::from(s))
    }
}

impl From<String> for Resolution {
    fn from(s: String) -> Self {
        Self::from(Value::from(s))
    }
}

impl From<i64> for Resolution {
    fn from(i: i64) -> Self {
        Self::from(Value::Int(i))
    }
}

impl From<bool> for Resolution {
    fn from(b: bool) -> Self {
        Self::from(Value::Bool(b))
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Resolution {
    fn from((a, b): (A, B)) -> Self {
        Self::Values(vec![a.into(), b.into()])
    }
}

/// Collapse a fulfillment into the single value a `then` handler sees.
///
/// No values → `Null`, one value → itself, many → a `List`.
#[must_use]
pub fn collapse(values: &[Value]) -> Value {
    match values {
        [] => Value::Null,
        [single] => single.clone(),
        many => Value::List(many.to_vec()),
    }
}
