//! Event vocabulary of the compatibility layer.
//!
//! `success` and `error` are settlement-linked: they project the single
//! settlement of an instance. Every other name is an ordinary multi-fire
//! channel event, `sql` being the one producers use for statement
//! notifications.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Value, constants};

/// Name of an event on a promise's event surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventName {
    /// Fulfillment, carrying the fulfillment values.
    Success,
    /// Rejection, carrying exactly one argument: the reason.
    Error,
    /// A statement was issued by the producer.
    Sql,
    /// Any other auxiliary notification.
    Custom(String),
}

impl EventName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => constants::EVENT_SUCCESS,
            Self::Error => constants::EVENT_ERROR,
            Self::Sql => constants::EVENT_SQL,
            Self::Custom(name) => name,
        }
    }

    /// Whether this event is a projection of the settlement transition.
    #[must_use]
    pub fn is_settlement(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        match name {
            constants::EVENT_SUCCESS => Self::Success,
            constants::EVENT_ERROR => Self::Error,
            constants::EVENT_SQL => Self::Sql,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.as_str().to_string()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SqlStatement: payload of the `sql` event
// ---------------------------------------------------------------------------

/// Descriptor of a statement a producer issued.
///
/// The fingerprint is a truncated SHA-256 over the whitespace-normalized
/// text, so the same statement formatted differently hashes identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub text: String,
    pub fingerprint: String,
}

impl SqlStatement {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let digest = Sha256::digest(normalized.as_bytes());
        let mut fingerprint = hex::encode(digest);
        fingerprint.truncate(constants::SQL_FINGERPRINT_LEN);
        Self { text, fingerprint }
    }

    /// Recover a descriptor from an event argument.
    ///
    /// Accepts the map form produced by `Value::from(SqlStatement)` as well
    /// as a bare string.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(text) => Some(Self::new(text.clone())),
            Value::Map(map) => {
                let text = map.get("text")?.as_text()?.to_string();
                let fingerprint = map.get("fingerprint")?.as_text()?.to_string();
                Some(Self { text, fingerprint })
            }
            _ => None,
        }
    }
}

impl From<SqlStatement> for Value {
    fn from(stmt: SqlStatement) -> Self {
        Value::map([
            ("text", Value::Text(stmt.text)),
            ("fingerprint", Value::Text(stmt.fingerprint)),
        ])
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
