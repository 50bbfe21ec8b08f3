//! Error types for the Sequel promise primitive.
//!
//! All errors use the `SQ_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Settlement / scheduling errors
//! - 2xx: Query and model errors (raised by producers)
//! - 9xx: General / internal errors
//!
//! A `SequelError` doubles as a rejection payload: wrap it with
//! [`Value::from`](crate::Value) and every observer sees the same instance.

use thiserror::Error;

use crate::{PromiseId, ValidationErrors};

/// Central error enum for all Sequel operations.
#[derive(Debug, Error)]
pub enum SequelError {
    // =================================================================
    // Settlement Errors (1xx)
    // =================================================================
    /// A promise was resolved with itself; following it would never settle.
    #[error("SQ_ERR_100: Promise {0} cannot be resolved with itself")]
    SelfResolution(PromiseId),

    /// The scheduler drained every task but the awaited promise is still pending.
    #[error("SQ_ERR_101: Promise {0} still pending after the scheduler went idle")]
    Stalled(PromiseId),

    /// One scheduler run executed more tasks than the configured budget.
    #[error("SQ_ERR_102: Tick budget of {budget} tasks exhausted")]
    TickBudgetExhausted { budget: usize },

    // =================================================================
    // Query / Model Errors (2xx)
    // =================================================================
    /// One or more attribute validators failed.
    #[error("SQ_ERR_200: Validation failed: {0}")]
    Validation(ValidationErrors),

    /// The addressed row does not exist.
    #[error("SQ_ERR_201: Record not found in {table}: id {id}")]
    RecordNotFound { table: String, id: i64 },

    /// A lookup criteria could not be interpreted.
    #[error("SQ_ERR_202: Invalid criteria: {reason}")]
    InvalidCriteria { reason: String },

    /// An attribute name is not part of the schema.
    #[error("SQ_ERR_203: Unknown field {field} on {table}")]
    UnknownField { table: String, field: String },

    /// An attribute value has the wrong shape for its column.
    #[error("SQ_ERR_204: Field {field} expects {expected}")]
    TypeMismatch { field: String, expected: String },

    /// An insert reused a primary key that is already stored.
    #[error("SQ_ERR_205: Duplicate key in {table}: id {id}")]
    DuplicateKey { table: String, id: i64 },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Free-form failure raised by user code (producers or handlers).
    #[error("SQ_ERR_900: {0}")]
    Message(String),

    /// Unrecoverable internal error.
    #[error("SQ_ERR_901: Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid config document, missing fields, etc.).
    #[error("SQ_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("SQ_ERR_903: Serialization error: {0}")]
    Serialization(String),
}

impl SequelError {
    /// Shorthand for a free-form [`SequelError::Message`].
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// The validation detail, if this is a validation failure.
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Numeric code, e.g. `100` for `SQ_ERR_100`.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::SelfResolution(_) => 100,
            Self::Stalled(_) => 101,
            Self::TickBudgetExhausted { .. } => 102,
            Self::Validation(_) => 200,
            Self::RecordNotFound { .. } => 201,
            Self::InvalidCriteria { .. } => 202,
            Self::UnknownField { .. } => 203,
            Self::TypeMismatch { .. } => 204,
            Self::DuplicateKey { .. } => 205,
            Self::Message(_) => 900,
            Self::Internal(_) => 901,
            Self::Configuration(_) => 902,
            Self::Serialization(_) => 903,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SequelError>;

impl From<serde_json::Error> for SequelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = SequelError::SelfResolution(PromiseId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("SQ_ERR_100"), "Got: {msg}");
    }

    #[test]
    fn message_display_is_verbatim() {
        let err = SequelError::message("no");
        assert_eq!(format!("{err}"), "SQ_ERR_900: no");
    }

    #[test]
    fn code_matches_display() {
        let errors = vec![
            SequelError::Stalled(PromiseId::new()),
            SequelError::TickBudgetExhausted { budget: 3 },
            SequelError::RecordNotFound { table: "users".into(), id: 7 },
            SequelError::DuplicateKey { table: "users".into(), id: 1 },
            SequelError::Internal("x".into()),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with(&format!("SQ_ERR_{}", err.code())),
                "Code mismatch: {msg}"
            );
        }
    }

    #[test]
    fn serde_errors_convert() {
        let err: SequelError = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert!(matches!(err, SequelError::Serialization(_)));
    }
}
