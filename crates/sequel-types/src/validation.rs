//! Compound validation failures.
//!
//! A single save can fail several validators on several fields. The whole
//! collection travels as one rejection reason and is looked up per field.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// One failed validator on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The attribute that failed.
    pub field: String,
    /// Human readable message (validator default or custom `msg`).
    pub message: String,
    /// Name of the validator that produced this error (e.g. `isInt`).
    pub validator: String,
}

/// Field-keyed collection of validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<FieldError>>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`.
    pub fn add(&mut self, field: &str, validator: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(FieldError {
                field: field.to_string(),
                message: message.into(),
                validator: validator.to_string(),
            });
    }

    /// All failures recorded for `field`, in the order validators ran.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    /// Names of the fields with at least one failure.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    /// Total number of failures across all fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in self.errors.values().flatten() {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}
