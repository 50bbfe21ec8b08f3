//! Model schema: typed fields, defaults and validators.
//!
//! Attribute maps are checked in three passes before they reach the store:
//! unknown names are refused, validators run on the raw values, and the
//! surviving values are coerced to their column kind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sequel_types::{Result, SequelError, ValidationErrors, Value, constants};

/// One stored row, keyed by field name.
pub type Row = BTreeMap<String, Value>;

/// Column kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Text,
    Date,
}

impl FieldKind {
    pub(crate) fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "VARCHAR(255)",
            Self::Date => "DATETIME",
        }
    }
}

/// Value filled in when an insert leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// Current time at insert.
    Now,
    Int(i64),
    Text(String),
}

impl DefaultValue {
    fn produce(&self) -> Value {
        match self {
            Self::Now => Value::Timestamp(Utc::now()),
            Self::Int(n) => Value::Int(*n),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }
}

/// Attribute validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Validator {
    /// Value must be an integer or a string holding one.
    IsInt,
    /// Rendered length must lie within `min..=max`.
    Len {
        min: usize,
        max: usize,
        #[serde(default)]
        msg: Option<String>,
    },
}

impl Validator {
    /// Name reported in [`FieldError::validator`](sequel_types::FieldError).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsInt => "isInt",
            Self::Len { .. } => "len",
        }
    }

    /// `None` when `value` passes, otherwise the failure message.
    #[must_use]
    pub fn check(&self, value: &Value) -> Option<String> {
        match self {
            Self::IsInt => match value {
                Value::Int(_) => None,
                Value::Text(s) if s.trim().parse::<i64>().is_ok() => None,
                _ => Some(constants::IS_INT_FAILED_MSG.to_string()),
            },
            Self::Len { min, max, msg } => {
                let len = match value {
                    Value::Text(s) => s.chars().count(),
                    other => other.to_string().chars().count(),
                };
                if (*min..=*max).contains(&len) {
                    None
                } else {
                    Some(msg.clone().unwrap_or_else(|| constants::LEN_FAILED_MSG.to_string()))
                }
            }
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "allow_null_default")]
    pub allow_null: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub validators: Vec<Validator>,
}

fn allow_null_default() -> bool {
    true
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            allow_null: true,
            default: None,
            validators: Vec::new(),
        }
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    #[must_use]
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Coerce `value` to this column's kind.
    fn coerce(&self, value: Value) -> Result<Value> {
        let mismatch = || SequelError::TypeMismatch {
            field: self.name.clone(),
            expected: self.kind.sql_type().to_string(),
        };
        match (self.kind, value) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldKind::Integer, v @ Value::Int(_)) => Ok(v),
            (FieldKind::Integer, Value::Text(s)) => {
                s.trim().parse::<i64>().map(Value::Int).map_err(|_| mismatch())
            }
            (FieldKind::Text, v @ Value::Text(_)) => Ok(v),
            (FieldKind::Date, v @ Value::Timestamp(_)) => Ok(v),
            (FieldKind::Date, Value::Text(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Value::Timestamp(dt.with_timezone(&Utc)))
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        }
    }
}

/// Ordered set of fields for one model. Always carries the integer
/// primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

#[derive(Deserialize)]
struct SchemaDocument {
    name: String,
    #[serde(default)]
    fields: Vec<Field>,
}

impl Schema {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![Field::integer(constants::PRIMARY_KEY).not_null()],
        }
    }

    /// Add a field. A field named like the primary key replaces it.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    /// Load a schema from a JSON document `{ "name": .., "fields": [..] }`.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: SchemaDocument = serde_json::from_str(json)?;
        Ok(doc.fields.into_iter().fold(Self::new(doc.name), Self::field))
    }

    /// Model name, e.g. `User`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the backing table, e.g. `Users`.
    #[must_use]
    pub fn table_name(&self) -> String {
        format!("{}s", self.name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Refuse attribute names that are not part of the schema.
    pub fn check_known<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Result<()> {
        for name in names {
            if self.get(name).is_none() {
                return Err(SequelError::UnknownField {
                    table: self.table_name(),
                    field: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run validators on every non-null value present in `attrs`.
    pub fn validate(&self, attrs: &Row) -> Result<()> {
        let mut errors = ValidationErrors::new();
        for (name, value) in attrs {
            let Some(field) = self.get(name) else { continue };
            if value.is_null() {
                if !field.allow_null && name != constants::PRIMARY_KEY {
                    errors.add(name, "notNull", format!("{name} cannot be null"));
                }
                continue;
            }
            for validator in &field.validators {
                if let Some(message) = validator.check(value) {
                    errors.add(name, validator.name(), message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SequelError::Validation(errors))
        }
    }

    /// Check and coerce attribute values without running validators.
    /// Used for lookup criteria.
    pub fn coerce(&self, attrs: Row) -> Result<Row> {
        attrs
            .into_iter()
            .map(|(name, value)| {
                let field = self.get(&name).ok_or_else(|| SequelError::UnknownField {
                    table: self.table_name(),
                    field: name.clone(),
                })?;
                Ok((name, field.coerce(value)?))
            })
            .collect()
    }

    /// Check, validate and coerce a partial attribute map.
    pub fn prepare(&self, attrs: Row) -> Result<Row> {
        self.check_known(attrs.keys())?;
        self.validate(&attrs)?;
        self.coerce(attrs)
    }

    /// Fill in defaults, and `Null` for every other missing field.
    pub fn complete(&self, row: &mut Row) {
        for field in &self.fields {
            row.entry(field.name.clone())
                .or_insert_with(|| field.default.as_ref().map_or(Value::Null, DefaultValue::produce));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Schema {
        Schema::new("User")
            .field(Field::text("username"))
            .field(Field::date("touchedAt").default_value(DefaultValue::Now))
            .field(Field::integer("aNumber"))
            .field(Field::integer("validateTest").validate(Validator::IsInt))
            .field(Field::text("validateCustom").validate(Validator::Len {
                min: 1,
                max: 20,
                msg: Some("Length failed.".into()),
            }))
    }

    fn row(entries: &[(&str, Value)]) -> Row {
        entries.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn primary_key_is_implicit() {
        let schema = Schema::new("Book");
        assert_eq!(schema.get("id").unwrap().kind, FieldKind::Integer);
        assert_eq!(schema.table_name(), "Books");
    }

    #[test]
    fn is_int_failure_message() {
        let err = user()
            .prepare(row(&[("validateTest", Value::from("hello"))]))
            .unwrap_err();
        let errors = err.validation().unwrap();
        let first = &errors.get("validateTest").unwrap()[0];
        assert_eq!(first.message, "Validation isInt failed");
        assert_eq!(first.validator, "isInt");
    }

    #[test]
    fn len_uses_custom_message() {
        let err = user()
            .prepare(row(&[("validateCustom", Value::from("a".repeat(26)))]))
            .unwrap_err();
        assert_eq!(
            err.validation().unwrap().get("validateCustom").unwrap()[0].message,
            "Length failed."
        );
    }

    #[test]
    fn len_default_message() {
        let v = Validator::Len { min: 2, max: 3, msg: None };
        assert_eq!(v.check(&Value::from("a")).as_deref(), Some(constants::LEN_FAILED_MSG));
        assert!(v.check(&Value::from("abc")).is_none());
    }

    #[test]
    fn null_skips_validators() {
        assert!(user().prepare(row(&[("validateTest", Value::Null)])).is_ok());
    }

    #[test]
    fn unknown_field_refused() {
        let err = user().prepare(row(&[("nope", Value::Int(1))])).unwrap_err();
        assert!(matches!(err, SequelError::UnknownField { field, .. } if field == "nope"));
    }

    #[test]
    fn coercion_by_kind() {
        let prepared = user()
            .prepare(row(&[
                ("aNumber", Value::from("42")),
                ("touchedAt", Value::from("2024-03-01T10:00:00Z")),
            ]))
            .unwrap();
        assert_eq!(prepared["aNumber"], Value::Int(42));
        assert!(matches!(prepared["touchedAt"], Value::Timestamp(_)));

        let err = user().prepare(row(&[("username", Value::Int(5))])).unwrap_err();
        assert!(matches!(err, SequelError::TypeMismatch { .. }));
    }

    #[test]
    fn complete_fills_defaults() {
        let mut r = row(&[("aNumber", Value::Int(0))]);
        user().complete(&mut r);
        assert!(matches!(r["touchedAt"], Value::Timestamp(_)));
        assert!(r["username"].is_null());
        assert_eq!(r["aNumber"], Value::Int(0));
    }

    #[test]
    fn schema_from_json() {
        let schema = Schema::from_json(
            r#"{
                "name": "Page",
                "fields": [
                    { "name": "content", "kind": "text" },
                    { "name": "pageNo", "kind": "integer", "allow_null": false,
                      "validators": [{ "rule": "is_int" }] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(schema.table_name(), "Pages");
        let page_no = schema.get("pageNo").unwrap();
        assert!(!page_no.allow_null);
        assert_eq!(page_no.validators, vec![Validator::IsInt]);
        assert!(schema.get("content").unwrap().allow_null);
    }
}
