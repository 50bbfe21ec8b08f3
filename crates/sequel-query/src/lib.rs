//! # sequel-query
//!
//! In-memory model store whose every operation answers with a
//! [`sequel_promise::Promise`]. It is the producer side of the promise
//! contract:
//!
//! - each operation emits one `sql` event per statement it issues
//! - then fulfills (records, counts, `(record, created)` pairs) or rejects
//!   with a [`sequel_types::SequelError`]
//! - always on a later scheduler tick
//!
//! ## Modules
//!
//! - [`schema`]: typed fields, defaults and validators
//! - [`table`]: the store and its promise-returning operations
//! - [`record`]: shared row handles with save / update / increment / reload

pub mod record;
pub mod schema;
mod sql;
pub mod table;

pub use record::Record;
pub use schema::{DefaultValue, Field, FieldKind, Row, Schema, Validator};
pub use table::{Table, row};
