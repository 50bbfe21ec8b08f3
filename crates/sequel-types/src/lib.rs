//! # sequel-types
//!
//! Shared types, errors, and configuration for the **Sequel** asynchronous
//! result primitive.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Payloads**: [`Value`], the dynamic value carried by fulfillments,
//!   rejections and events
//! - **Identifiers**: [`PromiseId`]
//! - **Events**: [`EventName`], [`SqlStatement`]
//! - **Validation**: [`ValidationErrors`], [`FieldError`]
//! - **Configuration**: [`SchedulerConfig`], [`UnhandledRejectionPolicy`], [`ProxyOptions`]
//! - **Errors**: [`SequelError`] with `SQ_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults
//! - **Testing** (`test-helpers` feature): [`testing::Spy`]

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod validation;
pub mod value;

// Re-export all primary types at crate root for ergonomic imports:
//   use sequel_types::{Value, EventName, SequelError, ...};

pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use validation::*;
pub use value::*;

// Constants are accessed via `sequel_types::constants::FOO`
// (not re-exported to avoid name collisions).
