//! # sequel-promise
//!
//! **Dual-interface asynchronous result** for the Sequel data-access layer.
//!
//! One [`Promise`] satisfies two consumption models at once:
//! - the deferred-computation contract: `then`, `catch`, `spread`,
//!   multi-value fulfillment, one-level flattening, `.await`
//! - the legacy event/callback contract: `success`, `error`,
//!   `done`/`complete`, `on`/`emit`, and `proxy` forwarding
//!
//! ## Architecture
//!
//! 1. **Settlement Core** ([`promise`]): Pending → Fulfilled | Rejected, once
//! 2. **Compatibility Layer** ([`compat`]): legacy surfaces as projections of
//!    that single transition, plus an independent multi-fire event channel
//! 3. **Proxy Forwarder** ([`proxy`]): weak source→target forwarding links
//! 4. **Multi-value Protocol** ([`aggregate`], [`state::Resolution`]):
//!    fulfillment with several positional values
//!
//! ## Scheduling
//!
//! ```text
//! resolve/reject/emit ─▶ record + queue task ─▶ Scheduler tick ─▶ subscribers
//!                                                             └─▶ proxy links
//! ```
//!
//! Handlers never run inside the call that triggered them; see [`scheduler`].

pub mod aggregate;
pub mod compat;
pub mod future;
pub mod promise;
pub mod proxy;
pub mod scheduler;
pub mod state;

pub use promise::{Promise, Resolver};
pub use scheduler::{Scheduler, UnhandledRejection};
pub use state::{Outcome, Resolution, Status, collapse};
