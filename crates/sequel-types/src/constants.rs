//! System-wide constants for the Sequel promise primitive.

/// Event name for fulfillment notifications.
pub const EVENT_SUCCESS: &str = "success";

/// Event name for rejection notifications.
pub const EVENT_ERROR: &str = "error";

/// Event name for issued-statement notifications.
pub const EVENT_SQL: &str = "sql";

/// Maximum tasks executed by a single scheduler run before it bails out.
pub const DEFAULT_MAX_TICKS_PER_RUN: usize = 1_000_000;

/// Number of hex characters kept from a statement's SHA-256 fingerprint.
pub const SQL_FINGERPRINT_LEN: usize = 16;

/// Message used by the `IsInt` validator.
pub const IS_INT_FAILED_MSG: &str = "Validation isInt failed";

/// Default message of the `Len` validator when no custom message is given.
pub const LEN_FAILED_MSG: &str = "Validation len failed";

/// Primary key column every table carries.
pub const PRIMARY_KEY: &str = "id";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Sequel";
