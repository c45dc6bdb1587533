//! sqlmend - Resilient SQL Statement Executor
//!
//! sqlmend is a thin, blocking wrapper over a SQL client library that survives
//! dropped connections. When the server closes an idle connection ("server has
//! gone away"), the executor reconnects and replays the statement, giving up
//! after a bounded number of attempts.
//!
//! # Core Principles
//! - Parameters are always bound by the driver, never interpolated
//! - Only connection loss is retried; every other error surfaces immediately
//! - Transactions are passed through and never replayed
//! - Vendor-specific SQL, no query language abstraction
//!
//! # Module Organization
//! - [`error`] - Error types and transient-error classification
//! - [`driver`] - Driver/connection traits, `MySQL` and `SQLite` backends
//! - [`params`] - Named and positional bind parameters
//! - [`cursor`] - Materialized results and fetch modes
//! - [`statement`] - INSERT/UPDATE/DELETE builders
//! - [`executor`] - The reconnect-and-retry executor
//! - [`config`] - Named profile registry
//!
//! # Feature Flags
//! - `mysql` - `MySQL`/`MariaDB` driver (`mysql_async` on a private runtime)
//! - `sqlite` - `SQLite` driver (`rusqlite`, bundled)

pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod executor;
pub mod params;
pub mod statement;

// Re-export commonly used types for convenience
pub use config::{
    list_profiles, load_with_precedence, resolve_profile, save_profile, ConfigLocation,
    ProfileRegistry, StoredProfile,
};
pub use cursor::{Cursor, FetchMode};
pub use driver::{driver_for, Connection, ConnectionProfile, Driver, DriverKind};
pub use error::{Result, SqlmendError};
pub use executor::{Executor, RetryPolicy};
pub use params::Params;
pub use statement::{Dialect, Statement};
