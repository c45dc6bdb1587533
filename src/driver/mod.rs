//! Database Driver Traits and Core Types
//!
//! This module defines the seam between the executor and the SQL client libraries.
//! Each driver (`MySQL`, `SQLite`) implements [`Driver`], which opens
//! [`Connection`]s from a [`ConnectionProfile`].
//!
//! # Error Classification
//! Drivers translate their native errors before returning them. A dropped
//! connection becomes [`SqlmendError::ConnectionLost`], which the executor
//! answers with a reconnect; everything else becomes [`SqlmendError::Driver`].
//!
//! # Driver Isolation
//! Each driver implementation is completely independent.
//! No shared SQL helpers or cross-driver abstractions beyond this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::cursor::Cursor;
use crate::error::{Result, SqlmendError};
use crate::params::Params;
use crate::statement::Dialect;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Supported driver types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// `MySQL` (includes `MariaDB`)
    #[default]
    MySql,
    /// `SQLite`; the profile's `database` is the file path
    Sqlite,
}

impl DriverKind {
    /// Get the driver name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Port used when the profile names none
    #[must_use]
    pub const fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::Sqlite => None,
        }
    }

    /// Dialect the statement builders render for this driver
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        match self {
            Self::MySql => Dialect::MySql,
            Self::Sqlite => Dialect::Sqlite,
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = SqlmendError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(SqlmendError::invalid_input(format!("Unknown driver '{other}'"))),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

/// Connection credentials and target.
///
/// `Debug` output never includes the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Driver used to open connections
    #[serde(default)]
    pub driver: DriverKind,

    /// Hostname (ignored by sqlite)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number; the driver default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Username (ignored by sqlite)
    #[serde(default)]
    pub username: String,

    /// Password (ignored by sqlite)
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Database name, or the database file for sqlite
    pub database: String,
}

impl ConnectionProfile {
    /// Create a new `MySQL` profile on the default port
    pub fn mysql(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            driver: DriverKind::MySql,
            host: host.into(),
            port: None,
            username: username.into(),
            password: password.into(),
            database: database.into(),
        }
    }

    /// Create a new `SQLite` profile; `path` may be `:memory:`
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            driver: DriverKind::Sqlite,
            host: String::new(),
            port: None,
            username: String::new(),
            password: String::new(),
            database: path.into(),
        }
    }

    /// Override the port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Effective port (explicit or driver default)
    #[must_use]
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.driver.default_port())
    }

    /// Driver-specific connection string, without the password
    #[must_use]
    pub fn dsn(&self) -> String {
        match self.driver {
            DriverKind::MySql => format!(
                "mysql://{}@{}:{}/{}",
                self.username,
                self.host,
                self.effective_port().unwrap_or_default(),
                self.database
            ),
            DriverKind::Sqlite => format!("sqlite://{}", self.database),
        }
    }
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("database", &self.database)
            .finish()
    }
}

/// Opens connections for one kind of database.
pub trait Driver: Send {
    /// Which database this driver talks to
    fn kind(&self) -> DriverKind;

    /// Open a new connection.
    ///
    /// Implementations apply their session setup (character set, encoding)
    /// before returning.
    fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connection>>;
}

/// One live database connection. Dropping it closes it.
pub trait Connection: Send {
    /// Prepare `sql`, bind `params` and execute it
    fn prepare_execute(&mut self, sql: &str, params: &Params) -> Result<Cursor>;

    /// Execute `sql` directly, without binding
    fn query(&mut self, sql: &str) -> Result<Cursor>;

    /// Execute `sql` directly and return the number of affected rows
    fn exec(&mut self, sql: &str) -> Result<u64>;

    /// Render `value` as a literal that is safe to splice into SQL text
    fn quote(&self, value: &Value) -> String;

    /// Start a transaction
    fn begin(&mut self) -> Result<()>;

    /// Commit the active transaction
    fn commit(&mut self) -> Result<()>;

    /// Roll back the active transaction
    fn rollback(&mut self) -> Result<()>;

    /// Whether a transaction is active
    fn in_transaction(&self) -> bool;
}

/// Built-in driver for `kind`
pub fn driver_for(kind: DriverKind) -> Result<Box<dyn Driver>> {
    match kind {
        #[cfg(feature = "mysql")]
        DriverKind::MySql => Ok(Box::new(mysql::MySqlDriver::new()?)),
        #[cfg(feature = "sqlite")]
        DriverKind::Sqlite => Ok(Box::new(sqlite::SqliteDriver)),
        #[allow(unreachable_patterns)]
        other => Err(SqlmendError::config_error(format!(
            "Driver '{other}' is not enabled in this build"
        ))),
    }
}
