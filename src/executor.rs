//! Resilient Statement Executor
//!
//! [`Executor`] owns one connection profile, one live connection and at most
//! one open cursor. Every data operation goes through the same protocol:
//!
//! 1. close the previous cursor
//! 2. record the SQL text
//! 3. attempt the statement; when the driver reports a lost connection,
//!    reconnect and try again, up to [`RetryPolicy::max_attempts`] attempts
//! 4. fail with [`SqlmendError::RetriesExhausted`] when the budget runs out
//!
//! Any error other than a lost connection is returned on the spot, without a
//! reconnect. Transaction control is passed straight to the connection and is
//! never retried, since a reconnect would silently drop the transaction. For
//! the same reason a statement that loses the connection while a transaction
//! is open is not replayed: the executor reconnects (outside any transaction)
//! and returns [`SqlmendError::ConnectionLost`] so the caller can start over.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use sqlmend::{ConnectionProfile, Executor, FetchMode};
//!
//! let mut db = Executor::new(ConnectionProfile::mysql("localhost", "app", "secret", "shop"))?;
//! let id = db.insert("user", &json!({"firstname": "Jack", "lastname": "Daniels"}))?;
//! let user = db.fetch_one("SELECT * FROM user WHERE id = ?", json!(id), FetchMode::Assoc)?;
//! # Ok::<(), sqlmend::SqlmendError>(())
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config;
use crate::cursor::{Cursor, FetchMode};
use crate::driver::{driver_for, Connection, ConnectionProfile, Driver};
use crate::error::{Result, SqlmendError};
use crate::params::Params;
use crate::statement::{self, Dialect, Statement};

/// Attempt budget for one top-level operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never below 1.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 3;

    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1) }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS)
    }
}

/// What the last statement left behind
#[derive(Debug, Default)]
struct StatementContext {
    sql: Option<String>,
    cursor: Option<Cursor>,
    last_insert_id: Option<u64>,
}

/// Blocking SQL executor with reconnect-on-timeout.
///
/// Not meant to be shared between threads; use one executor per thread.
pub struct Executor {
    profile: ConnectionProfile,
    driver: Box<dyn Driver>,
    conn: Option<Box<dyn Connection>>,
    context: StatementContext,
    retry: RetryPolicy,
}

impl Executor {
    /// Connect with the built-in driver named by `profile.driver`
    pub fn new(profile: ConnectionProfile) -> Result<Self> {
        let driver = driver_for(profile.driver)?;
        Self::with_driver(profile, driver)
    }

    /// Connect with a caller-supplied driver
    pub fn with_driver(profile: ConnectionProfile, driver: Box<dyn Driver>) -> Result<Self> {
        let mut executor = Self {
            profile,
            driver,
            conn: None,
            context: StatementContext::default(),
            retry: RetryPolicy::default(),
        };
        executor.reconnect()?;
        Ok(executor)
    }

    /// Connect using a named profile from the configuration files.
    ///
    /// `None` picks the default profile.
    pub fn from_config(name: Option<&str>) -> Result<Self> {
        let (profile, retry) = config::resolve_profile(name)?;
        Ok(Self::new(profile)?.with_retry_policy(retry))
    }

    /// Replace the retry budget
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Dialect used by [`insert`](Self::insert), [`update`](Self::update) and [`delete`](Self::delete)
    pub fn dialect(&self) -> Dialect {
        self.driver.kind().dialect()
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Store `profile` and open a fresh connection with it
    pub fn connect(&mut self, profile: ConnectionProfile) -> Result<()> {
        if profile.driver != self.driver.kind() {
            self.driver = driver_for(profile.driver)?;
        }
        self.profile = profile;
        self.reconnect()
    }

    /// Drop the current connection and open a new one with the stored profile.
    ///
    /// On failure the executor is left without a connection.
    pub fn reconnect(&mut self) -> Result<()> {
        self.close_cursor();
        self.conn = None;

        info!(dsn = %self.profile.dsn(), "connecting");
        self.conn = Some(self.driver.connect(&self.profile)?);
        Ok(())
    }

    /// Switch to another database with the same credentials.
    ///
    /// Clears the last statement, cursor and insert id.
    pub fn set_database(&mut self, database: impl Into<String>) -> Result<()> {
        self.context = StatementContext::default();
        self.profile.database = database.into();
        self.reconnect()
    }

    /// Close the cursor and the connection. Calling it again does nothing.
    pub fn close(&mut self) {
        self.close_cursor();
        if self.conn.take().is_some() {
            debug!(dsn = %self.profile.dsn(), "connection closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Release the open cursor. Returns whether one was open.
    pub fn close_cursor(&mut self) -> bool {
        self.context.cursor.take().is_some()
    }

    // ------------------------------------------------------------------
    // Last statement context
    // ------------------------------------------------------------------

    /// SQL text of the most recent statement
    pub fn last_query(&self) -> Option<&str> {
        self.context.sql.as_deref()
    }

    /// Identifier generated by the most recent statement that produced one
    pub fn last_insert_id(&self) -> Option<u64> {
        self.context.last_insert_id
    }

    /// Row count of the open cursor: rows affected for DML, rows returned for queries
    pub fn count(&self) -> u64 {
        self.context.cursor.as_ref().map_or(0, Cursor::row_count)
    }

    // ------------------------------------------------------------------
    // Raw passthrough
    // ------------------------------------------------------------------

    /// Run `sql` without binding; the caller is responsible for escaping
    pub fn query(&mut self, sql: &str, mode: FetchMode) -> Result<&mut Cursor> {
        let cursor = self.execute_with_retry(sql, |conn| conn.query(sql))?;
        Ok(self.store(cursor, mode))
    }

    /// Run `sql` without binding and return the number of affected rows
    pub fn exec(&mut self, sql: &str) -> Result<u64> {
        let cursor =
            self.execute_with_retry(sql, |conn| conn.exec(sql).map(|n| Cursor::affected(n, None)))?;
        Ok(self.store(cursor, FetchMode::default()).row_count())
    }

    /// Quote `value` as a SQL literal for use with [`query`](Self::query) or [`exec`](Self::exec)
    pub fn quote(&self, value: &Value) -> Result<String> {
        let conn = self.conn.as_deref().ok_or(SqlmendError::NotConnected)?;
        Ok(conn.quote(value))
    }

    // ------------------------------------------------------------------
    // Parameterized reads
    // ------------------------------------------------------------------

    /// Run a parameterized statement and return its first row
    pub fn fetch_one(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        mode: FetchMode,
    ) -> Result<Option<Value>> {
        Ok(self.fetch_many(sql, params, mode)?.fetch())
    }

    /// Run a parameterized statement and deserialize its first row into `T`
    pub fn fetch_one_as<T: DeserializeOwned>(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Option<T>> {
        self.fetch_many(sql, params, FetchMode::Obj)?.fetch_as()
    }

    /// Run a parameterized statement and return its cursor.
    ///
    /// The cursor belongs to the executor and is released by the next operation.
    pub fn fetch_many(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        mode: FetchMode,
    ) -> Result<&mut Cursor> {
        let params = params.into();
        let cursor = self.execute_with_retry(sql, |conn| conn.prepare_execute(sql, &params))?;
        Ok(self.store(cursor, mode))
    }

    // ------------------------------------------------------------------
    // Statement builders
    // ------------------------------------------------------------------

    /// Insert one row built from a column → value mapping.
    ///
    /// Returns the generated identifier (0 when the table has none), or `None`
    /// when no row was written.
    pub fn insert(&mut self, table: &str, data: &Value) -> Result<Option<u64>> {
        let stmt = statement::insert(self.dialect(), table, data)?;
        let cursor = self.run_statement(stmt)?;

        if cursor.row_count() == 0 {
            return Ok(None);
        }
        Ok(Some(cursor.last_insert_id().unwrap_or_default()))
    }

    /// Update rows matching every condition in `filter`; returns the affected-row count
    pub fn update(&mut self, table: &str, data: &Value, filter: &Value) -> Result<u64> {
        let stmt = statement::update(self.dialect(), table, data, filter)?;
        Ok(self.run_statement(stmt)?.row_count())
    }

    /// Delete rows matching every condition in `filter`; returns the affected-row count.
    ///
    /// An empty `filter` deletes every row.
    pub fn delete(&mut self, table: &str, filter: &Value) -> Result<u64> {
        let stmt = statement::delete(self.dialect(), table, filter)?;
        Ok(self.run_statement(stmt)?.row_count())
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Start a transaction unless one is active. Returns whether one was started.
    pub fn begin_transaction(&mut self) -> Result<bool> {
        let conn = self.connection_mut()?;
        if conn.in_transaction() {
            return Ok(false);
        }
        conn.begin()?;
        debug!("transaction started");
        Ok(true)
    }

    /// Commit the active transaction, if any. Returns whether one was committed.
    pub fn commit(&mut self) -> Result<bool> {
        let conn = self.connection_mut()?;
        if !conn.in_transaction() {
            return Ok(false);
        }
        conn.commit()?;
        debug!("transaction committed");
        Ok(true)
    }

    /// Roll back the active transaction, if any. Returns whether one was rolled back.
    pub fn rollback(&mut self) -> Result<bool> {
        let conn = self.connection_mut()?;
        if !conn.in_transaction() {
            return Ok(false);
        }
        conn.rollback()?;
        debug!("transaction rolled back");
        Ok(true)
    }

    /// Alias for [`begin_transaction`](Self::begin_transaction)
    pub fn start_transaction(&mut self) -> Result<bool> {
        self.begin_transaction()
    }

    /// Alias for [`commit`](Self::commit)
    pub fn end_transaction(&mut self) -> Result<bool> {
        self.commit()
    }

    pub fn in_transaction(&self) -> bool {
        self.conn.as_deref().is_some_and(|conn| conn.in_transaction())
    }

    // ------------------------------------------------------------------
    // Retry protocol
    // ------------------------------------------------------------------

    fn connection_mut(&mut self) -> Result<&mut (dyn Connection + 'static)> {
        self.conn.as_deref_mut().ok_or(SqlmendError::NotConnected)
    }

    fn run_statement(&mut self, stmt: Statement) -> Result<&mut Cursor> {
        let Statement { sql, params } = stmt;
        let cursor = self.execute_with_retry(&sql, |conn| conn.prepare_execute(&sql, &params))?;
        Ok(self.store(cursor, FetchMode::default()))
    }

    fn store(&mut self, mut cursor: Cursor, mode: FetchMode) -> &mut Cursor {
        if let Some(id) = cursor.last_insert_id() {
            self.context.last_insert_id = Some(id);
        }
        cursor.set_mode(mode);
        self.context.cursor.insert(cursor)
    }

    fn execute_with_retry<F>(&mut self, sql: &str, mut attempt_statement: F) -> Result<Cursor>
    where
        F: FnMut(&mut dyn Connection) -> Result<Cursor>,
    {
        self.close_cursor();
        self.context.sql = Some(sql.to_string());

        let max_attempts = self.retry.max_attempts;
        let mut last_error = String::new();
        let in_transaction = self.in_transaction();

        for attempt in 1..=max_attempts {
            let conn = self.connection_mut()?;
            debug!(attempt, sql, "executing statement");

            match attempt_statement(conn) {
                Ok(cursor) => return Ok(cursor),
                Err(err) if err.is_transient() && in_transaction => {
                    // The transaction died with the connection; replaying would autocommit.
                    error!(sql, error = %err, "connection lost inside a transaction");
                    if let Err(reconnect_err) = self.reconnect() {
                        warn!(error = %reconnect_err, "reconnect after lost transaction failed");
                    }
                    return Err(err);
                }
                Err(err) if err.is_transient() => {
                    warn!(attempt, max_attempts, error = %err, "connection lost, reconnecting");
                    last_error = err.to_string();
                    self.reconnect()?;
                }
                Err(err) => return Err(err),
            }
        }

        error!(attempts = max_attempts, sql, "giving up after repeated connection loss");
        Err(SqlmendError::RetriesExhausted { attempts: max_attempts, last_error })
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.close();
    }
}
