//! MySQL Driver Implementation
//!
//! This module implements the `Driver` trait for MySQL databases (including MariaDB).
//!
//! # Features
//! - Client-server connections via TCP
//! - Named (`:name`) and positional (`?`) parameter binding through prepared statements
//! - `utf8mb4` forced as the session character set on every connection
//! - Dropped connections classified by error code, not by message text
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver) behind a private current-thread tokio runtime
//! - Async operations are wrapped in a synchronous interface with `block_on`,
//!   so a connection must not be used from inside another tokio runtime
//! - BLOB data that is not valid UTF-8 is Base64-encoded for JSON safety
//! - Transaction state is tracked by the connection itself: `begin`/`commit`/`rollback`
//!   and raw `BEGIN`/`START TRANSACTION`/`COMMIT`/`ROLLBACK` statements update it.
//!   Statements that commit implicitly on the server (DDL, `LOCK TABLES`) are not
//!   tracked, so `in_transaction` stays true until an explicit commit or rollback

use std::sync::Arc;

use mysql_async::prelude::*;
use mysql_async::{
    Conn, DriverError, Error as MySqlError, OptsBuilder, Params as MySqlParams, QueryResult, Row,
    Value as MySqlValue,
};
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::cursor::Cursor;
use crate::driver::{Connection, ConnectionProfile, Driver, DriverKind};
use crate::error::{Result, SqlmendError};
use crate::params::Params;

/// Error codes meaning the server closed the connection:
/// 2006 server has gone away, 2013 lost connection during query,
/// 4031 disconnected by the server because of inactivity
pub const CONNECTION_LOST_CODES: [u16; 3] = [2006, 2013, 4031];

/// MySQL driver; owns the runtime shared by all of its connections
pub struct MySqlDriver {
    runtime: Arc<Runtime>,
}

impl MySqlDriver {
    /// Create the driver and its I/O runtime
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build().map_err(|e| {
            SqlmendError::connection_failed(format!("Failed to start MySQL I/O runtime: {e}"))
        })?;
        Ok(Self { runtime: Arc::new(runtime) })
    }
}

impl Driver for MySqlDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::MySql
    }

    fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connection>> {
        let opts = build_mysql_opts(profile)?;

        let conn = self.runtime.block_on(Conn::new(opts)).map_err(|e| {
            SqlmendError::connection_failed(format!(
                "Failed to connect to MySQL at {}: {e}",
                profile.dsn()
            ))
        })?;

        debug!("Opened MySQL connection to {}", profile.dsn());
        Ok(Box::new(MySqlConnection {
            runtime: Arc::clone(&self.runtime),
            conn: Some(conn),
            in_transaction: false,
        }))
    }
}

/// Build MySQL connection options from a `ConnectionProfile`
fn build_mysql_opts(profile: &ConnectionProfile) -> Result<OptsBuilder> {
    if profile.host.is_empty() {
        return Err(SqlmendError::invalid_input("MySQL requires 'host' parameter"));
    }
    if profile.username.is_empty() {
        return Err(SqlmendError::invalid_input("MySQL requires 'username' parameter"));
    }

    let database = (!profile.database.is_empty()).then(|| profile.database.clone());
    let opts = OptsBuilder::default()
        .ip_or_hostname(profile.host.clone())
        .tcp_port(profile.effective_port().unwrap_or(3306))
        .user(Some(profile.username.clone()))
        .pass(Some(profile.password.clone()))
        .db_name(database)
        .init(vec!["SET NAMES utf8mb4"]);

    Ok(opts)
}

/// Live MySQL connection
pub struct MySqlConnection {
    runtime: Arc<Runtime>,
    conn: Option<Conn>,
    in_transaction: bool,
}

impl MySqlConnection {
    fn run_drop(&mut self, sql: &str) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(SqlmendError::NotConnected)?;
        self.runtime.block_on(conn.query_drop(sql)).map_err(classify)?;
        self.track_transaction(sql);
        Ok(())
    }

    fn track_transaction(&mut self, sql: &str) {
        if let Some(active) = transaction_effect(sql) {
            self.in_transaction = active;
        }
    }
}

impl Connection for MySqlConnection {
    fn prepare_execute(&mut self, sql: &str, params: &Params) -> Result<Cursor> {
        let params = to_mysql_params(params);
        let conn = self.conn.as_mut().ok_or(SqlmendError::NotConnected)?;

        let cursor = self
            .runtime
            .block_on(async move {
                let mut result = conn.exec_iter(sql, params).await?;
                collect_cursor(&mut result).await
            })
            .map_err(classify)?;
        self.track_transaction(sql);
        Ok(cursor)
    }

    fn query(&mut self, sql: &str) -> Result<Cursor> {
        let conn = self.conn.as_mut().ok_or(SqlmendError::NotConnected)?;

        let cursor = self
            .runtime
            .block_on(async move {
                let mut result = conn.query_iter(sql).await?;
                collect_cursor(&mut result).await
            })
            .map_err(classify)?;
        self.track_transaction(sql);
        Ok(cursor)
    }

    fn exec(&mut self, sql: &str) -> Result<u64> {
        self.run_drop(sql)?;
        Ok(self.conn.as_ref().map_or(0, Conn::affected_rows))
    }

    fn quote(&self, value: &Value) -> String {
        to_mysql_value(value).as_sql(false)
    }

    fn begin(&mut self) -> Result<()> {
        self.run_drop("START TRANSACTION")
    }

    fn commit(&mut self) -> Result<()> {
        self.run_drop("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.run_drop("ROLLBACK")
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

impl Drop for MySqlConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = self.runtime.block_on(conn.disconnect()) {
                debug!("MySQL disconnect failed: {e}");
            }
        }
    }
}

/// Materialize the current result set
async fn collect_cursor<P: Protocol>(
    result: &mut QueryResult<'_, 'static, P>,
) -> mysql_async::Result<Cursor> {
    let affected = result.affected_rows();
    let last_insert_id = result.last_insert_id().filter(|id| *id > 0);
    let column_names: Vec<String> = result
        .columns()
        .map(|columns| columns.iter().map(|col| col.name_str().to_string()).collect())
        .unwrap_or_default();

    let rows: Vec<Row> = result.collect().await?;

    if column_names.is_empty() {
        // Statement does not return rows (INSERT, UPDATE, DELETE, DDL)
        return Ok(Cursor::affected(affected, last_insert_id));
    }

    let rows_data = rows.iter().map(row_to_json).collect();
    Ok(Cursor::with_rows(column_names, rows_data))
}

/// Transaction state after `sql` succeeds, when `sql` is a transaction control statement
fn transaction_effect(sql: &str) -> Option<bool> {
    let words: Vec<String> = sql
        .split(|c: char| c.is_whitespace() || c == ';')
        .filter(|w| !w.is_empty())
        .take(3)
        .map(str::to_ascii_uppercase)
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();

    match words.as_slice() {
        ["BEGIN", ..] | ["START", "TRANSACTION", ..] => Some(true),
        ["ROLLBACK", "TO", ..] => None,
        // AND CHAIN opens a new transaction right away
        ["COMMIT" | "ROLLBACK", "AND", "CHAIN"] => Some(true),
        ["COMMIT" | "ROLLBACK", ..] => Some(false),
        _ => None,
    }
}

/// Translate a `mysql_async` error; dropped connections become `ConnectionLost`
fn classify(err: MySqlError) -> SqlmendError {
    match &err {
        MySqlError::Server(server) if CONNECTION_LOST_CODES.contains(&server.code) => {
            SqlmendError::connection_lost("mysql", err.to_string())
        }
        MySqlError::Io(_) | MySqlError::Driver(DriverError::ConnectionClosed) => {
            SqlmendError::connection_lost("mysql", err.to_string())
        }
        MySqlError::Server(server) => {
            SqlmendError::driver("mysql", Some(i32::from(server.code)), err.to_string())
        }
        _ => SqlmendError::driver("mysql", None, err.to_string()),
    }
}

fn to_mysql_params(params: &Params) -> MySqlParams {
    match params {
        Params::None => MySqlParams::Empty,
        Params::Positional(values) => {
            MySqlParams::Positional(values.iter().map(to_mysql_value).collect())
        }
        Params::Named(pairs) => MySqlParams::Named(
            pairs.iter().map(|(name, value)| (name.as_bytes().to_vec(), to_mysql_value(value))).collect(),
        ),
    }
}

/// Convert a bound JSON value to a MySQL value
fn to_mysql_value(value: &Value) -> MySqlValue {
    match value {
        Value::Null => MySqlValue::NULL,
        Value::Bool(b) => MySqlValue::Int(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MySqlValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                MySqlValue::UInt(u)
            } else {
                n.as_f64().map_or(MySqlValue::NULL, MySqlValue::Double)
            }
        }
        Value::String(s) => MySqlValue::Bytes(s.as_bytes().to_vec()),
        other => MySqlValue::Bytes(other.to_string().into_bytes()),
    }
}

/// Convert a MySQL row to a JSON-safe `Vec`
fn row_to_json(row: &Row) -> Vec<Value> {
    (0..row.len()).map(|idx| row.as_ref(idx).map_or(Value::Null, mysql_value_to_json)).collect()
}

/// Convert MySQL value to JSON value
fn mysql_value_to_json(value: &MySqlValue) -> Value {
    match value {
        MySqlValue::NULL => Value::Null,

        MySqlValue::Bytes(bytes) => {
            if let Ok(s) = std::str::from_utf8(bytes) {
                Value::String(s.to_string())
            } else {
                use base64::Engine;
                Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        }

        MySqlValue::Int(i) => Value::Number((*i).into()),

        MySqlValue::UInt(u) => Value::Number((*u).into()),

        MySqlValue::Float(f) => {
            serde_json::Number::from_f64(f64::from(*f)).map_or(Value::Null, Value::Number)
        }

        MySqlValue::Double(d) => serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number),

        MySqlValue::Date(year, month, day, hour, minute, second, micro) => Value::String(format!(
            "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"
        )),

        MySqlValue::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            Value::String(format!("{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"))
        }
    }
}
