//! `SQLite` Driver Implementation
//!
//! This module implements the `Driver` trait for `SQLite` databases.
//!
//! # Features
//! - File-based connections (`/path/to/db.sqlite`)
//! - In-memory connections (`:memory:`); every reconnect starts from an empty database
//! - Named (`:name`) and positional (`?`) parameter binding
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver, no async needed)
//! - A local file never "goes away", so no error is classified as transient
//! - BLOB data is Base64-encoded for JSON safety
//! - Transaction state comes from `SQLite`'s autocommit flag

use rusqlite::types::{ToSql, Value as SqlValue, ValueRef};
use rusqlite::{Connection as RawConnection, OpenFlags, Row, Statement};
use serde_json::Value;
use tracing::debug;

use crate::cursor::Cursor;
use crate::driver::{Connection, ConnectionProfile, Driver, DriverKind};
use crate::error::{Result, SqlmendError};
use crate::params::{quote_standard, Params, NAMED_MARKER};

/// `SQLite` driver; the profile's `database` is the file path
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connection>> {
        if profile.database.is_empty() {
            return Err(SqlmendError::invalid_input("SQLite requires a database file path"));
        }

        let conn = open_connection(&profile.database)?;
        conn.execute_batch("PRAGMA encoding = 'UTF-8';").map_err(|e| {
            SqlmendError::connection_failed(format!("Failed to configure SQLite connection: {e}"))
        })?;

        debug!("Opened SQLite database at {}", profile.database);
        Ok(Box::new(SqliteConnection { conn }))
    }
}

/// Open `SQLite` connection (read-write, created if missing)
fn open_connection(path: &str) -> Result<RawConnection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    RawConnection::open_with_flags(path, flags).map_err(|e| {
        SqlmendError::connection_failed(format!("Failed to open SQLite database '{path}': {e}"))
    })
}

/// Live `SQLite` connection
pub struct SqliteConnection {
    conn: RawConnection,
}

impl Connection for SqliteConnection {
    fn prepare_execute(&mut self, sql: &str, params: &Params) -> Result<Cursor> {
        let mut stmt = self.conn.prepare(sql).map_err(driver_error)?;

        match params {
            Params::None => execute_statement(&self.conn, sql, &mut stmt, []),
            Params::Positional(values) => {
                let values: Vec<SqlValue> = values.iter().map(to_sql_value).collect();
                execute_statement(&self.conn, sql, &mut stmt, rusqlite::params_from_iter(values.iter()))
            }
            Params::Named(pairs) => {
                let named: Vec<(String, SqlValue)> = pairs
                    .iter()
                    .map(|(name, value)| (format!("{NAMED_MARKER}{name}"), to_sql_value(value)))
                    .collect();
                let bound: Vec<(&str, &dyn ToSql)> =
                    named.iter().map(|(name, value)| (name.as_str(), value as &dyn ToSql)).collect();
                execute_statement(&self.conn, sql, &mut stmt, bound.as_slice())
            }
        }
    }

    fn query(&mut self, sql: &str) -> Result<Cursor> {
        let mut stmt = self.conn.prepare(sql).map_err(driver_error)?;
        execute_statement(&self.conn, sql, &mut stmt, [])
    }

    fn exec(&mut self, sql: &str) -> Result<u64> {
        // changes() keeps the last DML count across DDL, so diff the running total
        let before = total_changes(&self.conn)?;
        self.conn.execute_batch(sql).map_err(driver_error)?;
        Ok(total_changes(&self.conn)?.saturating_sub(before))
    }

    fn quote(&self, value: &Value) -> String {
        quote_standard(value)
    }

    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN").map_err(driver_error)
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT").map_err(driver_error)
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK").map_err(driver_error)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

/// Rows changed by every statement on this connection so far
fn total_changes(conn: &RawConnection) -> Result<u64> {
    let total: i64 =
        conn.query_row("SELECT total_changes()", [], |row| row.get(0)).map_err(driver_error)?;
    Ok(u64::try_from(total).unwrap_or_default())
}

/// Whether `sql` writes new rows, so `last_insert_rowid()` belongs to it
fn is_insert(sql: &str) -> bool {
    let keyword = sql.trim_start().split_whitespace().next().unwrap_or_default();
    keyword.eq_ignore_ascii_case("INSERT") || keyword.eq_ignore_ascii_case("REPLACE")
}

/// Run a prepared statement and materialize its outcome
fn execute_statement<P: rusqlite::Params>(
    conn: &RawConnection,
    sql: &str,
    stmt: &mut Statement<'_>,
    params: P,
) -> Result<Cursor> {
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    if column_names.is_empty() {
        // Non-SELECT statement (INSERT, UPDATE, DELETE, DDL)
        let affected = stmt.execute(params).map_err(driver_error)?;
        // last_insert_rowid() is connection-wide; only an INSERT that wrote a row owns it
        let last_insert_id = (affected > 0 && is_insert(sql))
            .then(|| conn.last_insert_rowid())
            .and_then(|id| u64::try_from(id).ok())
            .filter(|id| *id > 0);
        return Ok(Cursor::affected(affected as u64, last_insert_id));
    }

    let mut rows = stmt.query(params).map_err(driver_error)?;
    let mut rows_data = Vec::new();
    while let Some(row) = rows.next().map_err(driver_error)? {
        rows_data.push(row_to_json(column_names.len(), row).map_err(driver_error)?);
    }

    Ok(Cursor::with_rows(column_names, rows_data))
}

/// Translate a `rusqlite` error, keeping the extended result code
fn driver_error(err: rusqlite::Error) -> SqlmendError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code),
        _ => None,
    };
    SqlmendError::driver("sqlite", code, err.to_string())
}

/// Convert a bound JSON value to a `SQLite` value
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert a `SQLite` row to a JSON-safe `Vec`
fn row_to_json(column_count: usize, row: &Row) -> std::result::Result<Vec<Value>, rusqlite::Error> {
    (0..column_count).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

/// Convert `SQLite` value to JSON value
fn sqlite_value_to_json(row: &Row, idx: usize) -> std::result::Result<Value, rusqlite::Error> {
    let value_ref = row.get_ref(idx)?;

    Ok(match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number), // NaN/Infinity
        ValueRef::Text(s) => {
            let text = std::str::from_utf8(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Value::String(text.to_string())
        }
        ValueRef::Blob(b) => {
            use base64::Engine;
            Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
