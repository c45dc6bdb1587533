//! Result cursors and fetch modes.

use std::collections::VecDeque;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SqlmendError};

/// Shape of a fetched row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Object keyed by column name
    #[default]
    Assoc,
    /// Object keyed by column name and by column index
    Both,
    /// Array in column order
    Num,
    /// Object keyed by column name, meant for deserializing into a struct
    Obj,
}

impl FetchMode {
    /// Mode name as accepted by [`FromStr`]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Assoc => "assoc",
            Self::Both => "both",
            Self::Num => "num",
            Self::Obj => "obj",
        }
    }
}

impl FromStr for FetchMode {
    type Err = SqlmendError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "assoc" => Ok(Self::Assoc),
            "both" => Ok(Self::Both),
            "num" => Ok(Self::Num),
            "obj" => Ok(Self::Obj),
            other => Err(SqlmendError::invalid_input(format!(
                "Unknown fetch mode '{other}', expected one of: assoc, both, num, obj"
            ))),
        }
    }
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Materialized result of one executed statement.
///
/// Rows are read front to back; a fetched row is gone from the cursor.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
    row_count: u64,
    last_insert_id: Option<u64>,
    mode: FetchMode,
}

impl Cursor {
    /// Cursor over a result set. `row_count` is the number of rows returned.
    #[must_use]
    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len() as u64;
        Self { columns, rows: rows.into(), row_count, ..Self::default() }
    }

    /// Cursor for a statement that returned no rows
    #[must_use]
    pub fn affected(row_count: u64, last_insert_id: Option<u64>) -> Self {
        Self { row_count, last_insert_id, ..Self::default() }
    }

    pub(crate) fn set_mode(&mut self, mode: FetchMode) {
        self.mode = mode;
    }

    /// Column names in result order
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows returned (for result sets) or rows affected (for DML)
    #[must_use]
    pub const fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Identifier generated by the statement, if any
    #[must_use]
    pub const fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    /// Default mode used by [`Cursor::fetch`]
    #[must_use]
    pub const fn mode(&self) -> FetchMode {
        self.mode
    }

    /// Rows not fetched yet
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Next row in the cursor's default mode
    pub fn fetch(&mut self) -> Option<Value> {
        self.fetch_with(self.mode)
    }

    /// Next row in the given mode
    pub fn fetch_with(&mut self, mode: FetchMode) -> Option<Value> {
        let row = self.rows.pop_front()?;
        Some(shape_row(&self.columns, row, mode))
    }

    /// All remaining rows in the cursor's default mode
    pub fn fetch_all(&mut self) -> Vec<Value> {
        std::iter::from_fn(|| self.fetch()).collect()
    }

    /// Next row deserialized into `T`
    pub fn fetch_as<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        self.fetch_with(FetchMode::Obj)
            .map(|row| serde_json::from_value(row).map_err(|e| SqlmendError::Decode(e.to_string())))
            .transpose()
    }
}

impl Iterator for Cursor {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.fetch()
    }
}

fn shape_row(columns: &[String], row: Vec<Value>, mode: FetchMode) -> Value {
    match mode {
        FetchMode::Num => Value::Array(row),
        FetchMode::Assoc | FetchMode::Obj => {
            Value::Object(columns.iter().cloned().zip(row).collect::<Map<String, Value>>())
        }
        FetchMode::Both => {
            let mut map = Map::new();
            for (idx, (name, value)) in columns.iter().zip(row).enumerate() {
                map.insert(name.clone(), value.clone());
                map.insert(idx.to_string(), value);
            }
            Value::Object(map)
        }
    }
}
