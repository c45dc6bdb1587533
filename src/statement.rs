//! Parameterized statement builders
//!
//! INSERT/UPDATE/DELETE text is assembled from a mapping of column → value.
//! Every column becomes a `:name` placeholder and the values travel as
//! [`Params::Named`]; nothing is interpolated into the SQL. Table and column
//! names are used as given.
//!
//! Builders validate their input before returning, so the executor can reject
//! malformed calls without touching the driver.

use serde_json::{Map, Value};

use crate::error::{Result, SqlmendError};
use crate::params::{strip_marker, Params, NAMED_MARKER};

/// SQL dialect the builders render for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `INSERT INTO t SET a = :a`
    MySql,
    /// `INSERT INTO t (a) VALUES (:a)`
    Sqlite,
}

/// SQL text plus the parameters bound to it
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

/// Build an INSERT for one row.
///
/// `data` must be a non-empty mapping.
pub fn insert(dialect: Dialect, table: &str, data: &Value) -> Result<Statement> {
    let data = require_mapping("insert", "data", data)?;
    let columns: Vec<&str> = data.keys().map(|k| strip_marker(k)).collect();

    let sql = match dialect {
        Dialect::MySql => format!("INSERT INTO {table} SET {}", assignments(&columns, ", ")),
        Dialect::Sqlite => {
            let markers: Vec<String> = columns.iter().map(|c| placeholder(c)).collect();
            format!("INSERT INTO {table} ({}) VALUES ({})", columns.join(", "), markers.join(", "))
        }
    };

    Ok(Statement { sql, params: Params::named(data.clone()) })
}

/// Build an UPDATE.
///
/// `data` must be a non-empty mapping. A non-empty `filter` must be a mapping;
/// its conditions are joined with `AND`. The bound parameters are the union of
/// `data` and `filter`, and `filter` wins when a name appears in both.
pub fn update(_dialect: Dialect, table: &str, data: &Value, filter: &Value) -> Result<Statement> {
    let data = require_mapping("update", "data", data)?;
    let columns: Vec<&str> = data.keys().map(|k| strip_marker(k)).collect();
    let mut sql = format!("UPDATE {table} SET {}", assignments(&columns, ", "));

    let mut bound = normalize(data);
    if !is_empty_filter(filter) {
        let filter = require_mapping("update", "where", filter)?;
        sql.push_str(&where_clause(filter));
        for (name, value) in normalize(filter) {
            bound.insert(name, value);
        }
    }

    Ok(Statement { sql, params: Params::Named(bound.into_iter().collect()) })
}

/// Build a DELETE. An empty `filter` emits no WHERE clause.
pub fn delete(_dialect: Dialect, table: &str, filter: &Value) -> Result<Statement> {
    let mut sql = format!("DELETE FROM {table}");
    let mut params = Params::None;

    if !is_empty_filter(filter) {
        let filter = require_mapping("delete", "where", filter)?;
        sql.push_str(&where_clause(filter));
        params = Params::named(filter.clone());
    }

    Ok(Statement { sql, params })
}

/// `null`, `{}`, `[]` and `""` all mean "no filter"
#[must_use]
pub fn is_empty_filter(filter: &Value) -> bool {
    match filter {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(values) => values.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn require_mapping<'a>(op: &str, arg: &str, value: &'a Value) -> Result<&'a Map<String, Value>> {
    match value {
        Value::Object(map) if !map.is_empty() => Ok(map),
        Value::Object(_) => {
            Err(SqlmendError::invalid_input(format!("{op}: '{arg}' must not be empty")))
        }
        _ => Err(SqlmendError::invalid_input(format!(
            "{op}: '{arg}' must be a mapping of column to value"
        ))),
    }
}

fn normalize(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (strip_marker(k).to_string(), v.clone())).collect()
}

fn placeholder(column: &str) -> String {
    format!("{NAMED_MARKER}{column}")
}

fn assignments(columns: &[&str], separator: &str) -> String {
    columns.iter().map(|c| format!("{c} = {}", placeholder(c))).collect::<Vec<_>>().join(separator)
}

fn where_clause(filter: &Map<String, Value>) -> String {
    let columns: Vec<&str> = filter.keys().map(|k| strip_marker(k)).collect();
    format!(" WHERE {}", assignments(&columns, " AND "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_insert_mysql_set_form() {
        let stmt =
            insert(Dialect::MySql, "user", &json!({"firstname": "Jack", "lastname": "Daniels"}))
                .unwrap();
        assert_snapshot!(stmt.sql, @"INSERT INTO user SET firstname = :firstname, lastname = :lastname");
        assert_eq!(
            stmt.params,
            Params::Named(vec![
                ("firstname".to_string(), json!("Jack")),
                ("lastname".to_string(), json!("Daniels")),
            ])
        );
    }

    #[test]
    fn test_insert_sqlite_values_form() {
        let stmt = insert(Dialect::Sqlite, "user", &json!({"firstname": "Jack", "age": 40})).unwrap();
        assert_snapshot!(stmt.sql, @"INSERT INTO user (firstname, age) VALUES (:firstname, :age)");
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_insert_one_assignment_per_key() {
        let data = json!({"a": 1, "b": 2, "c": 3, "d": 4, "e": 5});
        let stmt = insert(Dialect::MySql, "t", &data).unwrap();
        let set = stmt.sql.strip_prefix("INSERT INTO t SET ").unwrap();
        let clauses: Vec<&str> = set.split(", ").collect();
        assert_eq!(clauses.len(), 5);
        for (clause, key) in clauses.iter().zip(["a", "b", "c", "d", "e"]) {
            assert_eq!(*clause, format!("{key} = :{key}"));
            assert_eq!(stmt.params.get(key), data.get(key));
        }
    }

    #[test]
    fn test_insert_marker_prefix_stripped_from_column() {
        let stmt = insert(Dialect::MySql, "user", &json!({":id": 7, "name": "x"})).unwrap();
        assert_snapshot!(stmt.sql, @"INSERT INTO user SET id = :id, name = :name");
        assert_eq!(stmt.params.get("id"), Some(&json!(7)));
    }

    #[test]
    fn test_insert_rejects_non_mapping() {
        for data in [json!(["Jack"]), json!("Jack"), json!(null), json!({})] {
            let err = insert(Dialect::MySql, "user", &data).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_INPUT", "data: {data}");
        }
    }

    #[test]
    fn test_update_with_where() {
        let stmt =
            update(Dialect::MySql, "user", &json!({"name": "Jim", "age": 41}), &json!({"id": 5}))
                .unwrap();
        assert_snapshot!(stmt.sql, @"UPDATE user SET name = :name, age = :age WHERE id = :id");
        assert_eq!(
            stmt.params,
            Params::Named(vec![
                ("name".to_string(), json!("Jim")),
                ("age".to_string(), json!(41)),
                ("id".to_string(), json!(5)),
            ])
        );
    }

    #[test]
    fn test_update_conditions_joined_with_and() {
        let stmt = update(
            Dialect::Sqlite,
            "user",
            &json!({"active": 0}),
            &json!({"country": "IE", ":age": 30}),
        )
        .unwrap();
        assert_snapshot!(stmt.sql, @"UPDATE user SET active = :active WHERE country = :country AND age = :age");
    }

    #[test]
    fn test_update_where_wins_on_collision() {
        let stmt =
            update(Dialect::MySql, "user", &json!({"id": 1, "name": "x"}), &json!({":id": 9}))
                .unwrap();
        assert_eq!(
            stmt.params,
            Params::Named(vec![("id".to_string(), json!(9)), ("name".to_string(), json!("x"))])
        );
    }

    #[test]
    fn test_update_without_where() {
        for filter in [json!(null), json!({}), json!([]), json!("")] {
            let stmt = update(Dialect::MySql, "user", &json!({"active": 1}), &filter).unwrap();
            assert_eq!(stmt.sql, "UPDATE user SET active = :active");
        }
    }

    #[test]
    fn test_update_rejects_non_mapping_where() {
        let err = update(Dialect::MySql, "user", &json!({"a": 1}), &json!([5])).unwrap_err();
        assert!(matches!(err, SqlmendError::InvalidInput(_)));

        let err = update(Dialect::MySql, "user", &json!([1]), &json!({"id": 5})).unwrap_err();
        assert!(matches!(err, SqlmendError::InvalidInput(_)));
    }

    #[test]
    fn test_delete_with_where() {
        let stmt = delete(Dialect::MySql, "user", &json!({"id": 5})).unwrap();
        assert_snapshot!(stmt.sql, @"DELETE FROM user WHERE id = :id");
        assert_eq!(stmt.params, Params::Named(vec![("id".to_string(), json!(5))]));
    }

    #[test]
    fn test_delete_without_where() {
        let stmt = delete(Dialect::MySql, "user", &json!({})).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM user");
        assert!(!stmt.sql.contains("WHERE"));
        assert_eq!(stmt.params, Params::None);
    }

    #[test]
    fn test_delete_rejects_non_mapping_where() {
        let err = delete(Dialect::MySql, "user", &json!(5)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }
}
