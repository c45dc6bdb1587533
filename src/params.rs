//! Bound Parameters
//!
//! Statements are bound either by name (`:name` placeholders) or by position
//! (`?` placeholders). Callers may build either variant directly, or hand over a
//! `serde_json::Value` and let [`Params::from_value`] classify it once at the
//! boundary.

use serde_json::{Map, Value};

/// Prefix that marks a named placeholder in SQL text
pub const NAMED_MARKER: char = ':';

/// Parameters bound to a statement
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// Nothing to bind
    #[default]
    None,
    /// `:name` placeholders, in insertion order; names carry no marker
    Named(Vec<(String, Value)>),
    /// `?` placeholders, in order
    Positional(Vec<Value>),
}

impl Params {
    /// Classify a caller-supplied value.
    ///
    /// - an object with at least one non-numeric key is associative → `Named`
    /// - an array, or an object whose keys are all numeric → `Positional`
    /// - `null` → `None`
    /// - any other scalar → a one-element `Positional`
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::None,
            Value::Array(values) => Self::Positional(values),
            Value::Object(map) if is_associative(&map) => Self::named(map),
            Value::Object(map) => Self::Positional(map.into_iter().map(|(_, v)| v).collect()),
            scalar => Self::Positional(vec![scalar]),
        }
    }

    /// Build named parameters from a mapping, stripping a leading `:` from names
    #[must_use]
    pub fn named(map: Map<String, Value>) -> Self {
        Self::Named(map.into_iter().map(|(k, v)| (strip_marker(&k).to_string(), v)).collect())
    }

    /// Number of bound values
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Named(pairs) => pairs.len(),
            Self::Positional(values) => values.len(),
        }
    }

    /// Whether nothing is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a named value (marker optional)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = strip_marker(name);
        match self {
            Self::Named(pairs) => pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self::named(map)
    }
}

/// Drop one leading `:` from a parameter name
#[must_use]
pub fn strip_marker(name: &str) -> &str {
    name.strip_prefix(NAMED_MARKER).unwrap_or(name)
}

fn is_associative(map: &Map<String, Value>) -> bool {
    map.keys().any(|k| k.parse::<usize>().is_err())
}

/// Render a value as a SQL literal for drivers without an escaping primitive.
///
/// Strings double embedded single quotes; arrays and objects are quoted as JSON text.
#[must_use]
pub fn quote_standard(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_object_is_named() {
        let params = Params::from_value(json!({"firstname": "Jack", ":lastname": "Daniels"}));
        assert_eq!(
            params,
            Params::Named(vec![
                ("firstname".to_string(), json!("Jack")),
                ("lastname".to_string(), json!("Daniels")),
            ])
        );
        assert_eq!(params.get(":lastname"), Some(&json!("Daniels")));
    }

    #[test]
    fn test_numeric_keyed_object_is_positional() {
        let params = Params::from_value(json!({"0": "a", "1": "b"}));
        assert_eq!(params, Params::Positional(vec![json!("a"), json!("b")]));
    }

    #[test]
    fn test_mixed_keys_are_named() {
        let params = Params::from_value(json!({"0": "a", "id": 5}));
        assert!(matches!(params, Params::Named(_)));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_array_and_scalar_are_positional() {
        assert_eq!(Params::from_value(json!([1, 2])), Params::Positional(vec![json!(1), json!(2)]));
        assert_eq!(Params::from_value(json!(5)), Params::Positional(vec![json!(5)]));
        assert_eq!(Params::from_value(json!("x")), Params::Positional(vec![json!("x")]));
    }

    #[test]
    fn test_null_binds_nothing() {
        let params = Params::from_value(Value::Null);
        assert_eq!(params, Params::None);
        assert!(params.is_empty());
    }

    #[test]
    fn test_strip_marker_only_once() {
        assert_eq!(strip_marker(":id"), "id");
        assert_eq!(strip_marker("::id"), ":id");
        assert_eq!(strip_marker("id"), "id");
    }

    #[test]
    fn test_quote_standard() {
        assert_eq!(quote_standard(&json!("O'Brien")), "'O''Brien'");
        assert_eq!(quote_standard(&json!(42)), "42");
        assert_eq!(quote_standard(&json!(null)), "NULL");
        assert_eq!(quote_standard(&json!(true)), "1");
        assert_eq!(quote_standard(&json!({"a": "it's"})), r#"'{"a":"it''s"}'"#);
    }
}
