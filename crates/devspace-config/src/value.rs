//! Typed variable values and coercion of raw answers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved variable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    String(String),
}

/// Convert a raw string into its most specific scalar.
///
/// `"true"` and `"false"` become booleans, base-10 integers become `Int`,
/// everything else is kept as the original string.
pub fn coerce(raw: &str) -> VarValue {
    match raw {
        "true" => VarValue::Bool(true),
        "false" => VarValue::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(VarValue::Int)
            .unwrap_or_else(|_| VarValue::String(raw.to_string())),
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Bool(b) => write!(f, "{b}"),
            VarValue::Int(i) => write!(f, "{i}"),
            VarValue::String(s) => f.write_str(s),
        }
    }
}

impl From<VarValue> for serde_yaml::Value {
    fn from(value: VarValue) -> Self {
        match value {
            VarValue::Bool(b) => serde_yaml::Value::Bool(b),
            VarValue::Int(i) => serde_yaml::Value::Number(i.into()),
            VarValue::String(s) => serde_yaml::Value::String(s),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::String(s.to_string())
    }
}

impl From<i64> for VarValue {
    fn from(i: i64) -> Self {
        VarValue::Int(i)
    }
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self {
        VarValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_booleans() {
        assert_eq!(coerce("true"), VarValue::Bool(true));
        assert_eq!(coerce("false"), VarValue::Bool(false));
        // Only the exact lowercase literals are booleans
        assert_eq!(coerce("True"), VarValue::String("True".to_string()));
    }

    #[test]
    fn test_coerce_integers() {
        assert_eq!(coerce("3"), VarValue::Int(3));
        assert_eq!(coerce("-42"), VarValue::Int(-42));
        assert_eq!(coerce("007"), VarValue::Int(7));
    }

    #[test]
    fn test_coerce_falls_back_to_string() {
        assert_eq!(coerce("3.5"), VarValue::String("3.5".to_string()));
        assert_eq!(coerce("v7"), VarValue::String("v7".to_string()));
        assert_eq!(coerce(" 3"), VarValue::String(" 3".to_string()));
        assert_eq!(coerce(""), VarValue::String(String::new()));
        assert_eq!(
            coerce("99999999999999999999"),
            VarValue::String("99999999999999999999".to_string())
        );
    }

    #[test]
    fn test_into_yaml_value() {
        assert_eq!(
            serde_yaml::Value::from(VarValue::Int(7)),
            serde_yaml::Value::Number(7.into())
        );
        assert_eq!(
            serde_yaml::Value::from(VarValue::Bool(true)),
            serde_yaml::Value::Bool(true)
        );
        assert_eq!(
            serde_yaml::Value::from(VarValue::from("v7")),
            serde_yaml::Value::String("v7".to_string())
        );
    }

    #[test]
    fn test_untagged_yaml_roundtrip_keeps_types() {
        let parsed: Vec<VarValue> = serde_yaml::from_str("[true, 5, \"5\", hello]").unwrap();
        assert_eq!(
            parsed,
            vec![
                VarValue::Bool(true),
                VarValue::Int(5),
                VarValue::String("5".to_string()),
                VarValue::String("hello".to_string()),
            ]
        );
    }
}
