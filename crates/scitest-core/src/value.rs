//! Typed query result values and the generic nested-data form.
//!
//! Declarative files and records are parsed into [`Data`] (a
//! `serde_json::Value` tree regardless of whether the file was YAML or
//! JSON). Quantities turn that tree into a [`Value`] and back.

use std::collections::BTreeMap;
use std::fmt;

/// Generic nested data: maps, sequences and scalars.
pub type Data = serde_json::Value;

/// A mapping node of [`Data`].
pub type ParamMap = serde_json::Map<String, Data>;

/// A result value extracted by a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// A value did not fit the shape a quantity expects.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ValueError(pub String);

impl ValueError {
    pub fn expected(what: &str, data: &Data) -> Self {
        Self(format!("expected {what}, found {}", describe_data(data)))
    }
}

impl Value {
    /// Convert a generic tree into an untyped value.
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::Null => Value::Null,
            Data::Bool(b) => Value::Bool(*b),
            Data::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Data::String(s) => Value::Str(s.clone()),
            Data::Array(items) => Value::Seq(items.iter().map(Value::from_data).collect()),
            Data::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_data(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into the generic tree. Non-finite floats become null.
    pub fn to_data(&self) -> Data {
        match self {
            Value::Null => Data::Null,
            Value::Bool(b) => Data::Bool(*b),
            Value::Int(i) => Data::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Data::Number)
                .unwrap_or(Data::Null),
            Value::Str(s) => Data::String(s.clone()),
            Value::Seq(items) => Data::Array(items.iter().map(Value::to_data).collect()),
            Value::Map(map) => Data::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_data()))
                    .collect(),
            ),
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
        }
    }

    /// Numeric view of the value (integers widen to `f64`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Human-readable name for the shape of a data node.
pub fn describe_data(data: &Data) -> &'static str {
    match data {
        Data::Null => "null",
        Data::Bool(_) => "a boolean",
        Data::Number(n) if n.is_i64() || n.is_u64() => "an integer",
        Data::Number(_) => "a float",
        Data::String(_) => "a string",
        Data::Array(_) => "a sequence",
        Data::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_data_distinguishes_int_and_float() {
        assert_eq!(Value::from_data(&json!(3)), Value::Int(3));
        assert_eq!(Value::from_data(&json!(3.5)), Value::Float(3.5));
    }

    #[test]
    fn test_nested_roundtrip() {
        let data = json!({"a": [1, 2.5, null], "b": {"c": "x", "d": true}});
        assert_eq!(Value::from_data(&data).to_data(), data);
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert_eq!(Value::Float(f64::NAN).to_data(), Data::Null);
    }

    #[test]
    fn test_display() {
        let v = Value::Seq(vec![Value::Int(1), Value::Str("a".to_string())]);
        assert_eq!(v.to_string(), "[1, \"a\"]");
    }

    #[test]
    fn test_value_error_message() {
        let err = ValueError::expected("an integer", &json!("x"));
        assert_eq!(err.to_string(), "expected an integer, found a string");
    }
}
