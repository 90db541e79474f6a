//! Host-independent scalar values and rows

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A dynamically typed column value, mirroring SQLite's storage classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert a comparison operand the way SQLite does when the other side
    /// is a column of the given affinity.
    ///
    /// Numeric affinities turn well-formed numeric text into a number; text
    /// affinity renders numbers as text. Everything else is left alone.
    pub fn with_affinity(self, affinity: Affinity) -> Value {
        match (affinity, self) {
            (Affinity::Integer | Affinity::Real | Affinity::Numeric, Value::Text(t)) => {
                parse_numeric(&t).unwrap_or(Value::Text(t))
            }
            (Affinity::Text, Value::Integer(i)) => Value::Text(i.to_string()),
            (Affinity::Text, Value::Real(f)) => Value::Text(render_real(f)),
            (_, value) => value,
        }
    }

    /// Compare two values the way SQLite orders storage classes:
    /// numbers < text < blob. NULL compares to nothing.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Integer(_) | Value::Real(_) => 1,
                Value::Text(_) => 2,
                Value::Blob(_) => 3,
            }
        }
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (a, b) if rank(a) == 1 && rank(b) == 1 => {
                let (x, y) = (a.as_f64()?, b.as_f64()?);
                x.partial_cmp(&y)
            }
            (a, b) => Some(rank(a).cmp(&rank(b))),
        }
    }
}

/// Column affinity, derived from a declared type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Affinity {
    Integer,
    Real,
    Text,
    /// No conversion at all; also what an untyped column gets.
    Blob,
    Numeric,
}

impl Affinity {
    /// SQLite's affinity rules, checked in the same order SQLite checks them.
    pub fn from_declared(declared: &str) -> Self {
        let ty = declared.to_ascii_uppercase();
        if ty.contains("INT") {
            Affinity::Integer
        } else if ty.contains("CHAR") || ty.contains("CLOB") || ty.contains("TEXT") {
            Affinity::Text
        } else if ty.is_empty() || ty.contains("BLOB") {
            Affinity::Blob
        } else if ty.contains("REAL") || ty.contains("FLOA") || ty.contains("DOUB") {
            Affinity::Real
        } else {
            Affinity::Numeric
        }
    }
}

fn parse_numeric(text: &str) -> Option<Value> {
    let t = text.trim();
    let numeric_chars = t
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if t.is_empty() || !numeric_chars || !t.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    t.parse::<f64>().ok().map(Value::Real)
}

// Integral reals keep a trailing ".0", as SQLite prints them.
fn render_real(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

/// A stored row: its rowid and one value per declared column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub rowid: i64,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(rowid: i64, values: Vec<Value>) -> Self {
        Self { rowid, values }
    }

    pub fn value(&self, column: usize) -> Option<&Value> {
        self.values.get(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_cmp_numeric_mix() {
        assert_eq!(
            Value::Integer(2).sql_cmp(&Value::Real(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Real(3.0).sql_cmp(&Value::Integer(3)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_sql_cmp_storage_classes() {
        assert_eq!(
            Value::Integer(100).sql_cmp(&Value::from("1")),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::from("zzz").sql_cmp(&Value::Blob(vec![0])),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Null.sql_cmp(&Value::Integer(1)), None);
        assert_eq!(Value::Integer(1).sql_cmp(&Value::Null), None);
    }

    #[test]
    fn test_affinity_from_declared_type() {
        assert_eq!(Affinity::from_declared("INTEGER"), Affinity::Integer);
        assert_eq!(Affinity::from_declared("bigint"), Affinity::Integer);
        assert_eq!(Affinity::from_declared("VARCHAR(10)"), Affinity::Text);
        assert_eq!(Affinity::from_declared("TEXT"), Affinity::Text);
        assert_eq!(Affinity::from_declared(""), Affinity::Blob);
        assert_eq!(Affinity::from_declared("BLOB"), Affinity::Blob);
        assert_eq!(Affinity::from_declared("REAL"), Affinity::Real);
        assert_eq!(Affinity::from_declared("DOUBLE"), Affinity::Real);
        assert_eq!(Affinity::from_declared("DECIMAL"), Affinity::Numeric);
    }

    #[test]
    fn test_numeric_affinity_converts_numeric_text() {
        assert_eq!(Value::from("1").with_affinity(Affinity::Integer), Value::Integer(1));
        assert_eq!(Value::from(" 42 ").with_affinity(Affinity::Integer), Value::Integer(42));
        assert_eq!(Value::from("0.5").with_affinity(Affinity::Real), Value::Real(0.5));
        assert_eq!(Value::from("1e3").with_affinity(Affinity::Numeric), Value::Real(1000.0));
        assert_eq!(Value::from("abc").with_affinity(Affinity::Integer), Value::from("abc"));
        assert_eq!(Value::from("inf").with_affinity(Affinity::Real), Value::from("inf"));
        assert_eq!(Value::from("-").with_affinity(Affinity::Integer), Value::from("-"));
        assert_eq!(
            Value::Blob(vec![0x31]).with_affinity(Affinity::Integer),
            Value::Blob(vec![0x31])
        );
    }

    #[test]
    fn test_text_affinity_renders_numbers() {
        assert_eq!(Value::Integer(7).with_affinity(Affinity::Text), Value::from("7"));
        assert_eq!(Value::Real(2.0).with_affinity(Affinity::Text), Value::from("2.0"));
        assert_eq!(Value::Real(0.25).with_affinity(Affinity::Text), Value::from("0.25"));
        assert_eq!(Value::Integer(7).with_affinity(Affinity::Blob), Value::Integer(7));
    }
}
