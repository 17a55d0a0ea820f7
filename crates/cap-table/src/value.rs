//! Cell values and logical column types

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single cell.
///
/// `Null` stands for every flavour of "missing": empty CSV fields, values a
/// repair step could not coerce, and fields a ledger row did not set.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Calendar date of a `Date` or `DateTime` cell
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    /// Equality that treats `Int(1)` and `Float(1.0)` as the same number.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

/// Text form used when a value is written to a delimited file.
///
/// Dates and timestamps are written as `YYYY-MM-DD`; integral floats keep a
/// trailing `.0` so a float column stays recognisably float.
impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d")),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
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

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Logical type of a column.
///
/// `Integer`, `Boolean` and `Date` are the classes a naive parse corrupts when
/// cells are missing; they are always read as text first and repaired cell by
/// cell. `Float` and `Object` are handled natively by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Integer,
    Float,
    Boolean,
    Date,
    Object,
}

/// Accepts both the logical names and the pandas-style spellings that model
/// scripts tend to carry around (`int64`, `Int64`, `bool`, `datetime64[ns]`,
/// `float64`, `object`).
impl std::str::FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower.contains("int") {
            Ok(DType::Integer)
        } else if lower.contains("bool") {
            Ok(DType::Boolean)
        } else if lower.contains("datetime") || lower == "date" {
            Ok(DType::Date)
        } else if lower.contains("float") || lower == "double" {
            Ok(DType::Float)
        } else if matches!(lower.as_str(), "object" | "str" | "string" | "text" | "other") {
            Ok(DType::Object)
        } else {
            Err(format!("Unsupported dtype: {s}"))
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DType::Integer => write!(f, "integer"),
            DType::Float => write!(f, "float"),
            DType::Boolean => write!(f, "boolean"),
            DType::Date => write!(f, "date"),
            DType::Object => write!(f, "object"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_from_pandas_names() {
        assert_eq!("int64".parse::<DType>().unwrap(), DType::Integer);
        assert_eq!("Int64".parse::<DType>().unwrap(), DType::Integer);
        assert_eq!("bool".parse::<DType>().unwrap(), DType::Boolean);
        assert_eq!("datetime64[ns]".parse::<DType>().unwrap(), DType::Date);
        assert_eq!("float64".parse::<DType>().unwrap(), DType::Float);
        assert_eq!("object".parse::<DType>().unwrap(), DType::Object);
        assert!("complex128".parse::<DType>().is_err());
    }

    #[test]
    fn test_display_for_export() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(true).to_string(), "True");

        let dt = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(Value::DateTime(dt).to_string(), "2024-03-31");
    }

    #[test]
    fn test_loose_numeric_equality() {
        assert!(Value::Int(1).loosely_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).loosely_eq(&Value::Text("1".into())));
        assert!(Value::Null.loosely_eq(&Value::Null));
    }
}
