//! Per-cell type repair
//!
//! Each function takes a column of raw text cells and returns one [`Value`]
//! per cell. Nothing here fails: a cell that cannot be coerced becomes
//! [`Value::Null`], which keeps nullability per cell instead of forcing the
//! whole column to a wider type.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::value::{DType, Value};

/// Text forms read as `true` (compared lower-cased).
pub const TRUTHY: [&str; 3] = ["true", "1", "1.0"];

/// Text forms read as `false` (compared lower-cased).
pub const FALSEY: [&str; 3] = ["false", "0", "0.0"];

const DATE_FORMATS: [&str; 6] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%d %b %Y", "%Y%m%d"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("null")
}

/// Coerce cells to integers.
///
/// Integral text parses directly. Float text (`"4.0"`, `"1e3"`) is
/// truncated toward zero, the same as a numeric reader followed by an integer
/// cast. Anything else is null.
pub fn to_integer<S: AsRef<str>>(cells: &[S]) -> Vec<Value> {
    cells.iter().map(|c| parse_integer(c.as_ref())).collect()
}

/// Coerce cells to booleans through [`TRUTHY`] / [`FALSEY`].
pub fn to_boolean<S: AsRef<str>>(cells: &[S]) -> Vec<Value> {
    cells.iter().map(|c| parse_boolean(c.as_ref())).collect()
}

/// Coerce cells to dates, leniently. Unparseable cells are null.
pub fn to_date<S: AsRef<str>>(cells: &[S]) -> Vec<Value> {
    cells
        .iter()
        .map(|c| parse_datetime(c.as_ref()).unwrap_or(Value::Null))
        .collect()
}

/// Coerce cells to floats. `NaN` and unparseable cells are null.
pub fn to_float<S: AsRef<str>>(cells: &[S]) -> Vec<Value> {
    cells.iter().map(|c| parse_float(c.as_ref())).collect()
}

/// Keep cells as text; empty cells are null.
pub fn to_object<S: AsRef<str>>(cells: &[S]) -> Vec<Value> {
    cells
        .iter()
        .map(|c| {
            let c = c.as_ref();
            if c.is_empty() {
                Value::Null
            } else {
                Value::Text(c.to_string())
            }
        })
        .collect()
}

/// Coerce a column to an explicitly requested dtype.
pub fn coerce<S: AsRef<str>>(dtype: DType, cells: &[S]) -> Vec<Value> {
    match dtype {
        DType::Integer => to_integer(cells),
        DType::Boolean => to_boolean(cells),
        DType::Date => to_date(cells),
        DType::Float => to_float(cells),
        DType::Object => to_object(cells),
    }
}

/// Infer a dtype the way a naive reader would and convert the column.
///
/// - every present cell integral and none missing: integer
/// - every present cell numeric (missing cells allowed): float, which is the
///   upcast that [`to_integer`] exists to avoid
/// - every cell a `true`/`false` literal and none missing: boolean
/// - otherwise: object
pub fn infer<S: AsRef<str>>(cells: &[S]) -> (DType, Vec<Value>) {
    let present: Vec<&str> = cells
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| !is_missing(c))
        .collect();
    let any_missing = present.len() < cells.len();

    if present.is_empty() {
        return (DType::Float, vec![Value::Null; cells.len()]);
    }

    if !any_missing && present.iter().all(|c| c.trim().parse::<i64>().is_ok()) {
        return (DType::Integer, to_integer(cells));
    }

    if present.iter().all(|c| c.trim().parse::<f64>().is_ok()) {
        return (DType::Float, to_float(cells));
    }

    if !any_missing
        && present
            .iter()
            .all(|c| c.trim().eq_ignore_ascii_case("true") || c.trim().eq_ignore_ascii_case("false"))
    {
        return (DType::Boolean, to_boolean(cells));
    }

    (DType::Object, to_object(cells))
}

fn parse_integer(cell: &str) -> Value {
    let cell = cell.trim();
    if let Ok(v) = cell.parse::<i64>() {
        return Value::Int(v);
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() < i64::MAX as f64 => Value::Int(v.trunc() as i64),
        _ => Value::Null,
    }
}

fn parse_boolean(cell: &str) -> Value {
    let lower = cell.trim().to_lowercase();
    if TRUTHY.contains(&lower.as_str()) {
        Value::Bool(true)
    } else if FALSEY.contains(&lower.as_str()) {
        Value::Bool(false)
    } else {
        Value::Null
    }
}

fn parse_float(cell: &str) -> Value {
    match cell.trim().parse::<f64>() {
        Ok(v) if !v.is_nan() => Value::Float(v),
        _ => Value::Null,
    }
}

/// Parse a date or timestamp in any of the accepted layouts.
///
/// Returns `Value::Date` for date-only text and `Value::DateTime` when a time
/// component is present. RFC 3339 timestamps with an offset are normalised to
/// UTC.
pub fn parse_datetime(cell: &str) -> Option<Value> {
    let cell = cell.trim();
    if is_missing(cell) {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(cell, format) {
            return Some(Value::Date(d));
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(cell, format) {
            return Some(Value::DateTime(dt));
        }
    }

    DateTime::parse_from_rfc3339(cell)
        .ok()
        .map(|dt| Value::DateTime(dt.naive_utc()))
}
