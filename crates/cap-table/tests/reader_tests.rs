//! Reader tests against files on disk

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;

use cap_common::CapError;
use cap_table::{DType, TypeCorrectingReader, Value};
use chrono::NaiveDate;
use tempfile::TempDir;

const MAPPING: &str = "\
InstrumentId,Quantity,IsActive,MaturityDate,Price,Notes
A1,1,true,2030-01-15,10.5,first
A2,2,TRUE,2031-02-28,,
A3,3,1,,11,third
A4,4,,not a date,12.25,
A5,,false,2032/03/31,13,
A6,,0,20330430,abc,
A7,7,0.0,2034-05-31T00:00:00,14,
A8,8,1.0,2035-06-30,15,
A9,9,FALSE,2036-07-31,16,
";

fn write_mapping(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("testMapping1.csv");
    fs::write(&path, MAPPING).unwrap();
    path
}

#[test]
fn test_nullable_integer_column() {
    let dir = TempDir::new().unwrap();
    let path = write_mapping(&dir);

    let table = TypeCorrectingReader::new()
        .dtype("quantity", DType::Integer)
        .read(&path)
        .unwrap();

    let quantity = table.column("Quantity").unwrap();
    assert_eq!(quantity.dtype, DType::Integer);
    assert_eq!(
        quantity.values,
        vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(4),
            Value::Null,
            Value::Null,
            Value::Int(7),
            Value::Int(8),
            Value::Int(9),
        ]
    );
}

#[test]
fn test_unrequested_nullable_integers_upcast_to_float() {
    let dir = TempDir::new().unwrap();
    let path = write_mapping(&dir);

    let table = TypeCorrectingReader::new().read(&path).unwrap();

    let quantity = table.column("Quantity").unwrap();
    assert_eq!(quantity.dtype, DType::Float);
    assert_eq!(quantity.values[0], Value::Float(1.0));
}

#[test]
fn test_nullable_boolean_column() {
    let dir = TempDir::new().unwrap();
    let path = write_mapping(&dir);

    let table = TypeCorrectingReader::new()
        .dtype("ISACTIVE", DType::Boolean)
        .read(&path)
        .unwrap();

    let active: Vec<Option<bool>> = table
        .column("IsActive")
        .unwrap()
        .values
        .iter()
        .map(Value::as_bool)
        .collect();
    assert_eq!(
        active,
        vec![
            Some(true),
            Some(true),
            Some(true),
            None,
            Some(false),
            Some(false),
            Some(false),
            Some(true),
            Some(false),
        ]
    );
}

#[test]
fn test_date_column_nulls_failures() {
    let dir = TempDir::new().unwrap();
    let path = write_mapping(&dir);

    let table = TypeCorrectingReader::new()
        .dtype("maturitydate", DType::Date)
        .read(&path)
        .unwrap();

    let dates: Vec<Option<NaiveDate>> = table
        .column("MaturityDate")
        .unwrap()
        .values
        .iter()
        .map(Value::as_date)
        .collect();
    assert_eq!(dates[0], NaiveDate::from_ymd_opt(2030, 1, 15));
    assert_eq!(dates[2], None);
    assert_eq!(dates[3], None);
    assert_eq!(dates[4], NaiveDate::from_ymd_opt(2032, 3, 31));
    assert_eq!(dates[5], NaiveDate::from_ymd_opt(2033, 4, 30));
    assert_eq!(dates[6], NaiveDate::from_ymd_opt(2034, 5, 31));
}

#[test]
fn test_dtype_names_resolve_case_insensitively() {
    let dir = TempDir::new().unwrap();
    let path = write_mapping(&dir);

    let upper = TypeCorrectingReader::new()
        .dtype("Price", DType::Float)
        .use_columns(["Price"])
        .read(&path)
        .unwrap();
    let lower = TypeCorrectingReader::new()
        .dtype("price", DType::Float)
        .use_columns(["price"])
        .read(&path)
        .unwrap();

    assert_eq!(upper, lower);
    assert_eq!(upper.column_names(), vec!["Price"]);
    let price = &upper.column("Price").unwrap().values;
    assert_eq!(price[1], Value::Null);
    assert_eq!(price[5], Value::Null);
    assert_eq!(price[6], Value::Float(14.0));
}

#[test]
fn test_pandas_dtype_spellings() {
    let dir = TempDir::new().unwrap();
    let path = write_mapping(&dir);

    let dtypes = [("quantity", "Int64"), ("isactive", "bool"), ("maturitydate", "datetime64[ns]")]
        .map(|(name, dtype)| (name, dtype.parse::<DType>().unwrap()));
    let table = TypeCorrectingReader::new().dtypes(dtypes).read(&path).unwrap();

    assert_eq!(table.column("Quantity").unwrap().dtype, DType::Integer);
    assert_eq!(table.column("IsActive").unwrap().dtype, DType::Boolean);
    assert_eq!(table.column("MaturityDate").unwrap().dtype, DType::Date);
}

#[test]
fn test_unknown_names_are_dropped() {
    let dir = TempDir::new().unwrap();
    let path = write_mapping(&dir);

    let table = TypeCorrectingReader::new()
        .dtype("doesNotExist", DType::Integer)
        .use_columns(["nope", "instrumentid"])
        .read(&path)
        .unwrap();

    assert_eq!(table.column_names(), vec!["InstrumentId"]);
    assert_eq!(table.len(), 9);
}

#[test]
fn test_unresolved_column_subset_means_all_columns() {
    let dir = TempDir::new().unwrap();
    let path = write_mapping(&dir);

    let table = TypeCorrectingReader::new()
        .use_columns(["nope"])
        .read(&path)
        .unwrap();

    assert_eq!(table.columns().len(), 6);
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = TempDir::new().unwrap();
    let result = TypeCorrectingReader::new().read(&dir.path().join("absent.csv"));
    assert!(matches!(result, Err(CapError::Read { .. })));
}
