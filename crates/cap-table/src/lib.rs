//! CAP tabular data
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! In-memory tables and the CSV plumbing used by model runs:
//!
//! - [`TypeCorrectingReader`]: reads a delimited file and repairs the columns
//!   a naive parse would corrupt (nullable integers, nullable booleans, dates)
//! - [`repair`]: the per-cell repair functions, usable without a reader
//! - [`write_csv`] / [`write_tables`]: export
//! - [`compare::differences`]: benchmark checks for regression runs
//!
//! # Example
//!
//! ```no_run
//! use cap_table::{DType, TypeCorrectingReader};
//! use std::path::Path;
//!
//! # fn main() -> cap_common::Result<()> {
//! let table = TypeCorrectingReader::new()
//!     .dtype("quantity", DType::Integer)
//!     .dtype("isActive", DType::Boolean)
//!     .read(Path::new("positions.csv"))?;
//! println!("{} rows", table.len());
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod reader;
pub mod repair;
pub mod table;
pub mod value;
pub mod writer;

pub use reader::{ReadOptions, TypeCorrectingReader};
pub use table::{Column, Table};
pub use value::{DType, Value};
pub use writer::{clean_output_headers, write_csv, write_tables};
