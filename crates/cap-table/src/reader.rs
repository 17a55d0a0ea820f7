//! Delimited-file reader with dtype repair
//!
//! [`TypeCorrectingReader`] reads every cell as text first and then converts
//! column by column. Columns with a requested dtype go through
//! [`repair::coerce`]; the rest get the inferred type from [`repair::infer`].
//! Requested names (dtypes and the column subset) are matched against the
//! header without regard to case, and names that match nothing are dropped.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use cap_common::{CapError, Result};
use tracing::{debug, instrument};

use crate::repair;
use crate::table::{case_insensitive_map, Column, Table};
use crate::value::DType;

/// Options that shape how the file is parsed, independent of dtypes.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Columns to keep. Empty means every column.
    pub use_columns: Vec<String>,
    pub delimiter: u8,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            use_columns: Vec::new(),
            delimiter: b',',
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeCorrectingReader {
    dtypes: Vec<(String, DType)>,
    options: ReadOptions,
}

impl TypeCorrectingReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ReadOptions) -> Self {
        Self {
            dtypes: Vec::new(),
            options,
        }
    }

    /// Request a dtype for one column.
    pub fn dtype(mut self, column: impl Into<String>, dtype: DType) -> Self {
        self.dtypes.push((column.into(), dtype));
        self
    }

    pub fn dtypes<I, S>(mut self, dtypes: I) -> Self
    where
        I: IntoIterator<Item = (S, DType)>,
        S: Into<String>,
    {
        self.dtypes
            .extend(dtypes.into_iter().map(|(name, dtype)| (name.into(), dtype)));
        self
    }

    pub fn use_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.use_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.options.delimiter = delimiter;
        self
    }

    /// Read a file from disk.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn read(&self, path: &Path) -> Result<Table> {
        let file = File::open(path).map_err(|e| CapError::read(path.display().to_string(), e.to_string()))?;
        self.read_from(file, &path.display().to_string())
    }

    /// Read from any byte source. `source` only names the input in errors.
    pub fn read_from<R: Read>(&self, input: R, source: &str) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| CapError::read(source, e.to_string()))?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();

        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(CapError::read(source, "missing header row"));
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record.map_err(|e| CapError::read(source, e.to_string()))?;
            // Short rows are padded; long rows mean the file is malformed
            if record.len() > headers.len() {
                let line = record.position().map_or(0, |p| p.line());
                return Err(CapError::read(
                    source,
                    format!(
                        "expected {} fields, saw {} on line {line}",
                        headers.len(),
                        record.len()
                    ),
                ));
            }
            for (i, column) in cells.iter_mut().enumerate() {
                column.push(record.get(i).unwrap_or("").to_string());
            }
        }

        let header_map = case_insensitive_map(headers.iter().map(String::as_str));
        let requested = self.resolve_dtypes(&header_map);
        let keep = self.resolve_columns(&header_map);

        let mut columns = Vec::new();
        for (name, raw) in headers.iter().zip(cells) {
            if !keep.is_empty() && !keep.contains(name) {
                continue;
            }
            let column = match requested.get(name) {
                Some(&dtype) => Column::new(name.clone(), dtype, repair::coerce(dtype, &raw)),
                None => {
                    let (dtype, values) = repair::infer(&raw);
                    Column::new(name.clone(), dtype, values)
                }
            };
            columns.push(column);
        }

        let table = Table::from_columns(columns)?;
        debug!(
            source,
            rows = table.len(),
            columns = table.columns().len(),
            "Read table"
        );
        Ok(table)
    }

    fn resolve_dtypes(&self, header_map: &HashMap<String, String>) -> HashMap<String, DType> {
        let mut resolved = HashMap::new();
        for (name, dtype) in &self.dtypes {
            match header_map.get(&name.to_lowercase()) {
                Some(original) => {
                    resolved.insert(original.clone(), *dtype);
                }
                None => debug!(column = %name, "Requested dtype for unknown column, ignoring"),
            }
        }
        resolved
    }

    fn resolve_columns(&self, header_map: &HashMap<String, String>) -> HashSet<String> {
        self.options
            .use_columns
            .iter()
            .filter_map(|name| {
                let found = header_map.get(&name.to_lowercase()).cloned();
                if found.is_none() {
                    debug!(column = %name, "Requested column not in header, ignoring");
                }
                found
            })
            .collect()
    }
}
