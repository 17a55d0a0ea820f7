//! Column-oriented in-memory table

use std::collections::HashMap;

use cap_common::{CapError, Result};

use crate::value::{DType, Value};

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: DType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: DType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    /// A column of `len` nulls
    pub fn nulls(name: impl Into<String>, dtype: DType, len: usize) -> Self {
        Self::new(name, dtype, vec![Value::Null; len])
    }
}

/// Ordered columns of equal length. Row positions are always a dense
/// `0..len()` sequence; there is no separate index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    len: usize,
}

/// Lower-cased name to original name. Later duplicates win, so files with
/// case-insensitively duplicated headers resolve to the last one.
pub fn case_insensitive_map<'a, I>(names: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .map(|name| (name.to_lowercase(), name.to_string()))
        .collect()
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table with the given column names.
    pub fn with_columns<S: AsRef<str>>(names: &[S], dtype: DType) -> Self {
        Self {
            columns: names
                .iter()
                .map(|n| Column::nulls(n.as_ref(), dtype, 0))
                .collect(),
            len: 0,
        }
    }

    /// Build a table from columns, which must all have the same length.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let len = columns.first().map(|c| c.values.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.values.len() != len) {
            return Err(CapError::table(format!(
                "column '{}' has {} values, expected {}",
                bad.name,
                bad.values.len(),
                len
            )));
        }
        Ok(Self { columns, len })
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column lookup ignoring case
    pub fn column_ci(&self, name: &str) -> Option<&Column> {
        let lower = name.to_lowercase();
        self.columns.iter().find(|c| c.name.to_lowercase() == lower)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Lower-cased to original column names
    pub fn header_map(&self) -> HashMap<String, String> {
        case_insensitive_map(self.columns.iter().map(|c| c.name.as_str()))
    }

    /// Values of one row, in column order
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        (index < self.len).then(|| self.columns.iter().map(|c| &c.values[index]).collect())
    }

    /// Append a column of nulls unless a column with that exact name exists.
    pub fn add_column(&mut self, name: impl Into<String>, dtype: DType) {
        let name = name.into();
        if !self.has_column(&name) {
            self.columns.push(Column::nulls(name, dtype, self.len));
        }
    }

    /// Append one row; `values` are in column order.
    pub fn push_row(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(CapError::table(format!(
                "row has {} values, table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.values.push(value);
        }
        self.len += 1;
        Ok(())
    }

    /// Rename columns by exact name. Names not in `renames` are kept.
    pub fn rename_columns(&mut self, renames: &HashMap<String, String>) {
        for column in &mut self.columns {
            if let Some(to) = renames.get(&column.name) {
                column.name = to.clone();
            }
        }
    }

    /// A new table with exactly `names`, in that order. Columns missing from
    /// this table are filled with `fill` (object dtype).
    pub fn reindex<S: AsRef<str>>(&self, names: &[S], fill: &Value) -> Table {
        let columns = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                match self.column(name) {
                    Some(column) => column.clone(),
                    None => Column::new(name, DType::Object, vec![fill.clone(); self.len]),
                }
            })
            .collect();
        Table {
            columns,
            len: self.len,
        }
    }

    /// Rename columns to the casing given in `names`, then reindex to `names`.
    ///
    /// `reindex_case_insensitive(&["InstrumentId"], ..)` picks up a column
    /// called `instrumentid` and emits it as `InstrumentId`.
    pub fn reindex_case_insensitive<S: AsRef<str>>(&self, names: &[S], fill: &Value) -> Table {
        let wanted = case_insensitive_map(names.iter().map(|n| n.as_ref()));
        let mut renamed = self.clone();
        for column in &mut renamed.columns {
            if let Some(to) = wanted.get(&column.name.to_lowercase()) {
                column.name = to.clone();
            }
        }
        renamed.reindex(names, fill)
    }

    /// Stack `other` below this table. Columns are matched by exact name;
    /// columns missing on either side are filled with nulls, and columns that
    /// only `other` has are appended at the end.
    pub fn concat(&self, other: &Table) -> Table {
        let mut out = self.clone();
        for column in &other.columns {
            out.add_column(column.name.clone(), column.dtype);
        }
        for column in &mut out.columns {
            match other.column(&column.name) {
                Some(theirs) => column.values.extend(theirs.values.iter().cloned()),
                None => column
                    .values
                    .extend(std::iter::repeat_n(Value::Null, other.len)),
            }
        }
        out.len = self.len + other.len;
        out
    }

    /// Remap values per column, matching column names and text values
    /// case-insensitively.
    ///
    /// Text values without an entry in the column's mapping become null; nulls
    /// stay null. Columns not named in `mapping` are untouched.
    pub fn map_enums(&self, mapping: &HashMap<String, HashMap<String, Value>>) -> Table {
        let mut out = self.clone();
        for (column_name, enums) in mapping {
            let enums: HashMap<String, &Value> =
                enums.iter().map(|(k, v)| (k.to_lowercase(), v)).collect();
            let lower = column_name.to_lowercase();
            let Some(column) = out
                .columns
                .iter_mut()
                .find(|c| c.name.to_lowercase() == lower)
            else {
                continue;
            };
            for value in &mut column.values {
                if value.is_null() {
                    continue;
                }
                let key = value.to_string().to_lowercase();
                *value = enums.get(&key).map(|v| (*v).clone()).unwrap_or(Value::Null);
            }
            column.dtype = DType::Object;
        }
        out
    }
}
