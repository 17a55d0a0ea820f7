//! Error ledger
//!
//! An [`ErrorLedger`] collects one row per error raised while a model runs
//! (usually one per failed instrument) and writes them out as
//! `instrumentError.csv`. Rows take their unset fields from the ledger's
//! defaults, which callers can reconfigure at any point of the run.
//!
//! Ledgers are normally shared by name through a [`LedgerRegistry`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use cap_common::{CapError, Result};
use cap_table::{write_csv, DType, Table, Value};
use tracing::{error, warn};

mod registry;

pub use registry::{LedgerHandle, LedgerRegistry};

/// Export columns, in the order they are written by default.
pub const DEFAULT_COLUMNS: [&str; 7] = [
    "errorMessage",
    "errorCode",
    "moduleCode",
    "analysisIdentifier",
    "scenarioIdentifier",
    "portfolioIdentifier",
    "instrumentIdentifier",
];

/// Name of the ledger a model run uses unless it asks for another one.
pub const DEFAULT_LEDGER: &str = "model_root";

pub const DEFAULT_ERROR_CODE: i64 = 100;

pub const DEFAULT_ERROR_MESSAGE: &str = "An unknown exception has occurred";

/// Logical name and file stem of a flushed ledger.
pub const EXPORT_NAME: &str = "instrumentError";

/// Environment variable holding the default module code.
pub const MODEL_NAME_VAR: &str = "MODEL_NAME";

/// One field of an error row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerField {
    Message,
    Code,
    ModuleCode,
    AnalysisId,
    ScenarioId,
    PortfolioId,
    InstrumentId,
}

impl LedgerField {
    pub const ALL: [LedgerField; 7] = [
        Self::Message,
        Self::Code,
        Self::ModuleCode,
        Self::AnalysisId,
        Self::ScenarioId,
        Self::PortfolioId,
        Self::InstrumentId,
    ];

    /// Column name in the export file.
    pub fn column(self) -> &'static str {
        match self {
            Self::Message => "errorMessage",
            Self::Code => "errorCode",
            Self::ModuleCode => "moduleCode",
            Self::AnalysisId => "analysisIdentifier",
            Self::ScenarioId => "scenarioIdentifier",
            Self::PortfolioId => "portfolioIdentifier",
            Self::InstrumentId => "instrumentIdentifier",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Short keyword form, as used in `configure_defaults_named`.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Message => "err_msg",
            Self::Code => "err_code",
            Self::ModuleCode => "module_code",
            Self::AnalysisId => "analysis_id",
            Self::ScenarioId => "scenario_id",
            Self::PortfolioId => "portfolio_id",
            Self::InstrumentId => "instrument_id",
        }
    }
}

impl FromStr for LedgerField {
    type Err = CapError;

    /// Accepts the keyword or the column name, ignoring case.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.keyword() == lower || f.column().to_lowercase() == lower)
            .ok_or_else(|| CapError::config(format!("Unknown error ledger field: {s}")))
    }
}

impl fmt::Display for LedgerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Field values for one `append` or `configure_defaults` call. Unset fields
/// fall back to the ledger defaults (or keep them, respectively).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFields {
    values: [Option<Value>; 7],
}

impl EntryFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: LedgerField, value: impl Into<Value>) -> Self {
        self.values[field.index()] = Some(value.into());
        self
    }

    pub fn get(&self, field: LedgerField) -> Option<&Value> {
        self.values[field.index()].as_ref()
    }

    pub fn message(self, message: impl Into<String>) -> Self {
        self.set(LedgerField::Message, message.into())
    }

    pub fn code(self, code: impl Into<Value>) -> Self {
        self.set(LedgerField::Code, code)
    }

    pub fn module_code(self, module: impl Into<Value>) -> Self {
        self.set(LedgerField::ModuleCode, module)
    }

    pub fn analysis_id(self, id: impl Into<Value>) -> Self {
        self.set(LedgerField::AnalysisId, id)
    }

    pub fn scenario_id(self, id: impl Into<Value>) -> Self {
        self.set(LedgerField::ScenarioId, id)
    }

    pub fn portfolio_id(self, id: impl Into<Value>) -> Self {
        self.set(LedgerField::PortfolioId, id)
    }

    pub fn instrument_id(self, id: impl Into<Value>) -> Self {
        self.set(LedgerField::InstrumentId, id)
    }
}

/// Values used for fields an `append` call leaves unset.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerDefaults {
    values: [Value; 7],
}

impl LedgerDefaults {
    /// Built-in defaults: code 100, module code from `MODEL_NAME`, no ids.
    pub fn from_env() -> Self {
        let module = std::env::var(MODEL_NAME_VAR).ok().map(Value::Text);
        Self {
            values: [
                Value::from(DEFAULT_ERROR_MESSAGE),
                Value::Int(DEFAULT_ERROR_CODE),
                Value::from(module),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
            ],
        }
    }

    pub fn get(&self, field: LedgerField) -> &Value {
        &self.values[field.index()]
    }

    /// Replace every field present in `fields`.
    pub fn apply(&mut self, fields: &EntryFields) {
        for (slot, value) in self.values.iter_mut().zip(&fields.values) {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
    }

    pub fn with(mut self, fields: &EntryFields) -> Self {
        self.apply(fields);
        self
    }

    fn message(&self) -> String {
        match self.get(LedgerField::Message) {
            Value::Null => DEFAULT_ERROR_MESSAGE.to_string(),
            v => v.to_string(),
        }
    }
}

impl Default for LedgerDefaults {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Ordered error rows plus the defaults used to fill them in.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorLedger {
    table: Table,
    defaults: LedgerDefaults,
}

impl Default for ErrorLedger {
    fn default() -> Self {
        Self::new(&DEFAULT_COLUMNS, LedgerDefaults::default())
    }
}

impl ErrorLedger {
    /// An empty ledger with a fixed column set.
    pub fn new<S: AsRef<str>>(columns: &[S], defaults: LedgerDefaults) -> Self {
        Self {
            table: Table::with_columns(columns, DType::Object),
            defaults,
        }
    }

    pub fn row_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn defaults(&self) -> &LedgerDefaults {
        &self.defaults
    }

    /// Append one row. An empty `message` is replaced by the default message.
    /// With `log` set, the message is also emitted at error level.
    pub fn append(&mut self, message: &str, fields: EntryFields, log: bool) -> Result<()> {
        let message = if message.is_empty() {
            self.defaults.message()
        } else {
            message.to_string()
        };

        let row: Vec<Value> = self
            .table
            .columns()
            .iter()
            .map(|column| {
                let field = LedgerField::ALL
                    .into_iter()
                    .find(|f| f.column().eq_ignore_ascii_case(&column.name));
                match field {
                    Some(LedgerField::Message) => Value::Text(message.clone()),
                    Some(field) => fields
                        .get(field)
                        .cloned()
                        .unwrap_or_else(|| self.defaults.get(field).clone()),
                    None => Value::Null,
                }
            })
            .collect();
        self.table.push_row(row)?;

        if log {
            error!("{message}");
        }
        Ok(())
    }

    /// Replace the defaults for every field present in `fields`.
    pub fn configure_defaults(&mut self, fields: &EntryFields) {
        self.defaults.apply(fields);
    }

    /// Replace defaults by field name (keyword or column form, any case).
    ///
    /// Unknown names are logged as warnings and returned; the remaining names
    /// are still applied.
    pub fn configure_defaults_named<I, K, V>(&mut self, fields: I) -> Vec<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut accepted = EntryFields::new();
        let mut rejected = Vec::new();
        for (name, value) in fields {
            match name.as_ref().parse::<LedgerField>() {
                Ok(field) => accepted = accepted.set(field, value),
                Err(_) => {
                    warn!(
                        "Invalid keyword argument provided to configure_defaults: {}",
                        name.as_ref()
                    );
                    rejected.push(name.as_ref().to_string());
                }
            }
        }
        self.configure_defaults(&accepted);
        rejected
    }

    /// Merge rows from another table.
    ///
    /// Foreign columns are renamed onto this ledger's columns ignoring case.
    /// Columns with no match are dropped, or appended as new ledger columns
    /// when `keep_foreign_columns` is set. Foreign rows go after the existing
    /// rows, or before them with `prepend`. `other` is left untouched.
    pub fn merge(&mut self, other: &Table, keep_foreign_columns: bool, prepend: bool) -> &mut Self {
        let own = self.table.header_map();
        let mut foreign = other.clone();
        let mut extra = Vec::new();
        let renames = other
            .column_names()
            .into_iter()
            .filter_map(|name| match own.get(&name.to_lowercase()) {
                Some(to) => Some((name.to_string(), to.clone())),
                None => {
                    extra.push(name.to_string());
                    None
                }
            })
            .collect();
        foreign.rename_columns(&renames);

        let mut keep: Vec<String> = self
            .table
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        if keep_foreign_columns {
            keep.extend(extra);
        }

        let foreign = foreign.reindex(&keep, &Value::Null);
        let existing = self.table.reindex(&keep, &Value::Null);
        self.table = if prepend {
            foreign.concat(&existing)
        } else {
            existing.concat(&foreign)
        };
        self
    }

    /// Write the rows to `<directory>/instrumentError.csv` with the given
    /// column order.
    ///
    /// Requested columns are matched to the ledger's columns ignoring case;
    /// columns the ledger lacks are written empty. An empty ledger writes
    /// nothing and returns an empty map.
    pub fn flush<S: AsRef<str>>(
        &self,
        directory: &Path,
        columns: &[S],
    ) -> Result<BTreeMap<String, PathBuf>> {
        let mut written = BTreeMap::new();
        if self.table.is_empty() {
            return Ok(written);
        }

        let own = self.table.header_map();
        let mapped: Vec<String> = columns
            .iter()
            .map(|c| {
                let c = c.as_ref();
                own.get(&c.to_lowercase()).cloned().unwrap_or_else(|| c.to_string())
            })
            .collect();

        let path = directory.join(format!("{EXPORT_NAME}.csv"));
        write_csv(&self.table.reindex(&mapped, &Value::Null), &path)?;
        error!("One or more error files have been generated");

        written.insert(EXPORT_NAME.to_string(), path);
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cap_table::Column;
    use tempfile::TempDir;

    fn defaults() -> LedgerDefaults {
        LedgerDefaults::from_env().with(&EntryFields::new().module_code("pit"))
    }

    fn codes(ledger: &ErrorLedger) -> Vec<Value> {
        ledger.table().column("errorCode").unwrap().values.clone()
    }

    fn foreign(code: i64) -> Table {
        Table::from_columns(vec![
            Column::new("ERRORMESSAGE", DType::Object, vec!["from model".into()]),
            Column::new("errorcode", DType::Integer, vec![Value::Int(code)]),
            Column::new("stage", DType::Object, vec!["pd".into()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_field_names() {
        assert_eq!("err_code".parse::<LedgerField>().unwrap(), LedgerField::Code);
        assert_eq!("INSTRUMENTIDENTIFIER".parse::<LedgerField>().unwrap(), LedgerField::InstrumentId);
        assert!("severity".parse::<LedgerField>().is_err());
    }

    #[test]
    fn test_append_uses_defaults() {
        let mut ledger = ErrorLedger::new(&DEFAULT_COLUMNS, defaults());
        ledger
            .append("bad rating", EntryFields::new().instrument_id("A1"), false)
            .unwrap();

        let row = ledger.table().row(0).unwrap();
        assert_eq!(row[0], &Value::from("bad rating"));
        assert_eq!(row[1], &Value::Int(100));
        assert_eq!(row[2], &Value::from("pit"));
        assert_eq!(row[3], &Value::Null);
        assert_eq!(row[6], &Value::from("A1"));
    }

    #[test]
    fn test_empty_message_uses_default_message() {
        let mut ledger = ErrorLedger::new(&DEFAULT_COLUMNS, defaults());
        ledger.append("", EntryFields::new(), false).unwrap();
        assert_eq!(
            ledger.table().column("errorMessage").unwrap().values[0],
            Value::from(DEFAULT_ERROR_MESSAGE)
        );
    }

    #[test]
    fn test_configure_defaults_named_rejects_unknown() {
        let mut ledger = ErrorLedger::new(&DEFAULT_COLUMNS, defaults());
        let rejected = ledger.configure_defaults_named([
            ("err_code", Value::Int(7)),
            ("scenarioIdentifier", Value::from("base")),
            ("severity", Value::from("high")),
        ]);
        assert_eq!(rejected, vec!["severity"]);

        ledger.append("x", EntryFields::new(), false).unwrap();
        let row = ledger.table().row(0).unwrap();
        assert_eq!(row[1], &Value::Int(7));
        assert_eq!(row[4], &Value::from("base"));
    }

    #[test]
    fn test_merge_order_follows_prepend() {
        let mut appended = ErrorLedger::new(&DEFAULT_COLUMNS, defaults());
        appended.append("mine", EntryFields::new().code(42), false).unwrap();
        let mut prepended = appended.clone();

        appended.merge(&foreign(24), false, false);
        prepended.merge(&foreign(24), false, true);

        assert_eq!(codes(&appended), vec![Value::Int(42), Value::Int(24)]);
        assert_eq!(codes(&prepended), vec![Value::Int(24), Value::Int(42)]);
    }

    #[test]
    fn test_merge_keep_or_drop_foreign_columns() {
        let mut dropped = ErrorLedger::new(&DEFAULT_COLUMNS, defaults());
        let mut kept = dropped.clone();

        dropped.merge(&foreign(1), false, false);
        kept.merge(&foreign(1), true, false);

        assert!(dropped.table().column("stage").is_none());
        assert_eq!(dropped.table().columns().len(), 7);
        assert_eq!(kept.table().column("stage").unwrap().values, vec![Value::from("pd")]);
        assert_eq!(kept.table().columns().len(), 8);
        assert_eq!(
            kept.table().column("errorMessage").unwrap().values,
            vec![Value::from("from model")]
        );
    }

    #[test]
    fn test_merge_leaves_input_untouched() {
        let table = foreign(3);
        let before = table.clone();

        let mut ledger = ErrorLedger::new(&DEFAULT_COLUMNS, defaults());
        ledger.merge(&table, true, true).merge(&table, false, false);

        assert_eq!(table, before);
        assert_eq!(ledger.row_count(), 2);
    }

    #[test]
    fn test_flush_empty_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let ledger = ErrorLedger::new(&DEFAULT_COLUMNS, defaults());

        let written = ledger.flush(&dir.path().join("out"), &DEFAULT_COLUMNS).unwrap();

        assert!(written.is_empty());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_flush_one_row_in_requested_order() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ErrorLedger::new(&DEFAULT_COLUMNS, defaults());
        ledger
            .append("boom", EntryFields::new().instrument_id("A1").code(5), false)
            .unwrap();

        let written = ledger
            .flush(dir.path(), &["INSTRUMENTIDENTIFIER", "errorMessage", "errorcode", "extra"])
            .unwrap();

        let path = &written[EXPORT_NAME];
        assert_eq!(path, &dir.path().join("instrumentError.csv"));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            content,
            "instrumentIdentifier,errorMessage,errorCode,extra\nA1,boom,5,\n"
        );
    }
}
