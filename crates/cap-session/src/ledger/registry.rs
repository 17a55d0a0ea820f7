//! Named ledger registry
//!
//! Every part of a run that records errors under the same name must write to
//! the same ledger, otherwise the exported file would miss rows. The registry
//! hands out one shared [`LedgerHandle`] per name for as long as the registry
//! lives. [`LedgerRegistry::global`] is the process-wide instance used by
//! model code; tests and embedders can create their own and pass it around.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use cap_common::Result;
use cap_table::{Table, Value};
use tracing::debug;

use super::{EntryFields, ErrorLedger, LedgerDefaults, DEFAULT_COLUMNS, DEFAULT_LEDGER};

/// Shared reference to a registered ledger. Clones point at the same ledger.
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    name: Arc<str>,
    inner: Arc<Mutex<ErrorLedger>>,
}

impl LedgerHandle {
    fn lock(&self) -> MutexGuard<'_, ErrorLedger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when both handles refer to the same ledger instance.
    pub fn ptr_eq(&self, other: &LedgerHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` with exclusive access to the ledger.
    pub fn with<R>(&self, f: impl FnOnce(&mut ErrorLedger) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn append(&self, message: &str, fields: EntryFields, log: bool) -> Result<()> {
        self.lock().append(message, fields, log)
    }

    pub fn configure_defaults(&self, fields: &EntryFields) {
        self.lock().configure_defaults(fields);
    }

    pub fn configure_defaults_named<I, K, V>(&self, fields: I) -> Vec<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.lock().configure_defaults_named(fields)
    }

    /// See [`ErrorLedger::merge`]. Returns this handle for chaining.
    pub fn merge(&self, other: &Table, keep_foreign_columns: bool, prepend: bool) -> &Self {
        self.lock().merge(other, keep_foreign_columns, prepend);
        self
    }

    pub fn flush<S: AsRef<str>>(
        &self,
        directory: &Path,
        columns: &[S],
    ) -> Result<BTreeMap<String, PathBuf>> {
        self.lock().flush(directory, columns)
    }

    pub fn row_count(&self) -> usize {
        self.lock().row_count()
    }

    /// Copy of the current rows.
    pub fn snapshot(&self) -> Table {
        self.lock().table().clone()
    }
}

/// Name to ledger map. The first `get` for a name decides its columns and
/// defaults; later calls return the same ledger and ignore theirs. Ledgers are
/// never removed.
#[derive(Debug, Default)]
pub struct LedgerRegistry {
    ledgers: Mutex<HashMap<String, LedgerHandle>>,
}

static GLOBAL: OnceLock<LedgerRegistry> = OnceLock::new();

impl LedgerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static LedgerRegistry {
        GLOBAL.get_or_init(LedgerRegistry::new)
    }

    pub fn get<S: AsRef<str>>(
        &self,
        name: &str,
        columns: &[S],
        defaults: LedgerDefaults,
    ) -> LedgerHandle {
        let mut ledgers = self.ledgers.lock().unwrap_or_else(PoisonError::into_inner);
        ledgers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(ledger = name, "Creating error ledger");
                LedgerHandle {
                    name: Arc::from(name),
                    inner: Arc::new(Mutex::new(ErrorLedger::new(columns, defaults))),
                }
            })
            .clone()
    }

    /// `get` with the export columns and built-in defaults.
    pub fn get_or_default(&self, name: &str) -> LedgerHandle {
        self.get(name, &DEFAULT_COLUMNS, LedgerDefaults::default())
    }

    /// The `model_root` ledger.
    pub fn root(&self) -> LedgerHandle {
        self.get_or_default(DEFAULT_LEDGER)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ledgers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_get_is_idempotent() {
        let registry = LedgerRegistry::new();
        registry.get_or_default("x").append("boom", EntryFields::new(), false).unwrap();

        assert_eq!(registry.get_or_default("x").row_count(), 1);
        assert!(registry.get_or_default("x").ptr_eq(&registry.get_or_default("x")));
        assert!(!registry.get_or_default("x").ptr_eq(&registry.get_or_default("y")));
    }

    #[test]
    fn test_first_caller_wins_columns() {
        let registry = LedgerRegistry::new();
        let first = registry.get("custom", &["errorMessage", "stage"], LedgerDefaults::default());
        let second = registry.get_or_default("custom");

        assert!(first.ptr_eq(&second));
        assert_eq!(second.snapshot().column_names(), vec!["errorMessage", "stage"]);
    }

    #[test]
    fn test_handles_share_across_threads() {
        let registry = Arc::new(LedgerRegistry::new());
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry
                        .root()
                        .append(&format!("worker {i}"), EntryFields::new(), false)
                        .unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(registry.root().row_count(), 4);
    }

    #[test]
    fn test_global_registry_shared_across_callers() {
        const NAME: &str = "global_registry_shared";
        assert!(!LedgerRegistry::global().contains(NAME));

        fn record_failure() {
            LedgerRegistry::global()
                .get_or_default(NAME)
                .append("boom", EntryFields::new(), false)
                .unwrap();
        }
        thread::spawn(record_failure).join().unwrap();

        assert!(LedgerRegistry::global().contains(NAME));
        assert_eq!(LedgerRegistry::global().get_or_default(NAME).row_count(), 1);
        assert!(!LedgerRegistry::new().contains(NAME));
    }

    #[test]
    fn test_merge_chains_on_same_ledger() {
        let registry = LedgerRegistry::new();
        let handle = registry.root();
        let table = handle.snapshot();

        let chained = handle.merge(&table, false, false);
        assert!(chained.ptr_eq(&registry.root()));
    }
}
