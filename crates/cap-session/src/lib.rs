//! CAP staging session
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Everything a model run needs around its own computation:
//!
//! - [`StagingSession`]: scratch directory, input fetch and output publish
//!   against a local test tree or a remote [`ObjectStore`]
//! - [`FailurePolicy`]: `raise`, `ignore` or `log` for every transfer
//! - [`ErrorLedger`] and [`LedgerRegistry`]: named, shared error rows that
//!   end up in `instrumentError.csv`
//!
//! # Example
//!
//! ```no_run
//! use cap_session::{FailurePolicy, LedgerRegistry, Mode, StagingSession};
//!
//! # fn main() -> cap_common::Result<()> {
//! let mut session = StagingSession::open("tests/run1/modelRunParameter.json", Mode::Local)?;
//! let inputs = session.fetch_inputs(&["instrumentReference.csv"], &[])?;
//!
//! let errors = LedgerRegistry::global().root();
//! if !inputs.contains_key("portfolioReference") {
//!     errors.append("portfolioReference missing", Default::default(), true)?;
//! }
//!
//! let dir = session.layout().log_dir().to_path_buf();
//! let flushed = errors.flush(&dir, &cap_session::ledger::DEFAULT_COLUMNS)?;
//! session.publish(&flushed, None, FailurePolicy::Log)?;
//! session.close(false)
//! # }
//! ```

pub mod descriptor;
pub mod layout;
pub mod ledger;
pub mod policy;
pub mod session;
pub mod storage;

pub use descriptor::{DatasetGroup, RunDescriptor, Scenario};
pub use layout::StagingLayout;
pub use ledger::{EntryFields, ErrorLedger, LedgerDefaults, LedgerField, LedgerHandle, LedgerRegistry};
pub use policy::{attempt, Action, FailurePolicy};
pub use session::{discover_files, Mode, SessionState, StagingSession};
pub use storage::{ObjectStore, S3Store, StorageConfig};
