//! CAP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging bootstrap for the CAP model-run
//! workspace.
//!
//! - **Error Handling**: [`CapError`] and the [`Result`] alias used by the
//!   table, ledger and staging crates
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use cap_common::{CapError, Result};
//!
//! fn require_setting(value: Option<&str>) -> Result<&str> {
//!     value.ok_or_else(|| CapError::descriptor("settings.logPath is required"))
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CapError, Result};
