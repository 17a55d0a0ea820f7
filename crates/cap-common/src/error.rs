//! Error types for CAP model runs
//!
//! The variants follow the run's failure taxonomy: a broken run descriptor is
//! always fatal, transfer and teardown failures only surface when the caller
//! asked for them to be raised, and cell-level repair failures never become
//! errors at all (they are nulls in the resulting table).

use thiserror::Error;

/// Result type alias for CAP operations
pub type Result<T> = std::result::Result<T, CapError>;

/// Main error type for CAP
#[derive(Error, Debug)]
pub enum CapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Missing or malformed run descriptor. A run cannot proceed without one.
    #[error("Invalid run descriptor: {0}")]
    Descriptor(String),

    /// A fetch, push or copy that was attempted under the `raise` policy.
    #[error("Failed to {action} {from} to {to}: {message}")]
    Transfer {
        action: String,
        from: String,
        to: String,
        message: String,
    },

    /// Scratch directory cleanup attempted under the `raise` policy.
    #[error("Failed to delete temporary directory {path}: {message}")]
    Teardown { path: String, message: String },

    /// A delimited file could not be read as a table.
    #[error("Failed to read table from {path}: {message}")]
    Read { path: String, message: String },

    /// Column/row shape mismatch while building or combining tables.
    #[error("Table error: {0}")]
    Table(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CapError {
    /// Create a run descriptor error
    pub fn descriptor(msg: impl Into<String>) -> Self {
        Self::Descriptor(msg.into())
    }

    /// Create a table read error
    pub fn read(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a table shape error
    pub fn table(msg: impl Into<String>) -> Self {
        Self::Table(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors that must stop a run before any output is staged.
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, Self::Descriptor(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_message() {
        let err = CapError::Transfer {
            action: "download".to_string(),
            from: "inputs/a.csv".to_string(),
            to: "/tmp/a.csv".to_string(),
            message: "NoSuchKey".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to download inputs/a.csv to /tmp/a.csv: NoSuchKey"
        );
        assert!(!err.is_fatal_config());
    }

    #[test]
    fn test_descriptor_is_fatal() {
        assert!(CapError::descriptor("missing settings").is_fatal_config());
    }
}
