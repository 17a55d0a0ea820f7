//! Error types for the CAP model runner
//!
//! Messages are shown to whoever launched the run, so they say what to check.

use cap_common::CapError;
use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Staging, descriptor or table failure from the session
    #[error(transparent)]
    Cap(#[from] CapError),

    /// An env file given on the command line could not be loaded
    #[error("Failed to load env file '{path}': {message}. Check that the file exists and uses KEY=value lines.")]
    EnvFile { path: String, message: String },

    /// The external model command could not be started or exited non-zero
    #[error("Model command '{command}' failed: {message}")]
    Command { command: String, message: String },

    /// A fetched input could not be parsed as a table
    #[error("Input '{name}' is not readable: {source}")]
    Input {
        name: String,
        #[source]
        source: CapError,
    },

    #[error("Configuration error: {0}. Check your environment variables or env files.")]
    Config(String),

    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn env_file(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::EnvFile {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn command(command: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when the run stopped before anything was staged.
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, Self::Cap(e) if e.is_fatal_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_only_for_descriptor() {
        assert!(CliError::from(CapError::descriptor("missing settings")).is_fatal_config());
        assert!(!CliError::from(CapError::config("x")).is_fatal_config());
        assert!(!CliError::command("model", "exit status: 2").is_fatal_config());
    }

    #[test]
    fn test_command_message() {
        let err = CliError::command("python run.py", "exit status: 3");
        assert_eq!(err.to_string(), "Model command 'python run.py' failed: exit status: 3");
    }
}
