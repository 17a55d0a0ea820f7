//! CAP model runner
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! The `cap-model` binary wraps a model step in a staging session:
//!
//! - stage inputs from a local test directory (`--local`) or S3 (`--s3`)
//! - optionally run an external model command against the scratch tree
//! - publish everything produced, plus the `instrumentError` ledger and the log
//!
//! Env files are applied before logging starts, see [`config::apply_env_files`].

pub mod config;
pub mod error;
pub mod model;

pub use error::{CliError, Result};

use cap_common::logging::LogLevel;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Run a CAP model against staged inputs
#[derive(Parser, Debug)]
#[command(name = "cap-model")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["local", "s3"])))]
pub struct Cli {
    /// Run against a local test directory, given the path of its descriptor
    #[arg(short = 'L', long, value_name = "DESCRIPTOR_PATH")]
    pub local: Option<PathBuf>,

    /// Run against S3, given the object key of the run descriptor
    #[arg(short, long, value_name = "DESCRIPTOR_KEY")]
    pub s3: Option<String>,

    /// Keep the scratch directory after the run
    #[arg(short, long)]
    pub keep_temp: bool,

    /// Console and log file level (trace, debug, info, warn, error, disabled)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Do not let the bundled `.env` override variables already set
    #[arg(short = 'd', long)]
    pub use_defaults: bool,

    /// Env file whose values override the environment
    #[arg(short, long, value_name = "ENV_FILE", conflicts_with = "config")]
    pub overwrite: Option<PathBuf>,

    /// Env file whose values only fill variables not yet set
    #[arg(short, long, value_name = "ENV_FILE")]
    pub config: Option<PathBuf>,

    /// Input files that must be present (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "FILE")]
    pub require: Vec<String>,

    /// Input files that may be absent without a warning (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "FILE")]
    pub optional: Vec<String>,

    /// External model command, run with `-p <local descriptor>` appended.
    /// Split on whitespace, no shell quoting.
    #[arg(long, value_name = "COMMAND")]
    pub command: Option<String>,
}

impl Cli {
    /// Descriptor location as passed to the session, whichever mode was chosen.
    pub fn descriptor_location(&self) -> String {
        match (&self.local, &self.s3) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(key)) => key.clone(),
            (None, None) => String::new(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }
}
