//! Model run driver
//!
//! One run: open the session, stage and check the inputs, hand the scratch
//! tree to the model command, publish what it produced. Whatever happens
//! after the session is open, the `model_root` ledger is exported and the
//! log file is staged before teardown.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use cap_session::ledger::{DEFAULT_COLUMNS, EXPORT_NAME};
use cap_session::{
    EntryFields, FailurePolicy, LedgerHandle, LedgerRegistry, Mode, S3Store, StagingSession,
    StorageConfig,
};
use cap_table::TypeCorrectingReader;
use tracing::{error, info, warn};

use crate::error::{CliError, Result};
use crate::Cli;

/// Backend for the chosen mode. Remote runs read S3 settings from the
/// environment.
pub fn mode_for(cli: &Cli) -> Result<Mode> {
    if cli.is_local() {
        return Ok(Mode::Local);
    }
    let store = S3Store::new(StorageConfig::from_env()?)?;
    Ok(Mode::Remote(Arc::new(store)))
}

/// Run the model once.
///
/// A broken descriptor returns before anything is staged. Any later failure
/// is recorded in the `model_root` ledger of `registry`, exported with the
/// other outputs and returned once cleanup has finished.
pub fn run(
    cli: &Cli,
    mode: Mode,
    registry: &LedgerRegistry,
    log_file: Option<&Path>,
    keep_temp: bool,
) -> Result<()> {
    let mut session = StagingSession::open(&cli.descriptor_location(), mode)?;
    let ledger = registry.root();

    let outcome = execute(&mut session, cli);
    if let Err(e) = &outcome {
        error!(error = %e, "Model failed");
        if let Err(append_err) = ledger.append(&e.to_string(), EntryFields::new(), false) {
            warn!(error = %append_err, "Could not record failure in error ledger");
        }
    }

    let exported = export_errors(&mut session, &ledger);
    let cleaned = clean_up(session, log_file, keep_temp);

    outcome.and(exported).and(cleaned)
}

fn execute(session: &mut StagingSession, cli: &Cli) -> Result<()> {
    let require: Vec<&str> = cli.require.iter().map(String::as_str).collect();
    let optional: Vec<&str> = cli.optional.iter().map(String::as_str).collect();
    let inputs = session.fetch_inputs(&require, &optional)?;

    let reader = TypeCorrectingReader::new();
    for (name, path) in &inputs {
        let table = reader.read(path).map_err(|source| CliError::Input {
            name: name.clone(),
            source,
        })?;
        info!(
            input = %name,
            rows = table.len(),
            columns = table.columns().len(),
            "Input staged"
        );
    }

    let local_descriptor = session.write_local_descriptor()?;
    if let Some(command) = &cli.command {
        run_command(command, &local_descriptor)?;
    }

    let root = session.scratch_root().to_path_buf();
    for group in session.discover_files(&root) {
        session.publish(&group, None, FailurePolicy::Log)?;
    }
    Ok(())
}

fn run_command(command: &str, descriptor: &Path) -> Result<()> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| CliError::config("--command must not be empty"))?;

    info!(command, "Running model command");
    let status = Command::new(program)
        .args(parts)
        .arg("-p")
        .arg(descriptor)
        .status()
        .map_err(|e| CliError::command(command, e.to_string()))?;

    if !status.success() {
        return Err(CliError::command(command, status.to_string()));
    }
    info!("Model command completed");
    Ok(())
}

/// Flush the ledger into the `instrumentError` role directory (the log
/// directory when no such output is declared) and publish the file.
fn export_errors(session: &mut StagingSession, ledger: &LedgerHandle) -> Result<()> {
    let columns: Vec<String> = match session.descriptor().output_attributes(EXPORT_NAME) {
        Some(attributes) if !attributes.is_empty() => attributes.to_vec(),
        _ => DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
    };
    let layout = session.layout();
    let directory = layout
        .role_dir(EXPORT_NAME)
        .unwrap_or_else(|| layout.log_dir())
        .to_path_buf();

    let flushed = ledger.flush(&directory, &columns)?;
    session.publish(&flushed, None, FailurePolicy::Log)?;
    Ok(())
}

fn clean_up(mut session: StagingSession, log_file: Option<&Path>, keep_temp: bool) -> Result<()> {
    if let Some(log) = log_file.filter(|p| p.is_file()) {
        let files = BTreeMap::from([("log".to_string(), log.to_path_buf())]);
        session.publish(&files, None, FailurePolicy::Log)?;
    }
    session.close(keep_temp)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    const DESCRIPTOR: &str = r#"{
        "name": "pit-converter",
        "datasets": {
            "inputData": [{"category": "portfolioReference", "attributes": []}],
            "outputData": [{"category": "instrumentError", "attributes": []}]
        },
        "settings": {
            "outputPaths": {"instrumentError": "out/instrumentError"},
            "inputPath": "in",
            "logPath": "log",
            "runDate": "2024-04-02",
            "reportingDate": "2024-03-31"
        }
    }"#;

    #[test]
    fn test_run_records_failure_in_given_registry() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("input_csv")).unwrap();
        let descriptor = dir.path().join("modelRunParameter.json");
        fs::write(&descriptor, DESCRIPTOR).unwrap();

        let cli = Cli::try_parse_from([
            "cap-model",
            "--local",
            descriptor.to_str().unwrap(),
            "--require",
            "portfolioReference.csv",
        ])
        .unwrap();

        let registry = LedgerRegistry::new();
        let result = run(&cli, Mode::Local, &registry, None, false);

        assert!(result.is_err());
        assert_eq!(registry.root().row_count(), 1);
        assert!(!LedgerRegistry::global().contains(cap_session::ledger::DEFAULT_LEDGER));
        assert!(dir.path().join("output/instrumentError/data.csv").is_file());
    }
}
