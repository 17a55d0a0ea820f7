//! CAP model runner - main entry point

use cap_cli::config::{apply_env_files, RunConfig};
use cap_cli::{model, Cli};
use cap_common::logging::{init_logging, LogConfig, LoggingGuard};
use cap_session::LedgerRegistry;
use clap::Parser;
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Env files feed everything below, logging included
    if let Err(e) = apply_env_files(cli.use_defaults, cli.overwrite.as_deref(), cli.config.as_deref()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    // Environment first, then the command-line level on top
    let mut log_config = LogConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring invalid logging settings: {}", e);
        LogConfig::default()
    });
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }

    // The run works without logging
    let guard = init_logging(&log_config).unwrap_or_else(|e| {
        eprintln!("Warning: logging disabled: {}", e);
        LoggingGuard::default()
    });

    let exit_code = run(&cli, &guard);
    info!("Exit code: {exit_code}");

    process::exit(exit_code);
}

fn run(cli: &Cli, guard: &LoggingGuard) -> i32 {
    let run_config = RunConfig::from_env();
    info!(model = run_config.model_name.as_deref().unwrap_or("unnamed"), "Running model");

    let keep_temp = cli.keep_temp || run_config.keep_temp;
    let result = model::mode_for(cli).and_then(|mode| {
        model::run(cli, mode, LedgerRegistry::global(), guard.log_file(), keep_temp)
    });

    match result {
        Ok(()) => {
            info!("Model execution completed");
            0
        },
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal_config(), "Model run failed");
            eprintln!("Error: {}", e);
            1
        },
    }
}
