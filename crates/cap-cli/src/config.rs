//! Runner configuration
//!
//! Everything is environment driven. Env files only feed the process
//! environment; the rest of the run reads plain variables.

use crate::error::{CliError, Result};
use cap_session::ledger::MODEL_NAME_VAR;
use std::path::Path;
use tracing::debug;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Env file picked up from the working directory when present.
pub const BUNDLED_ENV_FILE: &str = ".env";

/// Keep the scratch directory after the run (`true`/`1`).
pub const KEEP_TEMP_VAR: &str = "CAP_KEEP_TEMP";

/// Load env files into the process environment.
///
/// Order: the bundled `.env` (overriding unless `use_defaults`), then either
/// `overwrite` (always overrides) or `config` (only fills unset variables).
/// Must run before any thread is spawned.
pub fn apply_env_files(
    use_defaults: bool,
    overwrite: Option<&Path>,
    config: Option<&Path>,
) -> Result<()> {
    apply_env_files_from(Path::new(BUNDLED_ENV_FILE), use_defaults, overwrite, config)
}

fn apply_env_files_from(
    bundled: &Path,
    use_defaults: bool,
    overwrite: Option<&Path>,
    config: Option<&Path>,
) -> Result<()> {
    if bundled.is_file() {
        load(bundled, !use_defaults)?;
    }
    if let Some(path) = overwrite {
        load(path, true)?;
    }
    if let Some(path) = config {
        load(path, false)?;
    }
    Ok(())
}

fn load(path: &Path, override_existing: bool) -> Result<()> {
    let loaded = if override_existing {
        dotenvy::from_path_override(path)
    } else {
        dotenvy::from_path(path)
    };
    loaded.map_err(|e| CliError::env_file(path.display().to_string(), e.to_string()))?;
    debug!(path = %path.display(), override_existing, "Loaded env file");
    Ok(())
}

/// Run-level settings read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// Model name, used as the default module code in error rows
    pub model_name: Option<String>,

    pub keep_temp: bool,
}

impl RunConfig {
    pub fn from_env() -> Self {
        Self {
            model_name: std::env::var(MODEL_NAME_VAR).ok().filter(|s| !s.is_empty()),
            keep_temp: std::env::var(KEEP_TEMP_VAR)
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}
