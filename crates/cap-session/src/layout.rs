//! Scratch directory layout for one run

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cap_common::Result;
use serde_json::{json, Value as Json};
use tracing::debug;

/// Role name of the log directory.
pub const LOG_ROLE: &str = "logPath";
/// Role name of the input directory.
pub const INPUT_ROLE: &str = "inputPath";
/// Parent of every output role directory.
pub const OUTPUT_ROLE: &str = "outputPaths";

/// Local scratch directories, one per role declared by the run descriptor.
///
/// ```text
/// <root>/logPath
/// <root>/inputPath
/// <root>/outputPaths/<category>
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StagingLayout {
    root: PathBuf,
    log_dir: PathBuf,
    input_dir: PathBuf,
    outputs: BTreeMap<String, PathBuf>,
}

/// Remove `dir` if present and create it empty.
pub fn initialize_directory(dir: &Path) -> Result<PathBuf> {
    debug!(dir = %dir.display(), "Clearing directory");
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

impl StagingLayout {
    /// Create (wiping anything already there) the role directories under `root`.
    pub fn create<'a, I>(root: &Path, output_roles: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let log_dir = initialize_directory(&root.join(LOG_ROLE))?;
        let input_dir = initialize_directory(&root.join(INPUT_ROLE))?;
        let mut outputs = BTreeMap::new();
        for role in output_roles {
            let dir = initialize_directory(&root.join(OUTPUT_ROLE).join(role))?;
            outputs.insert(role.clone(), dir);
        }
        Ok(Self {
            root: root.to_path_buf(),
            log_dir,
            input_dir,
            outputs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn outputs(&self) -> &BTreeMap<String, PathBuf> {
        &self.outputs
    }

    /// Directory for a role name: `logPath`, `inputPath`, or an output category.
    pub fn role_dir(&self, role: &str) -> Option<&Path> {
        match role {
            LOG_ROLE => Some(&self.log_dir),
            INPUT_ROLE => Some(&self.input_dir),
            _ => self.outputs.get(role).map(PathBuf::as_path),
        }
    }

    /// The layout in run-descriptor `settings` shape, with local paths.
    pub fn settings_json(&self) -> Json {
        let outputs: serde_json::Map<String, Json> = self
            .outputs
            .iter()
            .map(|(role, dir)| (role.clone(), json!(dir.display().to_string())))
            .collect();
        json!({
            LOG_ROLE: self.log_dir.display().to_string(),
            INPUT_ROLE: self.input_dir.display().to_string(),
            OUTPUT_ROLE: outputs,
        })
    }
}
