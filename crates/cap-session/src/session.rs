//! Staging session
//!
//! A [`StagingSession`] owns one scratch directory for the lifetime of a run.
//! It fetches the run descriptor and declared inputs into that directory,
//! and pushes produced files back to the backend. The backend is either the
//! local test-mode tree next to the descriptor or a remote [`ObjectStore`];
//! the public surface is the same for both.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use cap_common::{CapError, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::descriptor::RunDescriptor;
use crate::layout::{initialize_directory, StagingLayout};
use crate::policy::{attempt, Action, FailurePolicy};
use crate::storage::{local, ObjectStore};

/// File name of the descriptor copy with local settings.
pub const LOCAL_DESCRIPTOR_FILE: &str = "localModelRunParameters.json";

/// Where the run's data lives.
#[derive(Clone)]
pub enum Mode {
    /// Test mode: the descriptor path is a local file, inputs are read from
    /// `<testDir>/input_csv` and outputs are copied to `<testDir>/output`.
    Local,
    /// The descriptor location is an object key in `store`.
    Remote(Arc<dyn ObjectStore>),
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "Local"),
            Self::Remote(_) => write!(f, "Remote"),
        }
    }
}

/// Lifecycle of a session. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Initializing,
    Staged,
    Executing,
    Collecting,
    TornDown,
}

enum Backend {
    Local {
        input_dir: PathBuf,
        output_dir: PathBuf,
    },
    Remote {
        store: Arc<dyn ObjectStore>,
    },
}

pub struct StagingSession {
    scratch_root: PathBuf,
    descriptor: RunDescriptor,
    layout: StagingLayout,
    backend: Backend,
    state: SessionState,
}

impl fmt::Debug for StagingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingSession")
            .field("scratch_root", &self.scratch_root)
            .field("local", &matches!(self.backend, Backend::Local { .. }))
            .field("state", &self.state)
            .finish()
    }
}

fn file_name_of(location: &str) -> Option<&str> {
    location
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

fn join_key(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{prefix}/{rest}")
    }
}

impl StagingSession {
    /// Open a session with its scratch root under the system temp directory.
    pub fn open(location: &str, mode: Mode) -> Result<Self> {
        Self::open_in(location, mode, &std::env::temp_dir())
    }

    /// Open a session with its scratch root under `scratch_parent`.
    ///
    /// Fetches the descriptor at `location` (a local path or an object key,
    /// depending on `mode`). Any failure to fetch or parse it is a
    /// [`CapError::Descriptor`].
    pub fn open_in(location: &str, mode: Mode, scratch_parent: &Path) -> Result<Self> {
        let scratch_root = scratch_parent.join(format!("cap-{}", Uuid::new_v4()));
        fs::create_dir_all(&scratch_root)?;
        debug!(dir = %scratch_root.display(), "Created local temp directory");

        match Self::initialize(location, mode, scratch_root.clone()) {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&scratch_root) {
                    warn!(
                        error = %cleanup,
                        dir = %scratch_root.display(),
                        "Failed to remove temporary directory"
                    );
                }
                Err(e)
            },
        }
    }

    fn initialize(location: &str, mode: Mode, scratch_root: PathBuf) -> Result<Self> {
        let name = file_name_of(location)
            .ok_or_else(|| CapError::descriptor(format!("no file name in '{location}'")))?;
        let local_copy = scratch_root.join(name);

        let fetched = match &mode {
            Mode::Local => attempt(
                FailurePolicy::Raise,
                Action::Copy {
                    from: location.to_string(),
                    to: local_copy.display().to_string(),
                },
                || local::copy_file(Path::new(location), &local_copy),
            ),
            Mode::Remote(store) => attempt(
                FailurePolicy::Raise,
                Action::Download {
                    from: location.to_string(),
                    to: local_copy.display().to_string(),
                },
                || store.fetch_object(location, &local_copy),
            ),
        };
        fetched.map_err(|e| CapError::descriptor(e.to_string()))?;

        let descriptor = RunDescriptor::from_path(&local_copy)?;
        debug!(descriptor = %descriptor.raw(), "Contents of {name}");

        let layout = StagingLayout::create(&scratch_root, descriptor.output_paths.keys())?;

        let backend = match mode {
            Mode::Local => {
                let test_dir = std::path::absolute(Path::new(location))?
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                let output_dir = initialize_directory(&test_dir.join("output"))?;
                Backend::Local {
                    input_dir: test_dir.join("input_csv"),
                    output_dir,
                }
            }
            Mode::Remote(store) => Backend::Remote { store },
        };

        info!(
            run = descriptor.name.as_deref().unwrap_or("<unnamed>"),
            local = matches!(backend, Backend::Local { .. }),
            "Opened staging session"
        );

        Ok(Self {
            scratch_root,
            descriptor,
            layout,
            backend,
            state: SessionState::Initializing,
        })
    }

    pub fn descriptor(&self) -> &RunDescriptor {
        &self.descriptor
    }

    pub fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_local(&self) -> bool {
        matches!(self.backend, Backend::Local { .. })
    }

    fn advance(&mut self, to: SessionState) {
        if to > self.state {
            self.state = to;
        }
    }

    /// Backend location of an input file or part-file directory.
    fn input_location(&self, name: &str) -> String {
        match &self.backend {
            Backend::Local { input_dir, .. } => input_dir.join(name).display().to_string(),
            Backend::Remote { .. } => join_key(&self.descriptor.input_path, name),
        }
    }

    /// Backend location for a published file.
    fn publish_location(&self, name: &str, path: &Path, scenario: Option<&str>) -> String {
        let partition = scenario.map(|s| format!("scenarioPartition={s}"));
        let data_file = format!("data{}", extension_of(path));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match (&self.backend, self.descriptor.output_paths.get(name)) {
            (Backend::Local { output_dir, .. }, Some(_)) => {
                let mut dest = output_dir.join(name);
                if let Some(p) = &partition {
                    dest.push(p);
                }
                dest.join(data_file).display().to_string()
            }
            (Backend::Local { output_dir, .. }, None) => {
                output_dir.join("log").join(file_name).display().to_string()
            }
            (Backend::Remote { .. }, Some(root)) => {
                let mut key = root.trim_end_matches('/').to_string();
                if let Some(p) = &partition {
                    key = join_key(&key, p);
                }
                join_key(&key, &data_file)
            }
            (Backend::Remote { .. }, None) => join_key(&self.descriptor.log_path, &file_name),
        }
    }

    fn fetch(&self, location: &str, local_path: &Path, policy: FailurePolicy) -> Result<bool> {
        let done = match &self.backend {
            Backend::Local { .. } => attempt(
                policy,
                Action::Copy {
                    from: location.to_string(),
                    to: local_path.display().to_string(),
                },
                || local::copy_file(Path::new(location), local_path),
            )?,
            Backend::Remote { store } => attempt(
                policy,
                Action::Download {
                    from: location.to_string(),
                    to: local_path.display().to_string(),
                },
                || store.fetch_object(location, local_path),
            )?,
        };
        if done.is_some() {
            info!("Successfully fetched {location} to {}", local_path.display());
        }
        Ok(done.is_some())
    }

    fn push(&self, local_path: &Path, location: &str, policy: FailurePolicy) -> Result<bool> {
        let done = match &self.backend {
            Backend::Local { .. } => attempt(
                policy,
                Action::Copy {
                    from: local_path.display().to_string(),
                    to: location.to_string(),
                },
                || local::copy_file(local_path, Path::new(location)),
            )?,
            Backend::Remote { store } => attempt(
                policy,
                Action::Upload {
                    from: local_path.display().to_string(),
                    to: location.to_string(),
                },
                || store.push_object(local_path, location),
            )?,
        };
        if done.is_some() {
            info!("Successfully published {} to {location}", local_path.display());
        }
        Ok(done.is_some())
    }

    /// Fetch every declared input and supporting dataset into the input
    /// directory.
    ///
    /// File names listed in `require` fail the call when they cannot be
    /// fetched, names in `optional` are skipped silently, and any other
    /// failure is logged as a warning. Returns base name to local path for the
    /// files that arrived.
    pub fn fetch_inputs(
        &mut self,
        require: &[&str],
        optional: &[&str],
    ) -> Result<BTreeMap<String, PathBuf>> {
        fs::create_dir_all(self.layout.input_dir())?;

        let mut fetched = BTreeMap::new();
        for file_name in self.descriptor.input_file_names() {
            let policy = if require.contains(&file_name.as_str()) {
                FailurePolicy::Raise
            } else if optional.contains(&file_name.as_str()) {
                FailurePolicy::Ignore
            } else {
                FailurePolicy::Log
            };

            let local_path = self.layout.input_dir().join(&file_name);
            let location = self.input_location(&file_name);
            if self.fetch(&location, &local_path, policy)? {
                fetched.insert(base_name(&local_path), local_path);
            }
        }

        self.advance(SessionState::Staged);
        Ok(fetched)
    }

    /// Fetch a dataset stored as `part-*` files under `<input>/<name>` and
    /// join them into `<name>.csv` in the input directory.
    pub fn fetch_part_files(
        &mut self,
        name: &str,
        policy: FailurePolicy,
    ) -> Result<BTreeMap<String, PathBuf>> {
        let local_path = self.layout.input_dir().join(format!("{name}.csv"));
        let location = self.input_location(name);
        let action = Action::Download {
            from: format!("part files in {location}"),
            to: local_path.display().to_string(),
        };

        let done = match &self.backend {
            Backend::Local { .. } => attempt(policy, action, || {
                local::copy_part_files(Path::new(&location), &local_path)
            })?,
            Backend::Remote { store } => attempt(policy, action, || {
                store.fetch_multipart_object(&location, &local_path)
            })?,
        };

        let mut fetched = BTreeMap::new();
        if done.is_some() {
            info!("Successfully fetched part files in {location} to {}", local_path.display());
            fetched.insert(name.to_string(), local_path);
        }
        self.advance(SessionState::Staged);
        Ok(fetched)
    }

    /// Group the files under `directory` into name maps with unique base names.
    /// See [`discover_files`].
    pub fn discover_files(&mut self, directory: &Path) -> Vec<BTreeMap<String, PathBuf>> {
        self.advance(SessionState::Executing);
        discover_files(directory)
    }

    /// Push files to the backend.
    ///
    /// A file whose name is a declared output role goes to that role as
    /// `data<ext>` (under `scenarioPartition=<scenario>` when given); any
    /// other file goes to the log location under its own file name. Returns
    /// the locations actually written.
    pub fn publish(
        &mut self,
        files: &BTreeMap<String, PathBuf>,
        scenario: Option<&str>,
        policy: FailurePolicy,
    ) -> Result<Vec<String>> {
        self.advance(SessionState::Collecting);

        let mut written = Vec::new();
        for (name, path) in files {
            let location = self.publish_location(name, path, scenario);
            if self.push(path, &location, policy)? {
                written.push(location);
            }
        }
        Ok(written)
    }

    /// Write a copy of the descriptor whose `settings` point at the scratch
    /// directories, for model steps that only work with local paths.
    pub fn write_local_descriptor(&self) -> Result<PathBuf> {
        let mut document = self.descriptor.raw().clone();
        let settings = document
            .get_mut("settings")
            .and_then(|s| s.as_object_mut())
            .ok_or_else(|| CapError::descriptor("settings is not an object"))?;

        if let serde_json::Value::Object(local) = self.layout.settings_json() {
            settings.extend(local);
        }

        let path = self.scratch_root.join(LOCAL_DESCRIPTOR_FILE);
        let file = fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, &document)?;
        debug!(path = %path.display(), "Wrote local run descriptor");
        Ok(path)
    }

    /// Write `contents` as `file_name` into a role directory (the log
    /// directory when `role` is `None`).
    pub fn write_file(&self, contents: &[u8], file_name: &str, role: Option<&str>) -> Result<PathBuf> {
        let dir = match role {
            Some(role) => self
                .layout
                .role_dir(role)
                .ok_or_else(|| CapError::config(format!("Unknown role: {role}")))?,
            None => self.layout.log_dir(),
        };
        let path = dir.join(file_name);
        info!("Writing file: {file_name}");
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Delete the scratch root.
    pub fn tear_down(&mut self, policy: FailurePolicy) -> Result<()> {
        let root = self.scratch_root.clone();
        let deleted = attempt(
            policy,
            Action::Teardown {
                path: root.display().to_string(),
            },
            || {
                fs::remove_dir_all(&root)
                    .with_context(|| format!("Failed to remove {}", root.display()))
            },
        )?;
        if deleted.is_some() {
            info!("Successfully deleted temporary directory: {}", root.display());
        }
        self.state = SessionState::TornDown;
        Ok(())
    }

    /// End the session, deleting the scratch root unless `keep_temp` is set.
    pub fn close(mut self, keep_temp: bool) -> Result<()> {
        if keep_temp {
            info!(dir = %self.scratch_root.display(), "Keeping temporary directory");
            self.state = SessionState::TornDown;
            return Ok(());
        }
        self.tear_down(FailurePolicy::Log)
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Walk `directory` and group its files into maps of base name to path.
///
/// Entries are visited in file-name order at every level and hidden entries
/// are skipped, so the grouping is the same on every run. Files go into the
/// current map until one repeats a base name already in it; that file starts
/// a new map. An empty or missing directory gives an empty list.
pub fn discover_files(directory: &Path) -> Vec<BTreeMap<String, PathBuf>> {
    if !directory.is_dir() {
        warn!("Not found: {}", directory.display());
        return Vec::new();
    }

    let mut groups: Vec<BTreeMap<String, PathBuf>> = Vec::new();
    let walker = WalkDir::new(directory)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = base_name(entry.path());
        let path = entry.into_path();
        match groups.last_mut() {
            Some(group) if !group.contains_key(&name) => {
                group.insert(name, path);
            }
            _ => {
                let mut group = BTreeMap::new();
                group.insert(name, path);
                groups.push(group);
            }
        }
    }
    groups
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_of_key_and_path() {
        assert_eq!(file_name_of("runs/42/modelRunParameter.json"), Some("modelRunParameter.json"));
        assert_eq!(file_name_of("mrp.json"), Some("mrp.json"));
        assert_eq!(file_name_of("runs/"), None);
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("out/summary/", "data.csv"), "out/summary/data.csv");
        assert_eq!(join_key("", "data.csv"), "data.csv");
    }

    #[test]
    fn test_discover_splits_on_duplicate_base_name() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a/results.csv"), "").unwrap();
        fs::write(dir.path().join("a/summary.csv"), "").unwrap();
        fs::write(dir.path().join("b/results.csv"), "").unwrap();
        fs::write(dir.path().join("b/.hidden"), "").unwrap();

        let groups = discover_files(dir.path());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0]["results"], dir.path().join("a/results.csv"));
        assert_eq!(groups[1]["results"], dir.path().join("b/results.csv"));
        assert!(groups.iter().all(|g| !g.contains_key(".hidden") && !g.contains_key("")));
    }

    #[test]
    fn test_discover_empty_and_missing() {
        let dir = TempDir::new().unwrap();
        assert!(discover_files(dir.path()).is_empty());
        assert!(discover_files(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_state_ordering() {
        assert!(SessionState::Initializing < SessionState::Staged);
        assert!(SessionState::Collecting < SessionState::TornDown);
    }
}
