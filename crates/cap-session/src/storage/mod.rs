//! Backend storage
//!
//! A session talks to its backend through three blocking primitives: fetch one
//! object, fetch a multipart object (a prefix holding `part-*` files), and push
//! one object. [`ObjectStore`] is that seam for remote backends; [`local`]
//! provides the same primitives as plain file copies for test mode.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub mod config;
pub mod local;
pub mod s3;

pub use config::StorageConfig;
pub use s3::S3Store;

/// Remote object store used by remote-mode sessions.
///
/// Implementations block until the transfer has finished and return an error
/// on any failure. Keys are `/`-separated and have no leading slash.
pub trait ObjectStore: Send + Sync {
    /// Download `key` to `local_path`, creating parent directories.
    fn fetch_object(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Download every `part-*` object under `prefix` and concatenate them into
    /// `local_path`, keeping only the first header line.
    fn fetch_multipart_object(&self, prefix: &str, local_path: &Path) -> Result<()>;

    /// Upload `local_path` to `key`.
    fn push_object(&self, local_path: &Path, key: &str) -> Result<()>;
}

/// True for the file names a partitioned writer produces (`part-00000.csv`).
pub fn is_part_file(name: &str) -> bool {
    name.starts_with("part-")
}

/// Concatenate delimited `parts` into `dest`. The first line of every part
/// after the first is treated as a repeated header and skipped.
pub fn concat_part_files<P: AsRef<Path>>(parts: &[P], dest: &Path) -> Result<()> {
    if parts.is_empty() {
        anyhow::bail!("no part files found for {}", dest.display());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut out = File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    for (i, part) in parts.iter().enumerate() {
        let part = part.as_ref();
        let reader = BufReader::new(
            File::open(part).with_context(|| format!("Failed to open {}", part.display()))?,
        );
        for (n, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", part.display()))?;
            if i > 0 && n == 0 {
                continue;
            }
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Remove a directory of downloaded parts once they have been joined.
/// Failures are logged, not returned; returns whether the directory is gone.
pub fn remove_parts_dir(dir: &Path) -> bool {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!(dir = %dir.display(), "Removed part files");
            true
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(error = %e, dir = %dir.display(), "Failed to remove part files");
            false
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_concat_drops_repeated_headers() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("part-00000.csv");
        let b = dir.path().join("part-00001.csv");
        fs::write(&a, "id,v\n1,2\n").unwrap();
        fs::write(&b, "id,v\n3,4\n").unwrap();

        let dest = dir.path().join("out/joined.csv");
        concat_part_files(&[a, b], &dest).unwrap();

        assert_eq!(fs::read_to_string(dest).unwrap(), "id,v\n1,2\n3,4\n");
    }

    #[test]
    fn test_concat_without_parts_fails() {
        let dir = TempDir::new().unwrap();
        let parts: Vec<std::path::PathBuf> = Vec::new();
        assert!(concat_part_files(&parts, &dir.path().join("x.csv")).is_err());
    }

    #[test]
    fn test_remove_parts_dir() {
        let dir = TempDir::new().unwrap();
        let parts = dir.path().join("joined.parts");
        fs::create_dir_all(&parts).unwrap();
        fs::write(parts.join("00000"), "id\n1\n").unwrap();

        assert!(remove_parts_dir(&parts));
        assert!(!parts.exists());
        // Already gone
        assert!(remove_parts_dir(&parts));

        // Not a directory: logged and reported, the file stays
        let file = dir.path().join("plain.csv");
        fs::write(&file, "id\n").unwrap();
        assert!(!remove_parts_dir(&file));
        assert!(file.exists());
    }
}
