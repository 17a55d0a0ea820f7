//! File-copy backend for test mode

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::{concat_part_files, is_part_file};

/// Copy `from` to `to`, creating the destination directory first.
pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(from, to).with_context(|| format!("Failed to copy {}", from.display()))?;
    debug!(from = %from.display(), to = %to.display(), "Copied file");
    Ok(())
}

/// Concatenate the `part-*` files directly under `dir` (sorted by name) into `to`.
pub fn copy_part_files(dir: &Path, to: &Path) -> Result<()> {
    let mut parts: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_part_file)
        })
        .collect();
    parts.sort();
    concat_part_files(&parts, to)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_creates_parent() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.csv");
        fs::write(&from, "a\n1\n").unwrap();

        let to = dir.path().join("deep/er/a.csv");
        copy_file(&from, &to).unwrap();
        assert_eq!(fs::read_to_string(to).unwrap(), "a\n1\n");
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let err = copy_file(&dir.path().join("nope.csv"), &dir.path().join("x.csv")).unwrap_err();
        assert!(err.to_string().contains("nope.csv"));
    }

    #[test]
    fn test_copy_part_files_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("part-00001.csv"), "h\n2\n").unwrap();
        fs::write(src.join("part-00000.csv"), "h\n1\n").unwrap();
        fs::write(src.join("_SUCCESS"), "").unwrap();

        let to = dir.path().join("joined.csv");
        copy_part_files(&src, &to).unwrap();
        assert_eq!(fs::read_to_string(to).unwrap(), "h\n1\n2\n");
    }
}
