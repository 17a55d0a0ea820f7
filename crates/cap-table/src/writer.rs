//! Delimited-file export

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use cap_common::Result;
use tracing::debug;

use crate::table::Table;

/// Write `table` as a comma-separated file with a header row and no index
/// column. Nulls are written as empty fields, dates as `YYYY-MM-DD`.
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.column_names())?;
    for i in 0..table.len() {
        let row: Vec<String> = table
            .columns()
            .iter()
            .map(|c| c.values[i].to_string())
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = table.len(), "Wrote table");
    Ok(())
}

/// Write one file per named table into `directory`.
///
/// Files are named `<name>.csv`, or `<name>_<scenario>.csv` when a scenario is
/// given. Returns name to written path.
pub fn write_tables(
    tables: &BTreeMap<String, Table>,
    directory: &Path,
    scenario: Option<&str>,
) -> Result<BTreeMap<String, PathBuf>> {
    fs::create_dir_all(directory)?;

    let mut written = BTreeMap::new();
    for (name, table) in tables {
        let file_name = match scenario {
            Some(s) => format!("{name}_{s}.csv"),
            None => format!("{name}.csv"),
        };
        let path = directory.join(file_name);
        write_csv(table, &path)?;
        written.insert(name.clone(), path);
    }
    Ok(written)
}

/// An en-dash in UTF-8. Read as cp1252 it shows up as `â€“` and breaks
/// header matching downstream.
const EN_DASH: &[u8] = "\u{2013}".as_bytes();

/// Copy each file to `<stem>_cleaned.<ext>` with en-dashes in the header line
/// replaced by `-`. Data lines are copied byte for byte.
///
/// Returns name to cleaned path; the source files are left in place.
pub fn clean_output_headers(files: &BTreeMap<String, PathBuf>) -> Result<BTreeMap<String, PathBuf>> {
    let mut cleaned = BTreeMap::new();
    for (name, path) in files {
        let target = cleaned_path(path);
        let mut reader = BufReader::new(File::open(path)?);
        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header)?;

        let mut writer = BufWriter::new(File::create(&target)?);
        writer.write_all(&replace_en_dashes(&header))?;
        io::copy(&mut reader, &mut writer)?;
        writer.flush()?;

        debug!(from = %path.display(), to = %target.display(), "Cleaned output headers");
        cleaned.insert(name.clone(), target);
    }
    Ok(cleaned)
}

fn cleaned_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_cleaned.{}", ext.to_string_lossy()),
        None => format!("{stem}_cleaned"),
    };
    path.with_file_name(name)
}

fn replace_en_dashes(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut rest = line;
    while let Some((&byte, tail)) = rest.split_first() {
        if let Some(after) = rest.strip_prefix(EN_DASH) {
            out.push(b'-');
            rest = after;
        } else {
            out.push(byte);
            rest = tail;
        }
    }
    out
}
