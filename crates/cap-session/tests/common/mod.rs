//! Shared fixtures for session tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use cap_session::ObjectStore;
use serde_json::{json, Value};
use tempfile::TempDir;

pub fn descriptor_json(input_path: &str, log_path: &str) -> Value {
    json!({
        "name": "pit-converter",
        "datasets": {
            "modelFactors": [],
            "inputData": [
                {"category": "instrumentReference", "attributes": ["instrumentIdentifier", "foreclosed"]},
                {"category": "portfolioReference", "attributes": []}
            ],
            "outputData": [
                {"category": "summary", "attributes": []},
                {"category": "instrumentError", "attributes": ["errorMessage", "errorCode", "instrumentIdentifier"]}
            ],
            "supportingData": [
                {"category": "macroScenario", "attributes": []}
            ]
        },
        "settings": {
            "scenarios": [{"name": "base", "asOfDate": "2024-03-31", "weight": 1.0}],
            "outputPaths": {
                "summary": "runs/42/output/summary",
                "instrumentError": "runs/42/output/instrumentError"
            },
            "inputPath": input_path,
            "logPath": log_path,
            "runDate": "2024-04-02",
            "reportingDate": "2024-03-31"
        }
    })
}

/// A local test directory: descriptor plus `input_csv/` with the given files.
pub struct TestDir {
    pub root: TempDir,
    pub scratch: TempDir,
}

impl TestDir {
    pub fn new(inputs: &[(&str, &str)]) -> Self {
        let root = TempDir::new().unwrap();
        let input_dir = root.path().join("input_csv");
        fs::create_dir_all(&input_dir).unwrap();
        for (name, content) in inputs {
            fs::write(input_dir.join(name), content).unwrap();
        }
        fs::write(
            root.path().join("modelRunParameter.json"),
            descriptor_json("unused", "unused").to_string(),
        )
        .unwrap();

        Self {
            root,
            scratch: TempDir::new().unwrap(),
        }
    }

    pub fn descriptor_path(&self) -> String {
        self.root.path().join("modelRunParameter.json").display().to_string()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.path().join("output")
    }
}

/// In-memory object store keyed by object key.
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn with_objects(objects: &[(&str, &[u8])]) -> Self {
        let store = Self::default();
        {
            let mut map = store.objects.lock().unwrap();
            for (key, data) in objects {
                map.insert(key.to_string(), data.to_vec());
            }
        }
        store
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

fn write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}

impl ObjectStore for MemoryStore {
    fn fetch_object(&self, key: &str, local_path: &Path) -> Result<()> {
        let data = self.get(key).ok_or_else(|| anyhow!("NoSuchKey: {key}"))?;
        write(local_path, &data)
    }

    fn fetch_multipart_object(&self, prefix: &str, local_path: &Path) -> Result<()> {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let parts: Vec<Vec<u8>> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix) && k[prefix.len()..].starts_with("part-"))
            .map(|(_, v)| v.clone())
            .collect();
        if parts.is_empty() {
            return Err(anyhow!("no part files under {prefix}"));
        }

        let mut joined = String::new();
        for (i, part) in parts.iter().enumerate() {
            let text = String::from_utf8(part.clone())?;
            for (n, line) in text.lines().enumerate() {
                if i > 0 && n == 0 {
                    continue;
                }
                joined.push_str(line);
                joined.push('\n');
            }
        }
        write(local_path, joined.as_bytes())
    }

    fn push_object(&self, local_path: &Path, key: &str) -> Result<()> {
        let data = fs::read(local_path)?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }
}
