//! Run descriptor parsing
//!
//! The run descriptor (`modelRunParameter.json` and friends) names the
//! datasets a run consumes and produces, and where each of them lives in the
//! backend. A descriptor that is missing a required key is a fatal
//! configuration error.

use std::collections::BTreeMap;
use std::path::Path;

use cap_common::{CapError, Result};
use cap_table::repair::parse_datetime;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value as Json;

/// One entry of a dataset group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatasetGroup {
    pub category: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: Option<String>,
    pub as_of: Option<NaiveDateTime>,
    pub weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDatasets {
    #[serde(default)]
    model_factors: Vec<DatasetGroup>,
    #[serde(default)]
    input_data: Vec<DatasetGroup>,
    #[serde(default)]
    output_data: Vec<DatasetGroup>,
    #[serde(default)]
    supporting_data: Vec<DatasetGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScenario {
    name: Option<String>,
    as_of_date: Option<Json>,
    weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    #[serde(default)]
    scenarios: Vec<RawScenario>,
    output_paths: BTreeMap<String, String>,
    input_path: String,
    log_path: String,
    run_date: Json,
    reporting_date: Json,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    name: Option<String>,
    datasets: RawDatasets,
    settings: RawSettings,
}

/// Parsed run descriptor. Immutable once built.
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    pub name: Option<String>,
    pub scenarios: Vec<Scenario>,
    pub model_factors: Vec<DatasetGroup>,
    pub input_data: Vec<DatasetGroup>,
    pub output_data: Vec<DatasetGroup>,
    pub supporting_data: Vec<DatasetGroup>,
    /// Output category to backend root
    pub output_paths: BTreeMap<String, String>,
    pub input_path: String,
    pub log_path: String,
    pub run_date: NaiveDateTime,
    pub reporting_date: NaiveDateTime,
    raw: Json,
}

impl RunDescriptor {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CapError::descriptor(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: Json = serde_json::from_str(text)
            .map_err(|e| CapError::descriptor(format!("not valid JSON: {e}")))?;
        Self::from_json(raw)
    }

    pub fn from_json(raw: Json) -> Result<Self> {
        let parsed: RawDescriptor = serde_json::from_value(raw.clone())
            .map_err(|e| CapError::descriptor(e.to_string()))?;

        let scenarios = parsed
            .settings
            .scenarios
            .into_iter()
            .map(|s| Scenario {
                name: s.name,
                as_of: s.as_of_date.as_ref().and_then(json_datetime),
                weight: s.weight,
            })
            .collect();

        Ok(Self {
            name: parsed.name,
            scenarios,
            model_factors: parsed.datasets.model_factors,
            input_data: parsed.datasets.input_data,
            output_data: parsed.datasets.output_data,
            supporting_data: parsed.datasets.supporting_data,
            output_paths: parsed.settings.output_paths,
            input_path: parsed.settings.input_path,
            log_path: parsed.settings.log_path,
            run_date: required_datetime(&parsed.settings.run_date, "settings.runDate")?,
            reporting_date: required_datetime(
                &parsed.settings.reporting_date,
                "settings.reportingDate",
            )?,
            raw,
        })
    }

    /// The document as it was read.
    pub fn raw(&self) -> &Json {
        &self.raw
    }

    /// `<category>.csv` for every input and supporting dataset, in declaration
    /// order with duplicates removed.
    pub fn input_file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for group in self.input_data.iter().chain(&self.supporting_data) {
            let name = format!("{}.csv", group.category);
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Declared attributes of an output dataset
    pub fn output_attributes(&self, category: &str) -> Option<&[String]> {
        self.output_data
            .iter()
            .find(|g| g.category == category)
            .map(|g| g.attributes.as_slice())
    }

    pub fn is_output_role(&self, name: &str) -> bool {
        self.output_paths.contains_key(name)
    }
}

fn json_datetime(value: &Json) -> Option<NaiveDateTime> {
    match value {
        Json::String(s) => parse_datetime(s).and_then(|v| match v {
            cap_table::Value::Date(d) => d.and_hms_opt(0, 0, 0),
            cap_table::Value::DateTime(dt) => Some(dt),
            _ => None,
        }),
        // Epoch milliseconds
        Json::Number(n) => n
            .as_i64()
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|dt| dt.naive_utc()),
        _ => None,
    }
}

fn required_datetime(value: &Json, key: &str) -> Result<NaiveDateTime> {
    json_datetime(value).ok_or_else(|| CapError::descriptor(format!("{key} is not a date: {value}")))
}
