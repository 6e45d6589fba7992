//! Type Demultiplexer - split the trial export by `trial_type`
//!
//! Each row of `trialdata.csv` is `(wid, index, timestamp, json)`. The JSON
//! payload is decoded, tagged with `wid`, and routed by its `trial_type`:
//!
//! | trial_type     | dataset              |
//! |----------------|----------------------|
//! | `main`         | `trials.json`        |
//! | `learn_rewards`| `learn_rewards.json` |
//! | `calibration`  | `calibration.json`   |
//! | `survey-text`  | `survey.csv`         |
//!
//! Anything else stays in the raw export only.

use crate::aggregate::FailurePolicy;
use crate::error::{DecodeError, DecodeFailure, PipelineError};
use crate::record::scalar_text;
use crate::table::{parse_rows, read_to_string, render_table, write_atomic};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub const SURVEY_FILE: &str = "survey.csv";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrialType {
    LearnRewards,
    Main,
    SurveyText,
    Calibration,
    Other(String),
}

impl TrialType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "learn_rewards" => TrialType::LearnRewards,
            "main" => TrialType::Main,
            "survey-text" => TrialType::SurveyText,
            "calibration" => TrialType::Calibration,
            other => TrialType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrialType::LearnRewards => "learn_rewards",
            TrialType::Main => "main",
            TrialType::SurveyText => "survey-text",
            TrialType::Calibration => "calibration",
            TrialType::Other(tag) => tag,
        }
    }

    /// Name of the JSON dataset this type is exported to, if any.
    pub fn json_dataset(&self) -> Option<&'static str> {
        match self {
            TrialType::Main => Some("trials"),
            TrialType::LearnRewards => Some("learn_rewards"),
            TrialType::Calibration => Some("calibration"),
            TrialType::SurveyText | TrialType::Other(_) => None,
        }
    }
}

/// Free-text survey answers, one row per survey trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyTable {
    /// `wid` followed by response keys in first-seen order.
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

impl SurveyTable {
    fn push(&mut self, row: Map<String, Value>) {
        for key in row.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// CSV with a header row; empty string when there are no survey rows.
    pub fn render(&self) -> Result<String, csv::Error> {
        if self.rows.is_empty() {
            return Ok(String::new());
        }
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| row.get(c).map(scalar_text).unwrap_or_default())
                    .collect()
            })
            .collect();
        render_table(Some(self.columns.as_slice()), &cells)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Demultiplexed {
    pub trials: Vec<Value>,
    pub learn_rewards: Vec<Value>,
    pub calibration: Vec<Value>,
    pub survey: SurveyTable,
    /// Row counts for trial types that are not exported.
    pub unexported: BTreeMap<String, usize>,
}

impl Demultiplexed {
    fn dataset_mut(&mut self, name: &str) -> Option<&mut Vec<Value>> {
        match name {
            "trials" => Some(&mut self.trials),
            "learn_rewards" => Some(&mut self.learn_rewards),
            "calibration" => Some(&mut self.calibration),
            _ => None,
        }
    }

    /// `(dataset name, objects)` for every JSON dataset.
    pub fn json_datasets(&self) -> [(&'static str, &[Value]); 3] {
        [
            ("trials", self.trials.as_slice()),
            ("learn_rewards", self.learn_rewards.as_slice()),
            ("calibration", self.calibration.as_slice()),
        ]
    }

    /// Writes the JSON datasets and `survey.csv` into `dir`.
    pub fn persist(&self, dir: &Path) -> Result<(), PipelineError> {
        for (name, objects) in self.json_datasets() {
            let path = dir.join(format!("{}.json", name));
            write_atomic(&path, serde_json::to_string(objects)?.as_bytes())?;
            log::info!("📝 Wrote {} ({} objects)", path.display(), objects.len());
        }

        let path = dir.join(SURVEY_FILE);
        write_atomic(&path, self.survey.render()?.as_bytes())?;
        log::info!("📝 Wrote {} ({} rows)", path.display(), self.survey.rows().len());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DemuxReport {
    pub rows_read: usize,
    pub failures: Vec<DecodeFailure>,
}

enum Decoded {
    Trial(TrialType, Value),
    Survey(Map<String, Value>),
}

fn decode_row(row: &[String]) -> Result<Decoded, DecodeError> {
    let [wid, _index, _timestamp, payload] = row else {
        return Err(DecodeError::ColumnCount(row.len()));
    };

    let mut object = match serde_json::from_str::<Value>(payload).map_err(DecodeError::InvalidJson)? {
        Value::Object(object) => object,
        _ => return Err(DecodeError::NotAnObject),
    };

    let trial_type = object
        .get("trial_type")
        .and_then(Value::as_str)
        .map(TrialType::parse)
        .ok_or(DecodeError::MissingTrialType)?;

    if trial_type == TrialType::SurveyText {
        return survey_row(wid, &object).map(Decoded::Survey);
    }

    object.insert("wid".to_string(), Value::String(wid.clone()));
    Ok(Decoded::Trial(trial_type, Value::Object(object)))
}

/// `{wid, **responses}`: the JSON-encoded answers lifted to the top level.
fn survey_row(wid: &str, object: &Map<String, Value>) -> Result<Map<String, Value>, DecodeError> {
    let responses = match object.get("responses") {
        Some(Value::String(encoded)) => {
            serde_json::from_str::<Value>(encoded).map_err(DecodeError::InvalidJson)?
        }
        Some(Value::Object(inline)) => Value::Object(inline.clone()),
        _ => return Err(DecodeError::InvalidResponses),
    };
    let Value::Object(responses) = responses else {
        return Err(DecodeError::InvalidResponses);
    };

    let mut row = Map::new();
    row.insert("wid".to_string(), Value::String(wid.to_string()));
    row.extend(responses);
    Ok(row)
}

/// Splits a trial export body into typed datasets.
pub fn demultiplex(body: &str, policy: FailurePolicy) -> Result<(Demultiplexed, DemuxReport), PipelineError> {
    let rows = parse_rows(body)?;
    let mut out = Demultiplexed::default();
    let mut report = DemuxReport {
        rows_read: rows.len(),
        ..Default::default()
    };

    for (idx, row) in rows.iter().enumerate() {
        match decode_row(row) {
            Ok(Decoded::Survey(survey)) => out.survey.push(survey),
            Ok(Decoded::Trial(trial_type, object)) => match trial_type.json_dataset() {
                Some(name) => {
                    if let Some(dataset) = out.dataset_mut(name) {
                        dataset.push(object);
                    }
                }
                None => {
                    *out.unexported
                        .entry(trial_type.as_str().to_string())
                        .or_insert(0) += 1;
                }
            },
            Err(source) => {
                let failure = DecodeFailure { row: idx + 1, source };
                match policy {
                    FailurePolicy::FailFast => return Err(failure.into()),
                    FailurePolicy::CollectAndContinue => {
                        log::warn!("⚠️  {}", failure);
                        report.failures.push(failure);
                    }
                }
            }
        }
    }

    log::info!(
        "🔀 Demultiplexed {} rows: {} main, {} learn_rewards, {} calibration, {} survey",
        report.rows_read,
        out.trials.len(),
        out.learn_rewards.len(),
        out.calibration.len(),
        out.survey.rows().len()
    );
    for (tag, count) in &out.unexported {
        log::debug!("   └─ {} rows of type '{}' left in raw export", count, tag);
    }

    Ok((out, report))
}

/// Reads `trialdata.csv` from disk and demultiplexes it.
pub fn demultiplex_file(path: &Path, policy: FailurePolicy) -> Result<(Demultiplexed, DemuxReport), PipelineError> {
    demultiplex(&read_to_string(path)?, policy)
}
