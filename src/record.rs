//! Participant records as stored by the experiment server
//!
//! Each record carries a `datastring` JSON document with three sections:
//!
//! ```text
//! {
//!   "data":         [{"current_trial": 0, "dateTime": 1700000000000, "trialdata": {...}}, ...],
//!   "eventdata":    [{"eventtype": "resize", "value": [800, 600], "interval": 0, "timestamp": ...}, ...],
//!   "questiondata": {"bonus": "1.50", ...}
//! }
//! ```
//!
//! The log accessors render one section as a header-less CSV blob whose first
//! column is the raw participant id.

use crate::error::ExtractionError;
use crate::table::{render_rows, LongRecord};
use serde_json::{json, Map, Value};
use std::fmt;

/// `completion_status` value of a participant who finished the task.
pub const STATUS_COMPLETED: i64 = 3;

/// Substring marking sessions created while testing the experiment.
pub const DEBUG_MARKER: &str = "debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Trial,
    Event,
    Question,
}

impl ExportKind {
    pub fn all() -> [ExportKind; 3] {
        [ExportKind::Trial, ExportKind::Event, ExportKind::Question]
    }

    /// File stem of the raw export for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Trial => "trialdata",
            ExportKind::Event => "eventdata",
            ExportKind::Question => "questiondata",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.as_str())
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One participant session fetched from the record store. Read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRecord {
    /// `"<operator_id>:<session_id>"`
    pub id: String,
    pub completion_status: i64,
    pub condition: Option<i64>,
    pub counterbalance: Option<i64>,
    pub datastring: Option<String>,
}

impl ParticipantRecord {
    pub fn is_completed(&self) -> bool {
        self.completion_status == STATUS_COMPLETED
    }

    pub fn is_debug(&self) -> bool {
        self.id.contains(DEBUG_MARKER)
    }

    /// Dispatches to the log accessor for `kind`.
    pub fn log(&self, kind: ExportKind) -> Result<String, ExtractionError> {
        match kind {
            ExportKind::Trial => self.trial_log(),
            ExportKind::Event => self.event_log(),
            ExportKind::Question => self.question_log(),
        }
    }

    /// Rows `(id, current_trial, dateTime, trialdata-json)`.
    pub fn trial_log(&self) -> Result<String, ExtractionError> {
        let Some(doc) = self.document()? else {
            return Ok(String::new());
        };
        let entries = section_array(&doc, "data")?;

        let mut rows = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let entry = entry_object("data", index, entry)?;
            let current_trial = required_field("data", index, entry, "current_trial")?;
            let date_time = required_field("data", index, entry, "dateTime")?;
            let trialdata = required_field("data", index, entry, "trialdata")?;

            rows.push(LongRecord::new(
                &self.id,
                vec![
                    scalar_text(current_trial),
                    scalar_text(date_time),
                    trialdata.to_string(),
                ],
            ));
        }
        render_rows(&rows)
    }

    /// Rows `(id, position, timestamp, {eventtype, value, interval}-json)`.
    pub fn event_log(&self) -> Result<String, ExtractionError> {
        let Some(doc) = self.document()? else {
            return Ok(String::new());
        };
        let entries = section_array(&doc, "eventdata")?;

        let mut rows = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let entry = entry_object("eventdata", index, entry)?;
            let eventtype = required_field("eventdata", index, entry, "eventtype")?;
            let timestamp = required_field("eventdata", index, entry, "timestamp")?;
            let payload = json!({
                "eventtype": eventtype,
                "value": entry.get("value").cloned().unwrap_or(Value::Null),
                "interval": entry.get("interval").cloned().unwrap_or(Value::Null),
            });

            rows.push(LongRecord::new(
                &self.id,
                vec![index.to_string(), scalar_text(timestamp), payload.to_string()],
            ));
        }
        render_rows(&rows)
    }

    /// Rows `(id, key, value)`.
    pub fn question_log(&self) -> Result<String, ExtractionError> {
        let Some(doc) = self.document()? else {
            return Ok(String::new());
        };
        let questions = doc
            .get("questiondata")
            .and_then(Value::as_object)
            .ok_or(ExtractionError::MissingSection("questiondata"))?;

        let rows: Vec<LongRecord> = questions
            .iter()
            .map(|(key, value)| LongRecord::new(&self.id, vec![key.clone(), scalar_text(value)]))
            .collect();
        render_rows(&rows)
    }

    /// Parsed datastring, or `None` for a participant who never submitted data.
    fn document(&self) -> Result<Option<Value>, ExtractionError> {
        match self.datastring.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(ExtractionError::InvalidDatastring),
        }
    }
}

/// Text of a JSON value as it should appear in a CSV cell.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn section_array<'a>(doc: &'a Value, section: &'static str) -> Result<&'a Vec<Value>, ExtractionError> {
    doc.get(section)
        .and_then(Value::as_array)
        .ok_or(ExtractionError::MissingSection(section))
}

fn entry_object<'a>(
    section: &'static str,
    index: usize,
    entry: &'a Value,
) -> Result<&'a Map<String, Value>, ExtractionError> {
    entry.as_object().ok_or_else(|| ExtractionError::MalformedEntry {
        section,
        index,
        reason: "not a JSON object".to_string(),
    })
}

fn required_field<'a>(
    section: &'static str,
    index: usize,
    entry: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a Value, ExtractionError> {
    entry.get(field).ok_or_else(|| ExtractionError::MalformedEntry {
        section,
        index,
        reason: format!("missing '{}'", field),
    })
}
