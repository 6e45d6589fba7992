//! Metadata enrichment for the question export
//!
//! Condition, counterbalance and status live on the participant record, not in
//! the question log. They are appended as ordinary `(subject, key, value)`
//! facts so the pivoted participant table picks them up as columns.

use crate::error::ExtractionError;
use crate::record::ParticipantRecord;
use crate::table::{render_rows, LongRecord};

fn optional(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// The synthesized `condition`, `counterbalance` and `status` facts.
pub fn metadata_rows(record: &ParticipantRecord) -> Vec<LongRecord> {
    [
        ("condition", optional(record.condition)),
        ("counterbalance", optional(record.counterbalance)),
        ("status", record.completion_status.to_string()),
    ]
    .into_iter()
    .map(|(key, value)| LongRecord::new(&record.id, vec![key.to_string(), value]))
    .collect()
}

/// Appends the metadata facts to an extracted question log.
pub fn append_metadata(mut blob: String, record: &ParticipantRecord) -> Result<String, ExtractionError> {
    if !blob.is_empty() && !blob.ends_with('\n') {
        return Err(ExtractionError::UnterminatedBlob);
    }
    blob.push_str(&render_rows(&metadata_rows(record))?);
    Ok(blob)
}
