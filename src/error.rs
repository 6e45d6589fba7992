//! Error types for every stage of the fetch → anonymize → reshape pipeline

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::record::ExportKind;

/// Raised when a participant id cannot be split into operator and session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnonymizeError {
    #[error("malformed participant identifier '{0}': expected '<operator_id>:<session_id>'")]
    MalformedIdentifier(String),
}

/// Failures talking to the participant record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store is unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("record store query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Why one record's log could not be turned into rows for one export.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("datastring is not valid JSON: {0}")]
    InvalidDatastring(#[source] serde_json::Error),
    #[error("datastring has no '{0}' section")]
    MissingSection(&'static str),
    #[error("entry {index} of '{section}' is malformed: {reason}")]
    MalformedEntry {
        section: &'static str,
        index: usize,
        reason: String,
    },
    #[error("question log does not end with a line terminator")]
    UnterminatedBlob,
    #[error("failed to render rows: {0}")]
    Render(#[from] csv::Error),
}

/// One record × export-kind failure kept in the aggregation report.
#[derive(Debug, Error)]
#[error("{kind} extraction failed for '{record_id}': {source}")]
pub struct ExtractionFailure {
    pub record_id: String,
    pub kind: ExportKind,
    #[source]
    pub source: ExtractionError,
}

/// Why a single trial row could not be demultiplexed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("expected 4 columns, found {0}")]
    ColumnCount(usize),
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no string 'trial_type' field")]
    MissingTrialType,
    #[error("survey 'responses' field is missing or not a JSON object")]
    InvalidResponses,
}

/// One skipped row kept in the demultiplex report.
#[derive(Debug, Error)]
#[error("trial row {row} skipped: {source}")]
pub struct DecodeFailure {
    /// 1-based row number within the trial export.
    pub row: usize,
    #[source]
    pub source: DecodeError,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PivotError {
    #[error("duplicate value for subject '{subject}' and key '{key}'")]
    DuplicateKey { subject: String, key: String },
    #[error("question row {row} has {found} columns, expected 3")]
    ColumnCount { row: usize, found: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no experiment version given and none found in {0}")]
    MissingVersion(PathBuf),
    #[error("no record store location: set DATABASE_URL or create {0}")]
    MissingDatabaseUrl(PathBuf),
    #[error("invalid configuration value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Umbrella error returned by the pipeline entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Anonymize(#[from] AnonymizeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),
    #[error(transparent)]
    Decode(#[from] DecodeFailure),
    #[error(transparent)]
    Pivot(#[from] PivotError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed export: {0}")]
    MalformedExport(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the run failed because the record store could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, PipelineError::Store(StoreError::Unavailable { .. }))
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
