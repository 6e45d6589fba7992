//! Raw export assembly
//!
//! ```text
//! RecordSource::fetch → debug filter → per-kind extraction (+ metadata)
//!     ↓
//! concatenate blobs in fetch order
//!     ↓
//! anonymize column 0 of the assembled table
//!     ↓
//! trialdata.csv / eventdata.csv / questiondata.csv / identifiers.csv
//! ```

use super::enrich::append_metadata;
use crate::anonymizer::Anonymizer;
use crate::error::{ConfigError, ExtractionFailure, PipelineError};
use crate::identifiers::{self, IdentifierExport};
use crate::record::{ExportKind, ParticipantRecord};
use crate::source::RecordSource;
use crate::table::{parse_rows, render_table, write_atomic};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// What to do when one record cannot be extracted for one export kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log, record the failure and leave the record out of that export only.
    #[default]
    CollectAndContinue,
    /// Abort the run on the first failure.
    FailFast,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" | "collect" => Ok(FailurePolicy::CollectAndContinue),
            "fail-fast" | "failfast" => Ok(FailurePolicy::FailFast),
            _ => Err(ConfigError::InvalidValue {
                name: "TRIALFLOW_FAILURE_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct AggregationReport {
    pub fetched: usize,
    pub completed: usize,
    pub debug_dropped: usize,
    pub rows: HashMap<ExportKind, usize>,
    pub failures: Vec<ExtractionFailure>,
}

impl AggregationReport {
    pub fn rows_for(&self, kind: ExportKind) -> usize {
        self.rows.get(&kind).copied().unwrap_or(0)
    }
}

/// Anonymized export bodies, fully assembled in memory.
#[derive(Debug, Clone, Default)]
pub struct RawExports {
    pub trialdata: String,
    pub eventdata: String,
    pub questiondata: String,
    pub identifiers: IdentifierExport,
}

impl RawExports {
    pub fn body(&self, kind: ExportKind) -> &str {
        match kind {
            ExportKind::Trial => &self.trialdata,
            ExportKind::Event => &self.eventdata,
            ExportKind::Question => &self.questiondata,
        }
    }

    fn body_mut(&mut self, kind: ExportKind) -> &mut String {
        match kind {
            ExportKind::Trial => &mut self.trialdata,
            ExportKind::Event => &mut self.eventdata,
            ExportKind::Question => &mut self.questiondata,
        }
    }

    /// Writes the three raw exports and `identifiers.csv` into `dir`.
    pub fn persist(&self, dir: &Path) -> Result<(), PipelineError> {
        for kind in ExportKind::all() {
            let path = dir.join(kind.file_name());
            write_atomic(&path, self.body(kind).as_bytes())?;
            log::info!("📝 Wrote {}", path.display());
        }

        let path = dir.join(identifiers::FILE_NAME);
        write_atomic(&path, self.identifiers.render()?.as_bytes())?;
        log::info!(
            "📝 Wrote {} ({} operators)",
            path.display(),
            self.identifiers.len()
        );
        Ok(())
    }
}

/// Extracts one record's contribution to one export.
pub fn extract(record: &ParticipantRecord, kind: ExportKind) -> Result<String, ExtractionFailure> {
    let blob = match kind {
        ExportKind::Question => record
            .question_log()
            .and_then(|blob| append_metadata(blob, record)),
        other => record.log(other),
    };

    blob.map_err(|source| ExtractionFailure {
        record_id: record.id.clone(),
        kind,
        source,
    })
}

/// Rewrites column 0 of an assembled header-less table through the anonymizer.
pub fn anonymize_body(body: &str, anonymizer: &mut Anonymizer) -> Result<(String, usize), PipelineError> {
    let mut rows = parse_rows(body)?;
    for row in rows.iter_mut() {
        if let Some(subject) = row.first_mut() {
            *subject = anonymizer.pseudonymize(subject)?;
        }
    }
    let count = rows.len();
    Ok((render_table(None, &rows)?, count))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordAggregator {
    policy: FailurePolicy,
}

impl RecordAggregator {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    /// Fetches `version` from `source` and builds the anonymized raw exports.
    ///
    /// `anonymizer` is owned by the caller for the duration of one run; the
    /// identifier export reflects everything it has seen.
    pub fn aggregate(
        &self,
        source: &dyn RecordSource,
        version: &str,
        include_debug_sessions: bool,
        anonymizer: &mut Anonymizer,
    ) -> Result<(RawExports, AggregationReport), PipelineError> {
        let mut report = AggregationReport::default();

        log::info!("🔌 Fetching version {} from {} store", version, source.backend_type());
        let mut records = source.fetch(version)?;

        if !include_debug_sessions {
            let before = records.len();
            records.retain(|r| !r.is_debug());
            report.debug_dropped = before - records.len();
        }

        report.fetched = records.len();
        report.completed = records.iter().filter(|r| r.is_completed()).count();
        log::info!(
            "{} participants, {} completed",
            report.fetched,
            report.completed
        );
        if report.debug_dropped > 0 {
            log::info!("   └─ {} debug sessions dropped", report.debug_dropped);
        }

        let mut exports = RawExports::default();

        for kind in ExportKind::all() {
            let mut blobs = Vec::with_capacity(records.len());

            for record in &records {
                match extract(record, kind) {
                    Ok(blob) => blobs.push(blob),
                    Err(failure) => match self.policy {
                        FailurePolicy::FailFast => return Err(failure.into()),
                        FailurePolicy::CollectAndContinue => {
                            log::warn!("⚠️  Skipping record: {}", failure);
                            report.failures.push(failure);
                        }
                    },
                }
            }

            let (body, row_count) = anonymize_body(&blobs.concat(), anonymizer)?;
            log::info!("   ├─ {}: {} rows", kind, row_count);
            *exports.body_mut(kind) = body;
            report.rows.insert(kind, row_count);
        }

        exports.identifiers = IdentifierExport::from_anonymizer(anonymizer);

        if !report.failures.is_empty() {
            log::warn!(
                "⚠️  {} extraction failures were skipped",
                report.failures.len()
            );
        }

        Ok((exports, report))
    }
}
