//! End-to-end run: fetch → anonymize → reshape
//!
//! ```text
//! RecordSource → RecordAggregator(&mut Anonymizer) → data/human_raw/<version>/
//!     trialdata.csv ─→ demultiplex ─→ data/human/<version>/{trials,learn_rewards,calibration}.json, survey.csv
//!     questiondata.csv ─→ pivot ─→ data/human/<version>/participants.csv
//!     identifiers.csv + participants ─→ extract_bonus ─→ bonus.csv
//! ```
//!
//! With `nofetch` only the reshaping half runs, against raw exports already
//! on disk.

use crate::aggregate::{AggregationReport, RecordAggregator};
use crate::anonymizer::Anonymizer;
use crate::config::Config;
use crate::error::PipelineError;
use crate::identifiers::{self, IdentifierExport};
use crate::record::ExportKind;
use crate::reshape::{demultiplex_file, extract_bonus, persist_bonus, pivot_file, DemuxReport};
use crate::reshape::pivot::PARTICIPANTS_FILE;
use crate::source::{RecordSource, SqliteRecordSource};
use crate::table::read_to_string;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub version: String,
    /// Skip the fetch and reshape the raw exports already on disk.
    pub nofetch: bool,
    /// Keep sessions whose id carries the debug marker.
    pub include_debug_sessions: bool,
}

#[derive(Debug, Default)]
pub struct ReshapeSummary {
    pub demux: DemuxReport,
    pub participants: usize,
    pub bonuses: usize,
}

#[derive(Debug)]
pub struct RunSummary {
    /// `None` when the fetch was skipped.
    pub aggregation: Option<AggregationReport>,
    pub reshape: ReshapeSummary,
}

/// Fetches one version from `source` and persists the raw exports.
pub fn fetch(
    config: &Config,
    source: &dyn RecordSource,
    version: &str,
    include_debug_sessions: bool,
) -> Result<AggregationReport, PipelineError> {
    let mut anonymizer = Anonymizer::new();
    let (exports, report) = RecordAggregator::new(config.failure_policy).aggregate(
        source,
        version,
        include_debug_sessions,
        &mut anonymizer,
    )?;

    exports.persist(&config.raw_dir(version))?;
    Ok(report)
}

/// Rebuilds the analysis-ready datasets and `bonus.csv` from the raw exports.
pub fn reshape(config: &Config, version: &str) -> Result<ReshapeSummary, PipelineError> {
    let raw_dir = config.raw_dir(version);
    let out_dir = config.reshaped_dir(version);
    log::info!("🔧 Reshaping {} → {}", raw_dir.display(), out_dir.display());

    let (datasets, demux) =
        demultiplex_file(&raw_dir.join(ExportKind::Trial.file_name()), config.failure_policy)?;
    datasets.persist(&out_dir)?;

    let participants = pivot_file(
        &raw_dir.join(ExportKind::Question.file_name()),
        config.duplicate_policy,
    )?;
    participants.persist(&out_dir.join(PARTICIPANTS_FILE))?;

    let identifiers = IdentifierExport::parse(&read_to_string(&raw_dir.join(identifiers::FILE_NAME))?)?;
    let bonuses = extract_bonus(&identifiers, &participants);
    persist_bonus(&config.bonus_path, &bonuses)?;

    Ok(ReshapeSummary {
        demux,
        participants: participants.len(),
        bonuses: bonuses.len(),
    })
}

/// Runs the pipeline against an explicit record source.
pub fn run_with_source(
    config: &Config,
    options: &RunOptions,
    source: &dyn RecordSource,
) -> Result<RunSummary, PipelineError> {
    let aggregation = if options.nofetch {
        log::info!("⏭️  Skipping fetch, reusing raw exports");
        None
    } else {
        Some(fetch(
            config,
            source,
            &options.version,
            options.include_debug_sessions,
        )?)
    };

    Ok(RunSummary {
        aggregation,
        reshape: reshape(config, &options.version)?,
    })
}

/// Runs the pipeline against the configured SQLite store.
///
/// If the store cannot be reached the cached store location is dropped, so the
/// next invocation resolves it again, and the run aborts.
pub fn run(config: &Config, options: &RunOptions) -> Result<RunSummary, PipelineError> {
    if options.nofetch {
        return Ok(RunSummary {
            aggregation: None,
            reshape: reshape(config, &options.version)?,
        });
    }

    let locator = config.locator();
    let fetched = locator
        .resolve()
        .map_err(PipelineError::from)
        .and_then(|url| Ok(SqliteRecordSource::from_url(&url, config.table.clone())?))
        .and_then(|source| fetch(config, &source, &options.version, options.include_debug_sessions));

    let aggregation = match fetched {
        Err(e) if e.is_store_unavailable() => {
            log::error!("❌ Cannot access the record store. Resetting the cached store location; please try again.");
            if let Err(io) = locator.invalidate() {
                log::warn!(
                    "Failed to remove {}: {}",
                    locator.cache_path().display(),
                    io
                );
            }
            return Err(e);
        }
        other => other?,
    };

    Ok(RunSummary {
        aggregation: Some(aggregation),
        reshape: reshape(config, &options.version)?,
    })
}
