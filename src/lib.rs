//! trialflow - psiTurk-style experiment data pipeline
//!
//! Fetches participant records for one experiment version, replaces operator
//! ids with stable pseudonyms, writes raw long-format exports, then reshapes
//! them into per-trial-type datasets, a wide participant table and the bonus
//! payment file.

pub mod aggregate;
pub mod anonymizer;
pub mod config;
pub mod error;
pub mod identifiers;
pub mod pipeline;
pub mod record;
pub mod reshape;
pub mod source;
pub mod table;

pub use anonymizer::Anonymizer;
pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::{run, run_with_source, RunOptions, RunSummary};
pub use record::{ExportKind, ParticipantRecord};
pub use source::{RecordSource, SqliteRecordSource};
