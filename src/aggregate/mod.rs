//! Record Aggregator - raw long-format exports
//!
//! Pulls participant records for one experiment version, extracts the trial,
//! event and question logs, appends participant metadata to the question log
//! and writes anonymized, header-less CSV exports plus the identifier key.

pub mod aggregator;
pub mod enrich;

pub use aggregator::{
    anonymize_body, extract, AggregationReport, FailurePolicy, RawExports, RecordAggregator,
};
pub use enrich::{append_metadata, metadata_rows};
