//! Bonus Extractor - payment authorization export
//!
//! Joins the identifier key with the `bonus` column of the participant table.
//! The output carries real operator ids and no pseudonyms, because it feeds
//! the payment workflow rather than analysis.

use super::pivot::WideTable;
use crate::error::PipelineError;
use crate::identifiers::IdentifierExport;
use crate::table::{render_records, write_atomic};
use serde::Serialize;
use std::path::Path;

pub const BONUS_COLUMN: &str = "bonus";

/// Serialized field order is the column order of `bonus.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BonusRow {
    pub operator_id: String,
    pub bonus: String,
}

/// One row per operator with a non-empty bonus, in identifier-export order.
pub fn extract_bonus(identifiers: &IdentifierExport, wide: &WideTable) -> Vec<BonusRow> {
    identifiers
        .pairs()
        .iter()
        .filter_map(|(operator, pseudonym)| {
            wide.get(pseudonym, BONUS_COLUMN)
                .map(str::trim)
                .filter(|bonus| !bonus.is_empty())
                .map(|bonus| BonusRow {
                    operator_id: operator.clone(),
                    bonus: bonus.to_string(),
                })
        })
        .collect()
}

/// Header-less `operator_id,bonus` CSV.
pub fn render_bonus(rows: &[BonusRow]) -> Result<String, csv::Error> {
    render_records(rows)
}

pub fn persist_bonus(path: &Path, rows: &[BonusRow]) -> Result<(), PipelineError> {
    write_atomic(path, render_bonus(rows)?.as_bytes())?;
    log::info!("💰 Wrote {} ({} bonuses)", path.display(), rows.len());
    Ok(())
}
