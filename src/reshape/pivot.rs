//! Attribute Pivoter - long `(wid, key, value)` facts to one row per participant
//!
//! Rows are sorted by pseudonym and columns by key name, so
//! `participants.csv` is byte-stable for a given question export.

use crate::error::{ConfigError, PipelineError, PivotError};
use crate::table::{parse_rows, read_to_string, render_table, write_atomic};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

pub const PARTICIPANTS_FILE: &str = "participants.csv";
const INDEX_COLUMN: &str = "wid";

/// How to treat a `(wid, key)` pair that occurs more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail with `DuplicateKey`.
    #[default]
    Reject,
    /// Keep the value from the row that appears last in the export.
    LastWriteWins,
}

impl FromStr for DuplicatePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(DuplicatePolicy::Reject),
            "last" | "last-write-wins" => Ok(DuplicatePolicy::LastWriteWins),
            _ => Err(ConfigError::InvalidValue {
                name: "TRIALFLOW_PIVOT_DUPLICATES",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WideTable {
    columns: BTreeSet<String>,
    rows: BTreeMap<String, BTreeMap<String, String>>,
}

impl WideTable {
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, subject: &str, key: &str) -> Option<&str> {
        self.rows
            .get(subject)
            .and_then(|row| row.get(key))
            .map(String::as_str)
    }

    pub fn render(&self) -> Result<String, csv::Error> {
        let header: Vec<String> = std::iter::once(INDEX_COLUMN.to_string())
            .chain(self.columns.iter().cloned())
            .collect();

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|(subject, values)| {
                std::iter::once(subject.clone())
                    .chain(
                        self.columns
                            .iter()
                            .map(|c| values.get(c).cloned().unwrap_or_default()),
                    )
                    .collect()
            })
            .collect();

        render_table(Some(header.as_slice()), &cells)
    }

    pub fn persist(&self, path: &Path) -> Result<(), PipelineError> {
        write_atomic(path, self.render()?.as_bytes())?;
        log::info!(
            "📝 Wrote {} ({} participants × {} keys)",
            path.display(),
            self.rows.len(),
            self.columns.len()
        );
        Ok(())
    }
}

/// Pivots parsed question rows.
pub fn pivot(rows: &[Vec<String>], policy: DuplicatePolicy) -> Result<WideTable, PivotError> {
    let mut table = WideTable::default();

    for (idx, row) in rows.iter().enumerate() {
        let [subject, key, value] = row.as_slice() else {
            return Err(PivotError::ColumnCount {
                row: idx + 1,
                found: row.len(),
            });
        };

        let values = table.rows.entry(subject.clone()).or_default();
        let previous = values.insert(key.clone(), value.clone());

        if previous.is_some() {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(PivotError::DuplicateKey {
                        subject: subject.clone(),
                        key: key.clone(),
                    })
                }
                DuplicatePolicy::LastWriteWins => {
                    log::warn!("⚠️  Duplicate '{}' for {}, keeping the later value", key, subject);
                }
            }
        }

        if !table.columns.contains(key) {
            table.columns.insert(key.clone());
        }
    }

    Ok(table)
}

/// Pivots a header-less `questiondata.csv` body.
pub fn pivot_body(body: &str, policy: DuplicatePolicy) -> Result<WideTable, PipelineError> {
    let rows = parse_rows(body)?;
    let table = pivot(&rows, policy)?;
    log::info!(
        "🔄 Pivoted {} question rows into {} participants",
        rows.len(),
        table.len()
    );
    Ok(table)
}

pub fn pivot_file(path: &Path, policy: DuplicatePolicy) -> Result<WideTable, PipelineError> {
    pivot_body(&read_to_string(path)?, policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(raw: &[(&str, &str, &str)]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|(s, k, v)| vec![s.to_string(), k.to_string(), v.to_string()])
            .collect()
    }

    #[test]
    fn test_pivot_fills_missing_cells() {
        let table = pivot(
            &rows(&[
                ("p1", "bonus", "1.5"),
                ("p1", "condition", "A"),
                ("p2", "bonus", "2.0"),
            ]),
            DuplicatePolicy::Reject,
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("p1", "bonus"), Some("1.5"));
        assert_eq!(table.get("p2", "bonus"), Some("2.0"));
        assert_eq!(table.get("p1", "condition"), Some("A"));
        assert_eq!(table.get("p2", "condition"), None);

        assert_eq!(
            table.render().unwrap(),
            "wid,bonus,condition\np1,1.5,A\np2,2.0,\n"
        );
    }

    #[test]
    fn test_rows_and_columns_sorted() {
        let table = pivot(
            &rows(&[("wz", "zeta", "1"), ("wa", "alpha", "2"), ("wz", "alpha", "3")]),
            DuplicatePolicy::Reject,
        )
        .unwrap();

        assert_eq!(table.subjects().collect::<Vec<_>>(), vec!["wa", "wz"]);
        assert_eq!(table.columns().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = pivot(
            &rows(&[("p1", "bonus", "1"), ("p1", "bonus", "2")]),
            DuplicatePolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(
            err,
            PivotError::DuplicateKey {
                subject: "p1".to_string(),
                key: "bonus".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_last_write_wins() {
        let table = pivot(
            &rows(&[("p1", "bonus", "1"), ("p1", "bonus", "2")]),
            DuplicatePolicy::LastWriteWins,
        )
        .unwrap();
        assert_eq!(table.get("p1", "bonus"), Some("2"));
    }

    #[test]
    fn test_wrong_width_rejected() {
        let bad = vec![vec!["p1".to_string(), "bonus".to_string()]];
        assert_eq!(
            pivot(&bad, DuplicatePolicy::Reject).unwrap_err(),
            PivotError::ColumnCount { row: 1, found: 2 }
        );
    }

    #[test]
    fn test_pivot_body_handles_quoted_values() {
        let table = pivot_body("w1,comment,\"hard, but fun\"\n", DuplicatePolicy::Reject).unwrap();
        assert_eq!(table.get("w1", "comment"), Some("hard, but fun"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("last".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::LastWriteWins);
        assert_eq!("REJECT".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Reject);
        assert!("first".parse::<DuplicatePolicy>().is_err());
    }
}
