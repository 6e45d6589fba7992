//! `identifiers.csv`: the operator id → pseudonym key
//!
//! This is the only file that links pseudonyms back to real operators. It is
//! written next to the raw exports and never copied into the reshaped data.

use crate::anonymizer::Anonymizer;
use crate::error::PipelineError;
use crate::table::{parse_rows, render_table};

pub const FILE_NAME: &str = "identifiers.csv";
const HEADER: [&str; 2] = ["workerid", "wid"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierExport {
    /// `(operator_id, pseudonym)` in first-seen order.
    pairs: Vec<(String, String)>,
}

impl IdentifierExport {
    pub fn from_anonymizer(anonymizer: &Anonymizer) -> Self {
        Self {
            pairs: anonymizer.mapping().to_vec(),
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn render(&self) -> Result<String, csv::Error> {
        let header: Vec<String> = HEADER.iter().map(|h| h.to_string()).collect();
        let rows: Vec<Vec<String>> = self
            .pairs
            .iter()
            .map(|(operator, pseudonym)| vec![operator.clone(), pseudonym.clone()])
            .collect();
        render_table(Some(header.as_slice()), &rows)
    }

    /// Parses a previously written `identifiers.csv`, header included.
    pub fn parse(body: &str) -> Result<Self, PipelineError> {
        let mut rows = parse_rows(body)?.into_iter();

        match rows.next() {
            None => return Ok(Self::default()),
            Some(header) if header == HEADER => {}
            Some(header) => {
                return Err(PipelineError::MalformedExport(format!(
                    "unexpected {} header '{}'",
                    FILE_NAME,
                    header.join(",")
                )))
            }
        }

        let mut pairs = Vec::new();
        for (idx, row) in rows.enumerate() {
            match <[String; 2]>::try_from(row) {
                Ok([operator, pseudonym]) => pairs.push((operator, pseudonym)),
                Err(row) => {
                    return Err(PipelineError::MalformedExport(format!(
                        "{} row {} has {} columns",
                        FILE_NAME,
                        idx + 2,
                        row.len()
                    )))
                }
            }
        }
        Ok(Self { pairs })
    }
}
