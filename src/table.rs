//! Long-format rows and CSV plumbing shared by every export
//!
//! Raw exports are header-less, comma-separated UTF-8 with `\n` terminators.
//! Every file goes through [`write_atomic`] so a reader never sees a
//! half-written export.

use crate::error::{ExtractionError, PipelineError};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// One long-format fact: the subject id followed by kind-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongRecord {
    pub subject: String,
    pub fields: Vec<String>,
}

impl LongRecord {
    pub fn new(subject: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            fields,
        }
    }

    fn cells(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.subject.as_str()).chain(self.fields.iter().map(String::as_str))
    }
}

fn writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, csv::Error> {
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Renders rows as a header-less CSV blob, one line per row.
pub fn render_rows(rows: &[LongRecord]) -> Result<String, ExtractionError> {
    let mut w = writer();
    for row in rows {
        w.write_record(row.cells())?;
    }
    Ok(finish(w)?)
}

/// Renders an arbitrary table, optionally preceded by a header row.
pub fn render_table(header: Option<&[String]>, rows: &[Vec<String>]) -> Result<String, csv::Error> {
    let mut w = writer();
    if let Some(header) = header {
        w.write_record(header)?;
    }
    for row in rows {
        w.write_record(row)?;
    }
    finish(w)
}

/// Renders serializable rows as a header-less CSV blob, one line per row.
pub fn render_records<T: Serialize>(rows: &[T]) -> Result<String, csv::Error> {
    let mut w = writer();
    for row in rows {
        w.serialize(row)?;
    }
    finish(w)
}

/// Parses a header-less CSV body. Rows may have differing widths.
pub fn parse_rows(body: &str) -> Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

pub fn read_to_string(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))
}

/// Writes `contents` to a sibling temp file, then renames it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = fs::File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp_path, path));

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(PipelineError::io(path, e));
    }

    log::debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_render_quotes_embedded_json() {
        let rows = vec![LongRecord::new(
            "w1234567",
            vec!["0".into(), "17".into(), r#"{"a":1,"b":"x"}"#.into()],
        )];
        let blob = render_rows(&rows).unwrap();
        assert_eq!(blob, "w1234567,0,17,\"{\"\"a\"\":1,\"\"b\"\":\"\"x\"\"}\"\n");

        let parsed = parse_rows(&blob).unwrap();
        assert_eq!(parsed[0][3], r#"{"a":1,"b":"x"}"#);
    }

    #[test]
    fn test_parse_empty_body() {
        assert!(parse_rows("").unwrap().is_empty());
    }

    #[test]
    fn test_render_table_with_header() {
        let header = vec!["workerid".to_string(), "wid".to_string()];
        let rows = vec![vec!["op1".to_string(), "wabcdef0".to_string()]];
        assert_eq!(
            render_table(Some(header.as_slice()), &rows).unwrap(),
            "workerid,wid\nop1,wabcdef0\n"
        );
    }

    #[derive(Serialize)]
    struct Payout {
        worker: String,
        sessions: u32,
    }

    #[test]
    fn test_render_records_without_header() {
        let rows = vec![
            Payout {
                worker: "A1, B2".to_string(),
                sessions: 2,
            },
            Payout {
                worker: "C3".to_string(),
                sessions: 1,
            },
        ];
        assert_eq!(render_records(&rows).unwrap(), "\"A1, B2\",2\nC3,1\n");
        assert_eq!(render_records::<Payout>(&[]).unwrap(), "");
    }

    #[test]
    fn test_write_atomic_creates_parents_and_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out/file.csv");

        write_atomic(&path, b"first\n").unwrap();
        write_atomic(&path, b"second\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        assert!(!path.with_file_name("file.csv.tmp").exists());
    }
}
