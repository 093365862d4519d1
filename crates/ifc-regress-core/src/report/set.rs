//! Ordered result collection, persisted as the CSV report.

use super::schema::{self, HeaderMismatch, SchemaVersion};
use crate::errors::ReportError;
use crate::model::{Outcome, ResultRecord};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Records in processing order. Duplicated file names are kept as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    records: Vec<ResultRecord>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pass/fail state this set holds for `record`'s file.
    ///
    /// Looks up the first record with the same [`schema::file_key`]; there
    /// is no path normalisation beyond that, so keys must be stable between
    /// runs.
    pub fn compare(&self, record: &ResultRecord) -> Outcome {
        let key = schema::file_key(&record.file_name);
        self.records
            .iter()
            .find(|r| schema::file_key(&r.file_name) == key)
            .map(ResultRecord::outcome)
            .unwrap_or(Outcome::NoPriorData)
    }

    /// Load a report. Only failing to open the file is an error; format
    /// problems are logged and yield an empty or partial set.
    pub fn load_from_file(path: &Path) -> Result<Self, ReportError> {
        let file = File::open(path).map_err(|source| ReportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::read_from(
            BufReader::new(file),
            &path.display().to_string(),
        ))
    }

    pub fn read_from<R: BufRead>(reader: R, source: &str) -> Self {
        let mut set = ResultSet::new();
        let mut lines = reader.split(b'\n');

        let header = match lines.next() {
            Some(Ok(bytes)) => line_text(&bytes),
            Some(Err(e)) => {
                warn!(report = source, error = %e, "cannot read report header");
                return set;
            }
            None => {
                warn!(report = source, "report is empty");
                return set;
            }
        };

        match schema::detect_schema(&header) {
            Ok(SchemaVersion::V2) => {}
            Ok(SchemaVersion::V1Legacy) => {
                debug!(report = source, "reading legacy report layout");
            }
            Err(HeaderMismatch::ColumnCount(found)) => {
                warn!(
                    report = source,
                    expected = schema::COLUMN_COUNT,
                    found,
                    "incorrect number of report columns; ignoring report"
                );
                return set;
            }
            Err(HeaderMismatch::UnknownColumns) => {
                warn!(
                    report = source,
                    "unsupported report format (unknown column names); ignoring report"
                );
                return set;
            }
        }

        for (idx, line) in lines.enumerate() {
            let row = idx + 1;
            let bytes = match line {
                Ok(b) => b,
                Err(e) => {
                    warn!(report = source, row, error = %e, "stopped reading report");
                    break;
                }
            };
            let text = line_text(&bytes);
            if text.trim().is_empty() {
                continue;
            }
            match schema::decode_row(&text) {
                Ok(record) => set.push(record),
                Err(cells) => {
                    warn!(
                        report = source,
                        row,
                        cells,
                        "cannot read report row: expected {} cells",
                        schema::COLUMN_COUNT
                    );
                }
            }
        }
        set
    }

    /// Write the report: header, one row per record in set order, flush.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ReportError> {
        let write = || -> std::io::Result<()> {
            let file = File::create(path)?;
            self.write_to(BufWriter::new(file))
        };
        write().map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "{}", schema::header_line())?;
        for record in &self.records {
            writeln!(w, "{}", schema::encode_row(record))?;
        }
        w.flush()
    }
}

fn line_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ResultRecord;
    type IntoIter = std::slice::Iter<'a, ResultRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<ResultRecord> for ResultSet {
    fn from_iter<I: IntoIterator<Item = ResultRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
