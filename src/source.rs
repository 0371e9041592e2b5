use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::ReductionError;
use crate::record::{RawRecord, SCOPE_COLUMNS};

/// Lines of scope metadata preceding the samples.
pub const HEADER_LINES: usize = 2;
/// Sample index column followed by the nine data columns.
pub const SCOPE_FIELDS: usize = 1 + SCOPE_COLUMNS.len();

/// Something that can hand over one shot's raw record.
pub trait RecordSource {
    fn load(&mut self) -> Result<RawRecord, ReductionError>;
}

/// Comma-delimited export written by the scope software.
pub struct ScopeCsvFile {
    path: PathBuf,
}

impl ScopeCsvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for ScopeCsvFile {
    fn load(&mut self) -> Result<RawRecord, ReductionError> {
        log::debug!("reading scope record from {}", self.path.display());
        let file = File::open(&self.path)?;
        parse_scope_csv(file)
    }
}

/// In-memory source useful for tests and replaying already parsed shots.
pub struct ManualRecord {
    record: Option<RawRecord>,
}

impl ManualRecord {
    pub fn new(record: RawRecord) -> Self {
        Self {
            record: Some(record),
        }
    }
}

impl RecordSource for ManualRecord {
    fn load(&mut self) -> Result<RawRecord, ReductionError> {
        self.record.take().ok_or(ReductionError::TooFewRows {
            required: 1,
            actual: 0,
        })
    }
}

fn parse_field(raw: &str, line: u64, column: usize) -> Result<f64, ReductionError> {
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| ReductionError::NonNumeric {
        line,
        column,
        value: raw.to_string(),
    })
}

/// Parse a scope export: two header lines, then rows of
/// `index, trigger, sensor_a, sensor_b, diode, aux1..aux4, timestamp_ps`.
/// Empty cells become NaN.
pub fn parse_scope_csv<R: Read>(reader: R) -> Result<RawRecord, ReductionError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut values = Vec::new();
    let mut rows = 0;
    for record in csv_reader.records().skip(HEADER_LINES) {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() < SCOPE_FIELDS {
            return Err(ReductionError::ColumnCount {
                line,
                expected: SCOPE_FIELDS,
                actual: record.len(),
            });
        }
        for column in 1..SCOPE_FIELDS {
            values.push(parse_field(&record[column], line, column)?);
        }
        rows += 1;
    }
    if rows == 0 {
        return Err(ReductionError::TooFewRows {
            required: 1,
            actual: 0,
        });
    }
    log::debug!("parsed {rows} scope rows");
    let data = Array2::from_shape_vec((rows, SCOPE_COLUMNS.len()), values)
        .map_err(|e| ReductionError::InvalidLayout(e.to_string()))?;
    RawRecord::new(SCOPE_COLUMNS.to_vec(), data)
}
