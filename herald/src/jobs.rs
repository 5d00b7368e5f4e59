//! Job sources
//!
//! Batch files are CSV with one job per row: `target,message,count,delay`,
//! where `delay` is in (possibly fractional) seconds. There is no header;
//! blank lines and lines starting with `#` are ignored. Rows that are
//! incomplete or fail validation are skipped with a warning and reported
//! back to the caller.

use std::{io::Read, path::Path};

use herald_common::{JobError, JobSpec, tracing};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("expected 4 fields (target,message,count,delay), found {0}")]
    Incomplete(usize),

    #[error("invalid count {0:?}")]
    Count(String),

    #[error("invalid delay {0:?}")]
    Delay(String),

    #[error(transparent)]
    Record(#[from] JobError),
}

/// A row that could not be turned into a job
#[derive(Debug, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: RowError,
}

/// Jobs read from a batch, plus the rows that were rejected
#[derive(Debug, Default)]
pub struct JobBatch {
    pub jobs: Vec<JobSpec>,
    pub skipped: Vec<SkippedRow>,
}

/// Read a batch file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is not valid CSV.
pub fn read_batch_file(path: &Path) -> Result<JobBatch, csv::Error> {
    let file = std::fs::File::open(path)?;
    read_batch(file)
}

/// Read a batch from any CSV source.
///
/// # Errors
///
/// Returns an error if the input is not valid CSV or cannot be read.
pub fn read_batch(input: impl Read) -> Result<JobBatch, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut batch = JobBatch::default();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, csv::Position::line);

        if record.iter().all(str::is_empty) {
            continue;
        }

        match parse_row(&record) {
            Ok(job) => batch.jobs.push(job),
            Err(reason) => {
                tracing::warn!(line, %reason, "Skipping invalid job row");
                batch.skipped.push(SkippedRow { line, reason });
            }
        }
    }

    Ok(batch)
}

fn parse_row(record: &csv::StringRecord) -> Result<JobSpec, RowError> {
    let [target, message, count, delay] = [0, 1, 2, 3].map(|i| record.get(i));
    let (Some(target), Some(message), Some(count), Some(delay)) = (target, message, count, delay)
    else {
        return Err(RowError::Incomplete(record.len()));
    };

    let count = count
        .parse::<u32>()
        .map_err(|_| RowError::Count(count.to_string()))?;
    let delay = delay
        .parse::<f64>()
        .map_err(|_| RowError::Delay(delay.to_string()))
        .and_then(|secs| JobSpec::delay_from_secs(secs).map_err(RowError::from))?;

    Ok(JobSpec::new(target, message, count, delay)?)
}
