//! # Export Module
//!
//! Writers used by the `dump` command to emit one aggregate result as JSONL
//! or CSV.

pub mod csv;
pub mod jsonl;

use std::io::Write;

use thiserror::Error;

use crate::record::HistoryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Jsonl,
    Csv,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub trait RecordSink {
    fn write_record(&mut self, record: &HistoryRecord) -> Result<(), ExportError>;
    fn finish(&mut self) -> Result<(), ExportError>;
}

pub fn build_sink<'a>(
    format: ExportFormat,
    writer: Box<dyn Write + 'a>,
) -> Result<Box<dyn RecordSink + 'a>, ExportError> {
    match format {
        ExportFormat::Jsonl => Ok(Box::new(jsonl::JsonlSink::new(writer))),
        ExportFormat::Csv => Ok(Box::new(csv::CsvSink::new(writer)?)),
    }
}

/// Write every record and flush. Returns the number of records written.
pub fn write_records(
    sink: &mut dyn RecordSink,
    records: &[HistoryRecord],
) -> Result<usize, ExportError> {
    for record in records {
        sink.write_record(record)?;
    }
    sink.finish()?;
    Ok(records.len())
}
