use std::io::Write;

use serde::Serialize;

use crate::export::{ExportError, RecordSink};
use crate::record::HistoryRecord;
use crate::timestamp::format_native;

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

#[derive(Serialize)]
struct HistoryCsv<'a> {
    url: &'a str,
    title: &'a str,
    last_visit_time: i64,
    visited_at: String,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Result<Self, ExportError> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        writer.write_record(["url", "title", "last_visit_time", "visited_at"])?;
        Ok(Self { writer })
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write_record(&mut self, record: &HistoryRecord) -> Result<(), ExportError> {
        let row = HistoryCsv {
            url: &record.url,
            title: record.title.as_deref().unwrap_or(""),
            last_visit_time: record.last_visit_time,
            visited_at: format_native(record.last_visit_time),
        };
        self.writer.serialize(row)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }
}
