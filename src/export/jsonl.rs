use std::io::{BufWriter, Write};

use crate::export::{ExportError, RecordSink};
use crate::record::HistoryRecord;

pub struct JsonlSink<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }
}

impl<W: Write> RecordSink for JsonlSink<W> {
    fn write_record(&mut self, record: &HistoryRecord) -> Result<(), ExportError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }
}
