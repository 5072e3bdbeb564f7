// SPDX-License-Identifier: Apache-2.0

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::engine::types::{ColumnInfo, Row, Value};
use crate::export::ExportWriter;

/// CSV output. Records are encoded with the `csv` crate, one line at a time,
/// and written through the async file handle.
pub struct CsvWriter {
    writer: BufWriter<File>,
    header_written: bool,
    bytes_written: u64,
}

impl CsvWriter {
    pub fn new(writer: BufWriter<File>) -> Self {
        Self {
            writer,
            header_written: false,
            bytes_written: 0,
        }
    }

    fn encode_record<I, S>(fields: I) -> Result<Vec<u8>, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut encoder = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        encoder.write_record(fields).map_err(|e| e.to_string())?;
        encoder.into_inner().map_err(|e| e.to_string())
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), String> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| e.to_string())?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ExportWriter for CsvWriter {
    async fn write_header(&mut self, columns: &[ColumnInfo]) -> Result<(), String> {
        if self.header_written || columns.is_empty() {
            return Ok(());
        }

        let line = Self::encode_record(columns.iter().map(|col| col.name.as_str()))?;
        self.write_bytes(&line).await?;
        self.header_written = true;
        Ok(())
    }

    async fn write_row(&mut self, columns: &[ColumnInfo], row: &Row) -> Result<(), String> {
        if columns.is_empty() {
            return Ok(());
        }

        let fields = (0..columns.len())
            .map(|idx| row.values.get(idx).unwrap_or(&Value::Null).to_string());
        let line = Self::encode_record(fields)?;
        self.write_bytes(&line).await
    }

    async fn finish(&mut self) -> Result<(), String> {
        self.writer.flush().await.map_err(|e| e.to_string())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Writes a whole table as CSV to a synchronous sink such as stdout.
pub fn write_table<W: std::io::Write>(
    out: W,
    columns: &[ColumnInfo],
    rows: &[Row],
) -> Result<(), String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    writer
        .write_record(columns.iter().map(|col| col.name.as_str()))
        .map_err(|e| e.to_string())?;
    for row in rows {
        let fields = (0..columns.len())
            .map(|idx| row.values.get(idx).unwrap_or(&Value::Null).to_string());
        writer.write_record(fields).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_table_quotes_only_when_needed() {
        let columns = vec![
            ColumnInfo::new("note", "text", true),
            ColumnInfo::new("database", "text", false),
        ];
        let rows = vec![
            Row::new(vec![Value::Text("said \"hi\"".into()), Value::Text("X".into())]),
            Row::new(vec![Value::Null]),
        ];

        let mut out = Vec::new();
        write_table(&mut out, &columns, &rows).expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "note,database\n\"said \"\"hi\"\"\",X\n,\n"
        );
    }
}
