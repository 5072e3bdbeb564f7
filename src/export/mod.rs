// SPDX-License-Identifier: Apache-2.0

//! Writing the merged table to a file.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::BufWriter;
use tracing::info;

use crate::engine::types::{ColumnInfo, QueryResult, Row};
use crate::foreach::error::{ForeachError, ForeachResult};

pub mod csv;
pub mod json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Guesses the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ExportWriter: Send {
    async fn write_header(&mut self, columns: &[ColumnInfo]) -> Result<(), String>;
    async fn write_row(&mut self, columns: &[ColumnInfo], row: &Row) -> Result<(), String>;
    async fn finish(&mut self) -> Result<(), String>;
    fn bytes_written(&self) -> u64;
}

pub async fn create_writer(
    format: ExportFormat,
    output_path: &Path,
) -> Result<Box<dyn ExportWriter>, String> {
    let file = File::create(output_path)
        .await
        .map_err(|e| format!("Failed to create export file: {}", e))?;
    let writer = BufWriter::new(file);

    match format {
        ExportFormat::Csv => Ok(Box::new(csv::CsvWriter::new(writer)) as Box<dyn ExportWriter>),
        ExportFormat::Json => Ok(Box::new(json::JsonWriter::new(writer)) as Box<dyn ExportWriter>),
    }
}

/// Writes `table` to `path`. Without an explicit format the extension
/// decides, defaulting to CSV.
pub async fn export_table(
    table: &QueryResult,
    path: &Path,
    format: Option<ExportFormat>,
) -> ForeachResult<u64> {
    let format = format
        .or_else(|| ExportFormat::from_path(path))
        .unwrap_or(ExportFormat::Csv);

    let mut writer = create_writer(format, path)
        .await
        .map_err(|e| ForeachError::output(path, e))?;

    writer
        .write_header(&table.columns)
        .await
        .map_err(|e| ForeachError::output(path, e))?;
    for row in &table.rows {
        writer
            .write_row(&table.columns, row)
            .await
            .map_err(|e| ForeachError::output(path, e))?;
    }
    writer.finish().await.map_err(|e| ForeachError::output(path, e))?;

    let bytes = writer.bytes_written();
    info!(
        path = %path.display(),
        ?format,
        rows = table.row_count(),
        bytes,
        "Exported merged table"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Value;

    fn merged() -> QueryResult {
        QueryResult::from_parts(
            vec![
                ColumnInfo::new("name", "text", true),
                ColumnInfo::new("total", "int", true),
                ColumnInfo::new("database", "text", false),
            ],
            vec![
                Row::new(vec![
                    Value::Text("Widget, large".into()),
                    Value::Int(3),
                    Value::Text("ProjectA".into()),
                ]),
                Row::new(vec![Value::Null, Value::Float(1.5), Value::Text("ProjectB".into())]),
            ],
        )
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("out.CSV")), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_path(Path::new("out.json")), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_path(Path::new("out.xlsx")), None);
        assert_eq!(ExportFormat::from_path(Path::new("out")), None);
    }

    #[tokio::test]
    async fn exports_csv_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("merged.csv");

        let bytes = export_table(&merged(), &path, None).await.expect("export");
        let content = std::fs::read_to_string(&path).expect("read");

        assert_eq!(bytes as usize, content.len());
        assert_eq!(
            content,
            "name,total,database\n\"Widget, large\",3,ProjectA\n,1.5,ProjectB\n"
        );
    }

    #[tokio::test]
    async fn exports_json_array_of_objects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("merged.out");

        export_table(&merged(), &path, Some(ExportFormat::Json))
            .await
            .expect("export");
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");

        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
        assert_eq!(parsed[0]["name"], "Widget, large");
        assert_eq!(parsed[0]["database"], "ProjectA");
        assert!(parsed[1]["name"].is_null());
        assert_eq!(parsed[1]["total"], 1.5);
    }

    #[tokio::test]
    async fn unwritable_path_is_an_output_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("merged.csv");

        let err = export_table(&merged(), &path, None).await.expect_err("no dir");
        assert!(matches!(err, ForeachError::Output { .. }));
    }
}
