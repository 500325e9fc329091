//! JSON-lines reader and writer.

use std::path::PathBuf;

use async_trait::async_trait;

use common_error::{StrataError, StrataResult};
use strata_core::{Partition, Record, SourceSchema};
use strata_logical::{Constraint, ParamSchema, ParamSpec, ParamType, Params};

use crate::lines::{partition_stream, LineCursor};
use crate::staged::StagedFile;
use crate::stream::PartitionStream;
use crate::traits::{Reader, Writer};

/// Records per partition when not configured.
pub const DEFAULT_PARTITION_SIZE: usize = 1000;

// ============================================================================
// JsonlReader
// ============================================================================

/// Reads one JSON object per line from a file or a directory of `.jsonl`
/// files.
#[derive(Debug, Clone)]
pub struct JsonlReader {
    path: PathBuf,
    partition_size: usize,
    content_field: String,
    fields: Option<Vec<String>>,
}

impl JsonlReader {
    /// Create a reader with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            partition_size: DEFAULT_PARTITION_SIZE,
            content_field: "text".to_string(),
            fields: None,
        }
    }

    /// Records per partition.
    #[must_use]
    pub fn with_partition_size(mut self, size: usize) -> Self {
        self.partition_size = size.max(1);
        self
    }

    /// Field every record must carry.
    #[must_use]
    pub fn with_content_field(mut self, field: impl Into<String>) -> Self {
        self.content_field = field.into();
        self
    }

    /// Declare the complete list of top-level fields.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Declared parameters.
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(
                ParamSpec::new("path", ParamType::String)
                    .required()
                    .constraint(Constraint::NonEmpty)
                    .describe("File or directory of .jsonl files"),
            )
            .param(
                ParamSpec::new("partition_size", ParamType::Int)
                    .with_default(DEFAULT_PARTITION_SIZE as i64)
                    .constraint(Constraint::Gt(0.0))
                    .describe("Records per partition"),
            )
            .param(
                ParamSpec::new("content_field", ParamType::String)
                    .with_default("text")
                    .constraint(Constraint::NonEmpty)
                    .describe("Field every record must carry"),
            )
            .param(
                ParamSpec::new("fields", ParamType::StringList)
                    .describe("Complete list of top-level fields, if known"),
            )
    }

    /// Build from validated parameters.
    pub fn from_params(params: &Params) -> StrataResult<Self> {
        let mut reader = Self::new(params.str("path")?)
            .with_partition_size(params.usize("partition_size")?)
            .with_content_field(params.str("content_field")?);
        if let Some(fields) = params.opt_str_list("fields")? {
            reader = reader.with_fields(fields);
        }
        Ok(reader)
    }
}

#[async_trait]
impl Reader for JsonlReader {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn schema(&self) -> SourceSchema {
        match &self.fields {
            Some(fields) => SourceSchema::closed(self.content_field.clone(), fields.clone()),
            None => SourceSchema::open(self.content_field.clone()),
        }
    }

    async fn partitions(&self) -> StrataResult<PartitionStream> {
        let cursor = LineCursor::open(&self.path, &["jsonl"]).await?;
        let content_field = self.content_field.clone();
        Ok(partition_stream(
            cursor,
            self.partition_size,
            Box::new(move |line, cursor| {
                if line.trim().is_empty() {
                    return Ok(None);
                }
                let json: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                    StrataError::io(format!("{}: invalid JSON: {e}", cursor.location()))
                })?;
                let record = Record::from_json(json).map_err(|e| {
                    StrataError::io(format!("{}: {e}", cursor.location()))
                })?;
                if !record.contains(&content_field) {
                    return Err(StrataError::io(format!(
                        "{}: record has no '{content_field}' field",
                        cursor.location()
                    )));
                }
                Ok(Some(record))
            }),
        ))
    }
}

// ============================================================================
// JsonlWriter
// ============================================================================

/// Writes one JSON object per line.
///
/// Output is staged in `<path>.tmp` and renamed into place on commit. The
/// aggregation summary goes to `summary_path` as a JSON array, if set.
#[derive(Debug)]
pub struct JsonlWriter {
    output: StagedFile,
}

impl JsonlWriter {
    /// Create a writer.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            output: StagedFile::new(path.into()),
        }
    }

    /// Write the aggregation summary to `path` on commit.
    #[must_use]
    pub fn with_summary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = self.output.with_summary_path(path.into());
        self
    }

    /// Declared parameters.
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(
                ParamSpec::new("path", ParamType::String)
                    .required()
                    .constraint(Constraint::NonEmpty)
                    .describe("Output file"),
            )
            .param(
                ParamSpec::new("summary_path", ParamType::String)
                    .describe("JSON file receiving the aggregation summary"),
            )
    }

    /// Build from validated parameters.
    pub fn from_params(params: &Params) -> StrataResult<Self> {
        let mut writer = Self::new(params.str("path")?);
        if let Some(summary) = params.opt_str("summary_path")? {
            writer = writer.with_summary_path(summary);
        }
        Ok(writer)
    }

    #[cfg(test)]
    fn staging_path(&self) -> PathBuf {
        self.output.staging_path()
    }
}

#[async_trait]
impl Writer for JsonlWriter {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn write_partition(&self, partition: Partition) -> StrataResult<()> {
        let mut buf = Vec::new();
        for record in partition.records() {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        self.output.append(&buf).await
    }

    async fn write_summary(&self, records: Vec<Record>) -> StrataResult<()> {
        self.output.set_summary(records).await;
        Ok(())
    }

    async fn commit(&self) -> StrataResult<()> {
        self.output.commit().await
    }

    async fn abort(&self) -> StrataResult<()> {
        self.output.abort().await
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use futures::StreamExt;
    use strata_core::Value;

    fn write_lines(path: &Path, lines: &[&str]) {
        std::fs::write(path, lines.join("\n")).unwrap();
    }

    #[tokio::test]
    async fn test_read_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jsonl");
        write_lines(
            &path,
            &[
                r#"{"text":"a","id":1}"#,
                "",
                r#"{"text":"b","id":2}"#,
                r#"{"text":"c","id":3}"#,
            ],
        );

        let reader = JsonlReader::new(&path).with_partition_size(2);
        let parts: Vec<Partition> = reader
            .partitions()
            .await
            .unwrap()
            .map(|p| p.unwrap())
            .collect()
            .await;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].index(), 1);
        assert_eq!(parts[1].records()[0].get("id"), Some(&Value::Int64(3)));
    }

    #[tokio::test]
    async fn test_read_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(&dir.path().join("b.jsonl"), &[r#"{"text":"second"}"#]);
        write_lines(&dir.path().join("a.jsonl"), &[r#"{"text":"first"}"#]);
        write_lines(&dir.path().join("notes.txt"), &["ignored"]);
        write_lines(&dir.path().join("summary.json"), &[r#"[{"aggregation":"count"}]"#]);

        let reader = JsonlReader::new(dir.path());
        let parts: Vec<_> = reader.partitions().await.unwrap().collect().await;
        let texts: Vec<_> = parts[0]
            .as_ref()
            .unwrap()
            .records()
            .iter()
            .map(|r| r.get_str("text").unwrap().to_string())
            .collect();
        assert_eq!(texts, ["first", "second"]);
    }

    #[tokio::test]
    async fn test_bad_line_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jsonl");
        write_lines(&path, &[r#"{"text":"a"}"#, "{not json", r#"{"text":"c"}"#]);

        let items: Vec<_> = JsonlReader::new(&path).partitions().await.unwrap().collect().await;
        assert_eq!(items.len(), 1);
        let err = items[0].as_ref().unwrap_err();
        assert!(matches!(err, StrataError::Io(_)));
        assert!(err.to_string().contains("in.jsonl:2"));
    }

    #[tokio::test]
    async fn test_missing_content_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jsonl");
        write_lines(&path, &[r#"{"body":"a"}"#]);

        let items: Vec<_> = JsonlReader::new(&path).partitions().await.unwrap().collect().await;
        assert!(items[0].as_ref().unwrap_err().to_string().contains("no 'text' field"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = JsonlReader::new("/definitely/not/here.jsonl")
            .partitions()
            .await;
        assert!(matches!(result, Err(StrataError::Io(_))));
    }

    #[tokio::test]
    async fn test_huge_partition_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jsonl");
        write_lines(&path, &[r#"{"text":"a"}"#, r#"{"text":"b"}"#]);

        let reader = JsonlReader::new(&path).with_partition_size(usize::MAX);
        let parts: Vec<Partition> = reader
            .partitions()
            .await
            .unwrap()
            .map(|p| p.unwrap())
            .collect()
            .await;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].len(), 2);
    }

    #[tokio::test]
    async fn test_writer_stages_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out.jsonl");
        let summary = dir.path().join("summary.json");
        let writer = JsonlWriter::new(&out).with_summary_path(&summary);

        let record = Record::with_text("text", "hello").with_field("n", 1i64).unwrap();
        writer
            .write_partition(Partition::new(0, vec![record]))
            .await
            .unwrap();
        assert!(!out.exists());

        writer
            .write_summary(vec![Record::with_text("aggregation", "count")])
            .await
            .unwrap();
        writer.commit().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "{\"text\":\"hello\",\"n\":1}\n"
        );
        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(summary[0]["aggregation"], "count");
    }

    #[tokio::test]
    async fn test_writer_abort_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jsonl");
        let writer = JsonlWriter::new(&out);
        writer
            .write_partition(Partition::new(0, vec![Record::with_text("text", "x")]))
            .await
            .unwrap();
        writer.abort().await.unwrap();

        assert!(!out.exists());
        assert!(!writer.staging_path().exists());
    }

    #[tokio::test]
    async fn test_commit_without_writes_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jsonl");
        JsonlWriter::new(&out).commit().await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "");
    }
}
