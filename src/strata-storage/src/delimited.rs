//! Delimited-text (CSV) reader and writer.

use std::collections::VecDeque;
use std::fs::File;
use std::path::PathBuf;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Mutex;

use common_error::{StrataError, StrataResult};
use strata_core::{Partition, Record, SourceSchema, Value};
use strata_logical::{Constraint, ParamSchema, ParamSpec, ParamType, Params};

use crate::jsonl::DEFAULT_PARTITION_SIZE;
use crate::lines::{resolve_files, MAX_PREALLOCATED};
use crate::staged::StagedFile;
use crate::stream::PartitionStream;
use crate::traits::{Reader, Writer};

fn delimiter_param() -> ParamSpec {
    ParamSpec::new("delimiter", ParamType::String)
        .with_default(",")
        .constraint(Constraint::NonEmpty)
        .describe("Single-byte field separator")
}

fn parse_delimiter(component: &str, delimiter: &str) -> StrataResult<u8> {
    match delimiter.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(StrataError::invalid_parameter(
            component,
            "delimiter",
            format!("must be a single byte, got {delimiter:?}"),
        )),
    }
}

// ============================================================================
// CsvReader
// ============================================================================

/// Reads rows of a CSV file, or of every `.csv` file in a directory, as
/// records keyed by column name.
///
/// Column names come from the header row unless `names` is given. Cells are
/// typed as integers, floats or booleans where they parse as such; empty
/// cells become null. The content field is always kept as a string.
#[derive(Debug, Clone)]
pub struct CsvReader {
    path: PathBuf,
    partition_size: usize,
    content_field: String,
    delimiter: u8,
    header: bool,
    names: Option<Vec<String>>,
    infer_types: bool,
}

impl CsvReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            partition_size: DEFAULT_PARTITION_SIZE,
            content_field: "text".to_string(),
            delimiter: b',',
            header: true,
            names: None,
            infer_types: true,
        }
    }

    #[must_use]
    pub fn with_partition_size(mut self, size: usize) -> Self {
        self.partition_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_content_field(mut self, field: impl Into<String>) -> Self {
        self.content_field = field.into();
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Whether the first row of each file holds column names.
    #[must_use]
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Column names, overriding any header row.
    #[must_use]
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    #[must_use]
    pub fn with_infer_types(mut self, infer: bool) -> Self {
        self.infer_types = infer;
        self
    }

    /// Declared parameters.
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(
                ParamSpec::new("path", ParamType::String)
                    .required()
                    .constraint(Constraint::NonEmpty)
                    .describe("File or directory of .csv files"),
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
                    .describe("Column every record must carry"),
            )
            .param(delimiter_param())
            .param(
                ParamSpec::new("header", ParamType::Bool)
                    .with_default(true)
                    .describe("First row holds column names"),
            )
            .param(
                ParamSpec::new("names", ParamType::StringList)
                    .constraint(Constraint::NonEmpty)
                    .describe("Column names; required without a header row"),
            )
            .param(
                ParamSpec::new("infer_types", ParamType::Bool)
                    .with_default(true)
                    .describe("Parse numeric and boolean cells"),
            )
    }

    /// Build from validated parameters.
    pub fn from_params(params: &Params) -> StrataResult<Self> {
        let mut reader = Self::new(params.str("path")?)
            .with_partition_size(params.usize("partition_size")?)
            .with_content_field(params.str("content_field")?)
            .with_delimiter(parse_delimiter("reader.csv", params.str("delimiter")?)?)
            .with_header(params.bool("header")?)
            .with_infer_types(params.bool("infer_types")?);
        match params.opt_str_list("names")? {
            Some(names) => reader = reader.with_names(names),
            None if !reader.header => {
                return Err(StrataError::invalid_parameter(
                    "reader.csv",
                    "names",
                    "required when header is false",
                ));
            }
            None => {}
        }
        Ok(reader)
    }

    fn cell(&self, column: &str, raw: &str) -> Value {
        if column == self.content_field || !self.infer_types {
            return Value::from(raw);
        }
        if raw.is_empty() {
            Value::Null
        } else if let Ok(i) = raw.parse::<i64>() {
            Value::Int64(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            Value::Float64(f)
        } else {
            match raw {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::from(raw),
            }
        }
    }
}

struct OpenFile {
    path: PathBuf,
    rows: csv::Reader<File>,
    columns: Vec<String>,
}

/// Blocking state of one CSV partition stream. Moved onto the blocking pool
/// for every partition and handed back afterwards.
struct CsvStreamState {
    reader: CsvReader,
    files: VecDeque<PathBuf>,
    current: Option<OpenFile>,
    next_index: usize,
}

impl CsvStreamState {
    fn open(&self, path: PathBuf) -> StrataResult<OpenFile> {
        let mut rows = csv::ReaderBuilder::new()
            .delimiter(self.reader.delimiter)
            .has_headers(self.reader.header)
            .from_path(&path)
            .map_err(|e| StrataError::io(format!("cannot open {}: {e}", path.display())))?;
        let columns = match &self.reader.names {
            Some(names) => names.clone(),
            None => rows
                .headers()
                .map_err(|e| StrataError::io(format!("{}: bad header: {e}", path.display())))?
                .iter()
                .map(str::to_string)
                .collect(),
        };
        if !columns.contains(&self.reader.content_field) {
            return Err(StrataError::io(format!(
                "{}: no '{}' column",
                path.display(),
                self.reader.content_field
            )));
        }
        Ok(OpenFile {
            path,
            rows,
            columns,
        })
    }

    fn fill(&mut self) -> StrataResult<Vec<Record>> {
        let size = self.reader.partition_size;
        let mut records = Vec::with_capacity(size.min(MAX_PREALLOCATED));
        let mut row = csv::StringRecord::new();
        while records.len() < size {
            if self.current.is_none() {
                let Some(path) = self.files.pop_front() else {
                    break;
                };
                self.current = Some(self.open(path)?);
            }
            let Some(file) = self.current.as_mut() else {
                break;
            };

            let more = file.rows.read_record(&mut row).map_err(|e| {
                let line = e.position().map_or(0, csv::Position::line);
                StrataError::io(format!("{}:{line}: {e}", file.path.display()))
            })?;
            if !more {
                self.current = None;
                continue;
            }
            if row.len() != file.columns.len() {
                let line = row.position().map_or(0, csv::Position::line);
                return Err(StrataError::io(format!(
                    "{}:{line}: expected {} columns, got {}",
                    file.path.display(),
                    file.columns.len(),
                    row.len()
                )));
            }
            let fields: IndexMap<String, Value> = file
                .columns
                .iter()
                .zip(row.iter())
                .map(|(column, raw)| (column.clone(), self.reader.cell(column, raw)))
                .collect();
            records.push(Record::from_fields(fields));
        }
        Ok(records)
    }

    /// Read the next partition on the blocking pool. The state comes back
    /// unless the task itself failed.
    async fn next_partition(mut self) -> (Option<Self>, StrataResult<Option<Partition>>) {
        let joined = tokio::task::spawn_blocking(move || {
            let result = self.fill();
            (self, result)
        })
        .await;
        match joined {
            Ok((mut state, Ok(records))) => {
                if records.is_empty() {
                    return (Some(state), Ok(None));
                }
                let partition = Partition::new(state.next_index, records);
                state.next_index += 1;
                (Some(state), Ok(Some(partition)))
            }
            Ok((state, Err(e))) => (Some(state), Err(e)),
            Err(e) => (
                None,
                Err(StrataError::internal(format!("csv read task failed: {e}"))),
            ),
        }
    }
}

#[async_trait]
impl Reader for CsvReader {
    fn name(&self) -> &str {
        "csv"
    }

    fn schema(&self) -> SourceSchema {
        match &self.names {
            Some(names) => SourceSchema::closed(self.content_field.clone(), names.clone()),
            None => SourceSchema::open(self.content_field.clone()),
        }
    }

    async fn partitions(&self) -> StrataResult<PartitionStream> {
        let files = resolve_files(&self.path, &["csv"]).await?;
        let state = CsvStreamState {
            reader: self.clone(),
            files: files.into(),
            current: None,
            next_index: 0,
        };
        Ok(Box::pin(futures::stream::unfold(
            Some(state),
            |state| async move {
                let (state, outcome) = state?.next_partition().await;
                match outcome {
                    Ok(Some(partition)) => Some((Ok(partition), state)),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), None)),
                }
            },
        )))
    }
}

// ============================================================================
// CsvWriter
// ============================================================================

/// Writes records as CSV rows.
///
/// Columns are `columns` if given, else the top-level fields of the first
/// record written. Nulls become empty cells; arrays and maps are written as
/// JSON text. A record with a field outside the columns fails the write.
/// Output is staged and renamed into place on commit; the aggregation
/// summary goes to `summary_path` as JSON.
#[derive(Debug)]
pub struct CsvWriter {
    output: StagedFile,
    delimiter: u8,
    include_header: bool,
    fixed_columns: Option<Vec<String>>,
    columns: Mutex<Option<Vec<String>>>,
}

impl CsvWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            output: StagedFile::new(path.into()),
            delimiter: b',',
            include_header: true,
            fixed_columns: None,
            columns: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_summary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = self.output.with_summary_path(path.into());
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }

    #[must_use]
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.fixed_columns = Some(columns);
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
            .param(delimiter_param())
            .param(
                ParamSpec::new("include_header", ParamType::Bool)
                    .with_default(true)
                    .describe("Write a header row"),
            )
            .param(
                ParamSpec::new("columns", ParamType::StringList)
                    .constraint(Constraint::NonEmpty)
                    .describe("Column order; defaults to the first record's fields"),
            )
    }

    /// Build from validated parameters.
    pub fn from_params(params: &Params) -> StrataResult<Self> {
        let mut writer = Self::new(params.str("path")?)
            .with_delimiter(parse_delimiter("writer.csv", params.str("delimiter")?)?)
            .with_header(params.bool("include_header")?);
        if let Some(summary) = params.opt_str("summary_path")? {
            writer = writer.with_summary_path(summary);
        }
        if let Some(columns) = params.opt_str_list("columns")? {
            writer = writer.with_columns(columns);
        }
        Ok(writer)
    }

    fn encode(&self, header: Option<&[String]>, columns: &[String], records: &[Record]) -> StrataResult<Vec<u8>> {
        let failed = |e: &dyn std::fmt::Display| {
            StrataError::io(format!("csv encoding for {} failed: {e}", self.output.path().display()))
        };
        let mut out = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(Vec::new());
        if let Some(header) = header {
            out.write_record(header).map_err(|e| failed(&e))?;
        }
        for record in records {
            if let Some(extra) = record.fields().keys().find(|k| !columns.contains(k)) {
                return Err(StrataError::io(format!(
                    "{}: field '{extra}' is not a column ({})",
                    self.output.path().display(),
                    columns.join(", ")
                )));
            }
            let row = columns
                .iter()
                .map(|column| record.fields().get(column).map_or(Ok(String::new()), cell_text))
                .collect::<StrataResult<Vec<String>>>()?;
            out.write_record(&row).map_err(|e| failed(&e))?;
        }
        out.into_inner().map_err(|e| failed(&e))
    }
}

fn cell_text(value: &Value) -> StrataResult<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) => f.to_string(),
        Value::String(s) => s.clone(),
        nested @ (Value::Array(_) | Value::Map(_)) => serde_json::to_string(nested)?,
    })
}

#[async_trait]
impl Writer for CsvWriter {
    fn name(&self) -> &str {
        "csv"
    }

    async fn write_partition(&self, partition: Partition) -> StrataResult<()> {
        let mut columns = self.columns.lock().await;
        let first = match columns.as_ref() {
            Some(_) => false,
            None => {
                let chosen = match (&self.fixed_columns, partition.records().first()) {
                    (Some(fixed), _) => fixed.clone(),
                    (None, Some(record)) => record.fields().keys().cloned().collect(),
                    (None, None) => return Ok(()),
                };
                *columns = Some(chosen);
                true
            }
        };
        let Some(current) = columns.as_deref() else {
            return Err(StrataError::internal("csv columns missing after selection"));
        };
        let header = (first && self.include_header).then_some(current);
        let bytes = self.encode(header, current, partition.records())?;
        self.output.append(&bytes).await
    }

    async fn write_summary(&self, records: Vec<Record>) -> StrataResult<()> {
        self.output.set_summary(records).await;
        Ok(())
    }

    async fn commit(&self) -> StrataResult<()> {
        let columns = self.columns.lock().await;
        if columns.is_none() && self.include_header {
            if let Some(fixed) = &self.fixed_columns {
                let bytes = self.encode(Some(fixed.as_slice()), fixed, &[])?;
                self.output.append(&bytes).await?;
            }
        }
        drop(columns);
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

    fn read_all(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    async fn collect(reader: &CsvReader) -> Vec<StrataResult<Partition>> {
        reader.partitions().await.unwrap().collect().await
    }

    #[tokio::test]
    async fn test_read_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(
            &path,
            "id,text,score,ok\n1,\"hello, world\",0.5,true\n2,\"two\nlines\",,false\n3,42,7,x\n",
        )
        .unwrap();

        let reader = CsvReader::new(&path).with_partition_size(2);
        let parts: Vec<Partition> = collect(&reader).await.into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].index(), 1);

        let first = &parts[0].records()[0];
        assert_eq!(first.get("id"), Some(&Value::Int64(1)));
        assert_eq!(first.get_str("text"), Some("hello, world"));
        assert_eq!(first.get("score"), Some(&Value::Float64(0.5)));
        assert_eq!(first.get("ok"), Some(&Value::Bool(true)));

        let second = &parts[0].records()[1];
        assert_eq!(second.get_str("text"), Some("two\nlines"));
        assert_eq!(second.get("score"), Some(&Value::Null));

        let third = &parts[1].records()[0];
        assert_eq!(third.get_str("text"), Some("42"));
        assert_eq!(third.get_str("ok"), Some("x"));
    }

    #[tokio::test]
    async fn test_read_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, "a;1\nb;2\n").unwrap();

        let reader = CsvReader::new(&path)
            .with_delimiter(b';')
            .with_header(false)
            .with_names(vec!["text".to_string(), "n".to_string()])
            .with_infer_types(false);
        assert!(reader.schema().closed);

        let parts = collect(&reader).await;
        let records = parts[0].as_ref().unwrap().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get_str("n"), Some("2"));
    }

    #[tokio::test]
    async fn test_read_directory_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), "text\nsecond\n").unwrap();
        std::fs::write(dir.path().join("a.csv"), "text\nfirst\n").unwrap();
        std::fs::write(dir.path().join("summary.json"), "[]").unwrap();

        let parts = collect(&CsvReader::new(dir.path())).await;
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
    async fn test_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let no_text = dir.path().join("no_text.csv");
        std::fs::write(&no_text, "body\nx\n").unwrap();
        let parts = collect(&CsvReader::new(&no_text)).await;
        assert!(matches!(&parts[0], Err(StrataError::Io(msg)) if msg.contains("no 'text' column")));

        let ragged = dir.path().join("ragged.csv");
        std::fs::write(&ragged, "text,n\na,1\nb\n").unwrap();
        let parts = collect(&CsvReader::new(&ragged)).await;
        assert_eq!(parts.len(), 1);
        assert!(matches!(&parts[0], Err(StrataError::Io(_))));

        let missing = CsvReader::new(dir.path().join("absent.csv")).partitions().await;
        assert!(matches!(missing, Err(StrataError::Io(_))));
    }

    #[test]
    fn test_reader_params() {
        let schema = CsvReader::param_schema();
        let mut raw = IndexMap::new();
        raw.insert("path".to_string(), Value::from("in.csv"));
        raw.insert("header".to_string(), Value::Bool(false));
        let params = schema.validate("reader.csv", &raw).unwrap();
        assert!(matches!(
            CsvReader::from_params(&params),
            Err(StrataError::InvalidParameter { .. })
        ));

        raw.insert("header".to_string(), Value::Bool(true));
        raw.insert("delimiter".to_string(), Value::from("::"));
        let params = schema.validate("reader.csv", &raw).unwrap();
        assert!(matches!(
            CsvReader::from_params(&params),
            Err(StrataError::InvalidParameter { .. })
        ));
    }

    #[tokio::test]
    async fn test_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        let summary = dir.path().join("summary.json");
        let writer = CsvWriter::new(&out).with_summary_path(&summary);

        let mut tags = IndexMap::new();
        tags.insert("lang".to_string(), Value::from("en"));
        let first = Record::with_text("text", "hello, world")
            .with_field("n", 1i64)
            .unwrap()
            .with_field("meta", tags)
            .unwrap();
        let second = Record::with_text("text", "bye").with_field("n", Value::Null).unwrap();
        writer.write_partition(Partition::new(0, vec![first])).await.unwrap();
        writer.write_partition(Partition::new(1, vec![second])).await.unwrap();
        writer
            .write_summary(vec![Record::with_text("aggregation", "count")])
            .await
            .unwrap();
        assert!(!out.exists());
        writer.commit().await.unwrap();

        assert_eq!(
            read_all(&out),
            "text,n,meta\n\"hello, world\",1,\"{\"\"lang\"\":\"\"en\"\"}\"\nbye,,\n"
        );
        assert!(read_all(&summary).contains("\"aggregation\": \"count\""));

        let back = collect(&CsvReader::new(&out)).await;
        let records = back[0].as_ref().unwrap().records();
        assert_eq!(records[0].get_str("text"), Some("hello, world"));
        assert_eq!(records[0].get("n"), Some(&Value::Int64(1)));
        assert_eq!(records[1].get("n"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_writer_rejects_unknown_field() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        let writer = CsvWriter::new(&out).with_columns(vec!["text".to_string()]);

        let record = Record::with_text("text", "a").with_field("extra", 1i64).unwrap();
        let err = writer
            .write_partition(Partition::new(0, vec![record]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'extra'"));
        writer.abort().await.unwrap();
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_commit_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let fixed = dir.path().join("fixed.csv");
        CsvWriter::new(&fixed)
            .with_columns(vec!["text".to_string(), "n".to_string()])
            .commit()
            .await
            .unwrap();
        assert_eq!(read_all(&fixed), "text,n\n");

        let open = dir.path().join("open.csv");
        CsvWriter::new(&open).commit().await.unwrap();
        assert_eq!(read_all(&open), "");
    }
}
