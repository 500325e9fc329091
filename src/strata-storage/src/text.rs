//! Plain-text reader: one record per non-blank line.

use std::path::PathBuf;

use async_trait::async_trait;

use common_error::StrataResult;
use strata_core::{Record, SourceSchema};
use strata_logical::{Constraint, ParamSchema, ParamSpec, ParamType, Params};

use crate::jsonl::DEFAULT_PARTITION_SIZE;
use crate::lines::{partition_stream, LineCursor};
use crate::stream::PartitionStream;
use crate::traits::Reader;

/// Reads `.txt` files, storing each line under a single field.
#[derive(Debug, Clone)]
pub struct TextReader {
    path: PathBuf,
    partition_size: usize,
    field: String,
}

impl TextReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            partition_size: DEFAULT_PARTITION_SIZE,
            field: "text".to_string(),
        }
    }

    #[must_use]
    pub fn with_partition_size(mut self, size: usize) -> Self {
        self.partition_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Declared parameters.
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(
                ParamSpec::new("path", ParamType::String)
                    .required()
                    .constraint(Constraint::NonEmpty)
                    .describe("File or directory of .txt files"),
            )
            .param(
                ParamSpec::new("partition_size", ParamType::Int)
                    .with_default(DEFAULT_PARTITION_SIZE as i64)
                    .constraint(Constraint::Gt(0.0))
                    .describe("Records per partition"),
            )
            .param(
                ParamSpec::new("field", ParamType::String)
                    .with_default("text")
                    .constraint(Constraint::NonEmpty)
                    .describe("Field receiving the line"),
            )
    }

    /// Build from validated parameters.
    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Ok(Self::new(params.str("path")?)
            .with_partition_size(params.usize("partition_size")?)
            .with_field(params.str("field")?))
    }
}

#[async_trait]
impl Reader for TextReader {
    fn name(&self) -> &str {
        "text"
    }

    fn schema(&self) -> SourceSchema {
        SourceSchema::closed(self.field.clone(), [self.field.clone()])
    }

    async fn partitions(&self) -> StrataResult<PartitionStream> {
        let cursor = LineCursor::open(&self.path, &["txt"]).await?;
        let field = self.field.clone();
        Ok(partition_stream(
            cursor,
            self.partition_size,
            Box::new(move |line, _| {
                if line.trim().is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Record::with_text(&field, line)))
                }
            }),
        ))
    }
}
