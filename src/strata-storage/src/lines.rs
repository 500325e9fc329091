//! Line-oriented file sources shared by the jsonl and text readers.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use common_error::{StrataError, StrataResult};
use strata_core::{Partition, Record};

use crate::stream::PartitionStream;

/// Upper bound on records reserved up front for one partition.
pub(crate) const MAX_PREALLOCATED: usize = 4096;

/// Cursor over the lines of one file or of every matching file in a
/// directory (sorted by name).
pub(crate) struct LineCursor {
    files: VecDeque<PathBuf>,
    current: Option<Lines<BufReader<File>>>,
    current_path: Option<PathBuf>,
    line_no: usize,
}

impl LineCursor {
    /// Resolve `path` into a list of files. Directories contribute every
    /// entry whose extension is in `extensions`.
    pub(crate) async fn open(path: &Path, extensions: &[&str]) -> StrataResult<Self> {
        let files = resolve_files(path, extensions).await?;
        Ok(Self {
            files: files.into(),
            current: None,
            current_path: None,
            line_no: 0,
        })
    }

    /// `file:line` of the most recently returned line.
    pub(crate) fn location(&self) -> String {
        match &self.current_path {
            Some(path) => format!("{}:{}", path.display(), self.line_no),
            None => "<closed>".to_string(),
        }
    }

    /// Next line across all files.
    pub(crate) async fn next_line(&mut self) -> StrataResult<Option<String>> {
        loop {
            if self.current.is_none() {
                let Some(path) = self.files.pop_front() else {
                    return Ok(None);
                };
                let file = File::open(&path)
                    .await
                    .map_err(|e| StrataError::io(format!("cannot open {}: {e}", path.display())))?;
                self.current = Some(BufReader::new(file).lines());
                self.current_path = Some(path);
                self.line_no = 0;
            }

            let next = match self.current.as_mut() {
                Some(lines) => lines.next_line().await.map_err(|e| {
                    StrataError::io(format!("read failed at {}: {e}", self.location()))
                })?,
                None => None,
            };
            match next {
                Some(line) => {
                    self.line_no += 1;
                    return Ok(Some(line));
                }
                None => self.current = None,
            }
        }
    }
}

/// The file itself, or the entries of a directory whose extension is in
/// `extensions`, sorted by name.
pub(crate) async fn resolve_files(path: &Path, extensions: &[&str]) -> StrataResult<Vec<PathBuf>> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| StrataError::io(format!("cannot open {}: {e}", path.display())))?;

    let mut files = Vec::new();
    if metadata.is_dir() {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| StrataError::io(format!("cannot list {}: {e}", path.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StrataError::io(format!("cannot list {}: {e}", path.display())))?
        {
            let candidate = entry.path();
            let matches = candidate
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext));
            if matches {
                files.push(candidate);
            }
        }
        files.sort();
    } else {
        files.push(path.to_path_buf());
    }

    log::debug!("source {} resolved to {} file(s)", path.display(), files.len());
    Ok(files)
}

/// Parses one line into a record; `Ok(None)` skips the line.
pub(crate) type LineParser = Box<dyn Fn(&str, &LineCursor) -> StrataResult<Option<Record>> + Send>;

struct LineStreamState {
    cursor: LineCursor,
    partition_size: usize,
    next_index: usize,
    parse: LineParser,
}

impl LineStreamState {
    async fn next_partition(&mut self) -> StrataResult<Option<Partition>> {
        let mut records = Vec::with_capacity(self.partition_size.min(MAX_PREALLOCATED));
        while records.len() < self.partition_size {
            let Some(line) = self.cursor.next_line().await? else {
                break;
            };
            if let Some(record) = (self.parse)(&line, &self.cursor)? {
                records.push(record);
            }
        }
        if records.is_empty() {
            return Ok(None);
        }
        let partition = Partition::new(self.next_index, records);
        self.next_index += 1;
        Ok(Some(partition))
    }
}

/// Lazily group parsed lines into partitions of `partition_size` records.
///
/// The stream ends after the first error.
pub(crate) fn partition_stream(
    cursor: LineCursor,
    partition_size: usize,
    parse: LineParser,
) -> PartitionStream {
    let state = LineStreamState {
        cursor,
        partition_size: partition_size.max(1),
        next_index: 0,
        parse,
    };
    Box::pin(futures::stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        match state.next_partition().await {
            Ok(Some(partition)) => Some((Ok(partition), Some(state))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    }))
}
