//! Staged file output shared by the file writers.
//!
//! Bytes go to `<path>.tmp` and the file is renamed into place on commit.
//! The aggregation summary, if a summary path is set, is written as a JSON
//! array after the rename.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use common_error::{StrataError, StrataResult};
use strata_core::Record;

#[derive(Debug, Default)]
struct StagedState {
    file: Option<BufWriter<File>>,
    summary: Option<Vec<Record>>,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct StagedFile {
    path: PathBuf,
    summary_path: Option<PathBuf>,
    state: Mutex<StagedState>,
}

impl StagedFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            summary_path: None,
            state: Mutex::new(StagedState::default()),
        }
    }

    pub(crate) fn with_summary_path(mut self, path: PathBuf) -> Self {
        self.summary_path = Some(path);
        self
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    async fn open_staging(&self) -> StrataResult<BufWriter<File>> {
        let staging = self.staging_path();
        ensure_parent(&staging).await?;
        let file = File::create(&staging)
            .await
            .map_err(|e| StrataError::io(format!("cannot create {}: {e}", staging.display())))?;
        Ok(BufWriter::new(file))
    }

    /// Append encoded bytes, creating the staging file on first use.
    pub(crate) async fn append(&self, bytes: &[u8]) -> StrataResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(StrataError::io(format!(
                "{} is already closed",
                self.path.display()
            )));
        }
        if state.file.is_none() {
            state.file = Some(self.open_staging().await?);
        }
        let Some(file) = state.file.as_mut() else {
            return Err(StrataError::internal("staging file missing after open"));
        };
        file.write_all(bytes)
            .await
            .map_err(|e| StrataError::io(format!("write to {} failed: {e}", self.path.display())))
    }

    pub(crate) async fn set_summary(&self, records: Vec<Record>) {
        self.state.lock().await.summary = Some(records);
    }

    /// Flush, rename into place and write the summary.
    pub(crate) async fn commit(&self) -> StrataResult<()> {
        let mut state = self.state.lock().await;
        state.closed = true;
        let mut file = match state.file.take() {
            Some(file) => file,
            None => self.open_staging().await?,
        };
        file.flush()
            .await
            .map_err(|e| StrataError::io(format!("flush of {} failed: {e}", self.path.display())))?;
        drop(file);

        let staging = self.staging_path();
        tokio::fs::rename(&staging, &self.path).await.map_err(|e| {
            StrataError::io(format!(
                "cannot move {} to {}: {e}",
                staging.display(),
                self.path.display()
            ))
        })?;

        if let (Some(path), Some(summary)) = (&self.summary_path, state.summary.take()) {
            ensure_parent(path).await?;
            let body = serde_json::to_vec_pretty(&summary)?;
            tokio::fs::write(path, body)
                .await
                .map_err(|e| StrataError::io(format!("cannot write {}: {e}", path.display())))?;
        }
        log::debug!("committed {}", self.path.display());
        Ok(())
    }

    /// Drop staged output. Nothing becomes visible.
    pub(crate) async fn abort(&self) -> StrataResult<()> {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.summary = None;
        if state.file.take().is_some() {
            match tokio::fs::remove_file(self.staging_path()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

async fn ensure_parent(path: &Path) -> StrataResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StrataError::io(format!("cannot create {}: {e}", parent.display())))?;
    }
    Ok(())
}
