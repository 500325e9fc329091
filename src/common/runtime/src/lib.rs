//! Async runtime utilities for Strata.
//!
//! Provides runtime construction for blocking entry points and a thin task
//! set used by the partition worker pool.

use std::future::Future;

use common_error::{StrataError, StrataResult};
use tokio::runtime::{Builder, Runtime};

/// Build a multi-threaded Tokio runtime for blocking entry points.
pub fn get_runtime() -> StrataResult<Runtime> {
    Builder::new_multi_thread()
        .enable_all()
        .thread_name("strata-worker")
        .build()
        .map_err(|e| StrataError::internal(format!("Failed to create runtime: {e}")))
}

/// Block on a future using a fresh runtime.
pub fn block_on<F: Future>(future: F) -> StrataResult<F::Output> {
    let runtime = get_runtime()?;
    Ok(runtime.block_on(future))
}

/// A set of spawned worker tasks.
pub struct JoinSet<T> {
    inner: tokio::task::JoinSet<T>,
}

impl<T: Send + 'static> JoinSet<T> {
    /// Create a new join set.
    pub fn new() -> Self {
        Self {
            inner: tokio::task::JoinSet::new(),
        }
    }

    /// Spawn an async task into the set.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.inner.spawn(future);
    }

    /// Spawn CPU-bound work onto the blocking pool.
    pub fn spawn_blocking<F>(&mut self, f: F)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.inner.spawn_blocking(f);
    }

    /// Wait for the next task to complete.
    pub async fn join_next(&mut self) -> Option<StrataResult<T>> {
        self.inner
            .join_next()
            .await
            .map(|res| res.map_err(|e| StrataError::internal(format!("worker task failed: {e}"))))
    }

    /// Take a finished task without waiting, if any.
    pub fn try_join_next(&mut self) -> Option<StrataResult<T>> {
        self.inner
            .try_join_next()
            .map(|res| res.map_err(|e| StrataError::internal(format!("worker task failed: {e}"))))
    }

    /// Abort every task still running.
    pub fn abort_all(&mut self) {
        self.inner.abort_all();
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the number of tasks in the set.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T: Send + 'static> Default for JoinSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on() {
        let value = block_on(async { 21 * 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_join_set_mixed_tasks() {
        let mut set = JoinSet::new();
        set.spawn(async { 1 });
        set.spawn_blocking(|| 2);
        assert_eq!(set.len(), 2);

        let mut total = 0;
        while let Some(res) = set.join_next().await {
            total += res.unwrap();
        }
        assert_eq!(total, 3);
        assert!(set.is_empty());
    }
}
