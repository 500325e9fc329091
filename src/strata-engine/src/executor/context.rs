//! Execution context shared by the partition workers of a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common_config::{ExecutionConfig, StageErrorPolicy};
use common_error::{StrataError, StrataResult};
use tokio::sync::watch;

use crate::metrics::{MetricsSink, OperatorMetrics};

// ============================================================================
// Runtime Configuration
// ============================================================================

/// Runtime configuration for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of partitions processed concurrently.
    pub parallelism: usize,
    /// What to do when a stage fails on a single record.
    pub on_stage_error: StageErrorPolicy,
    /// Hand partitions to the writer in reader order.
    pub preserve_order: bool,
    /// Maximum number of skipped-record errors kept in the summary.
    pub max_error_reports: usize,
    /// Enable per-stage metrics collection.
    pub collect_metrics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for RuntimeConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            parallelism: config.effective_parallelism(),
            on_stage_error: config.on_stage_error,
            preserve_order: config.preserve_order,
            max_error_reports: config.max_error_reports,
            collect_metrics: config.collect_metrics,
        }
    }
}

impl RuntimeConfig {
    /// Set parallelism level. Zero is treated as one.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set the record failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: StageErrorPolicy) -> Self {
        self.on_stage_error = policy;
        self
    }

    #[must_use]
    pub fn with_preserve_order(mut self, preserve_order: bool) -> Self {
        self.preserve_order = preserve_order;
        self
    }

    /// Enable or disable metrics collection.
    #[must_use]
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.collect_metrics = enabled;
        self
    }
}

// ============================================================================
// Execution Context
// ============================================================================

/// Context handed to every partition worker.
///
/// The context is read-only to stages. Workers poll [`ExecutionContext::check`]
/// between stages so that external cancellation and fatal errors raised by a
/// sibling worker stop the run promptly.
#[derive(Clone)]
pub struct ExecutionContext {
    cancel_rx: watch::Receiver<bool>,
    halted: Arc<AtomicBool>,
    /// Metrics sink for stage statistics.
    pub metrics: Option<MetricsSink>,
    /// Runtime configuration.
    pub config: RuntimeConfig,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("config", &self.config)
            .field("metrics_enabled", &self.metrics.is_some())
            .field("halted", &self.halted.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Create a context that is never cancelled from outside.
    pub fn new(config: RuntimeConfig) -> Self {
        let (_, cancel_rx) = watch::channel(false);
        let metrics = config.collect_metrics.then(MetricsSink::new);
        Self {
            cancel_rx,
            halted: Arc::new(AtomicBool::new(false)),
            metrics,
            config,
        }
    }

    /// Create with cancellation receiver.
    #[must_use]
    pub fn with_cancellation(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = cancel_rx;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the metrics sink (if enabled).
    pub fn metrics(&self) -> Option<&MetricsSink> {
        self.metrics.as_ref()
    }

    /// Whether the run was cancelled from outside.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Stop every worker at its next check. Used once a fatal error is seen.
    pub(crate) fn halt(&self) {
        self.halted.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    /// Fail with `Cancelled` if the run should stop.
    pub fn check(&self) -> StrataResult<()> {
        if self.is_cancelled() {
            return Err(StrataError::cancelled("run cancelled"));
        }
        if self.is_halted() {
            return Err(StrataError::cancelled("run halted after a fatal error"));
        }
        Ok(())
    }

    /// Update stage metrics.
    pub fn update_metrics<F>(&self, stage: &str, f: F)
    where
        F: FnOnce(&mut OperatorMetrics),
    {
        if let Some(ref sink) = self.metrics {
            sink.update(stage, f);
        }
    }
}

// ============================================================================
// Cancellation Handle
// ============================================================================

/// Handle for cancelling a run from outside the executor.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Create a new cancellation handle.
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self { cancel_tx }
    }

    /// A receiver observing this handle.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Cancel the run.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config() {
        let config = RuntimeConfig::default()
            .with_parallelism(0)
            .with_policy(StageErrorPolicy::SkipRecord)
            .with_preserve_order(true)
            .with_metrics(false);

        assert_eq!(config.parallelism, 1);
        assert_eq!(config.on_stage_error, StageErrorPolicy::SkipRecord);
        assert!(config.preserve_order);
        assert!(!config.collect_metrics);
    }

    #[test]
    fn test_runtime_config_from_execution() {
        let execution = ExecutionConfig {
            parallelism: Some(3),
            on_stage_error: StageErrorPolicy::SkipRecord,
            ..ExecutionConfig::default()
        };
        let config = RuntimeConfig::from(&execution);
        assert_eq!(config.parallelism, 3);
        assert_eq!(config.max_error_reports, execution.max_error_reports);
    }

    #[test]
    fn test_metrics_follow_config() {
        let ctx = ExecutionContext::new(RuntimeConfig::default().with_metrics(false));
        assert!(ctx.metrics().is_none());
        ctx.update_metrics("stage", |m| m.add_batch());

        let ctx = ExecutionContext::new(RuntimeConfig::default());
        ctx.update_metrics("stage", |m| m.add_batch());
        assert_eq!(ctx.metrics().unwrap().get("stage").unwrap().batches, 1);
    }

    #[test]
    fn test_cancellation() {
        let handle = CancellationHandle::new();
        let ctx = ExecutionContext::new(RuntimeConfig::default()).with_cancellation(handle.subscribe());

        assert!(ctx.check().is_ok());
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(StrataError::Cancelled(_))));
    }

    #[test]
    fn test_halt_is_shared_between_clones() {
        let ctx = ExecutionContext::new(RuntimeConfig::default());
        let worker = ctx.clone();
        ctx.halt();
        assert!(worker.check().is_err());
        assert!(!worker.is_cancelled());
    }
}
