//! Metrics collection for pipeline runs.

use std::fmt::Write;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// Metrics for a single stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorMetrics {
    /// Number of records entering the stage.
    pub rows_in: u64,
    /// Number of records leaving the stage.
    pub rows_out: u64,
    /// Total time spent in the stage across all workers.
    pub exec_time: Duration,
    /// Number of partitions processed.
    pub batches: u64,
}

impl OperatorMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rows_in: 0,
            rows_out: 0,
            exec_time: Duration::new(0, 0),
            batches: 0,
        }
    }

    pub fn add_rows_in(&mut self, count: usize) {
        self.rows_in += count as u64;
    }

    pub fn add_rows_out(&mut self, count: usize) {
        self.rows_out += count as u64;
    }

    pub fn add_time(&mut self, duration: Duration) {
        self.exec_time += duration;
    }

    pub fn add_batch(&mut self) {
        self.batches += 1;
    }

    /// Get selectivity (`rows_out` / `rows_in`).
    pub fn selectivity(&self) -> f64 {
        if self.rows_in == 0 {
            1.0
        } else {
            self.rows_out as f64 / self.rows_in as f64
        }
    }

    /// Get throughput (`rows_in` / `exec_time`).
    pub fn throughput(&self) -> f64 {
        let secs = self.exec_time.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.rows_in as f64 / secs
        }
    }
}

impl std::fmt::Display for OperatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rows_in={}, rows_out={}, time={:?}, partitions={}",
            self.rows_in, self.rows_out, self.exec_time, self.batches
        )
    }
}

/// Shared sink for per-stage metrics, kept in stage registration order.
#[derive(Debug, Clone, Default)]
pub struct MetricsSink {
    metrics: Arc<RwLock<IndexMap<String, OperatorMetrics>>>,
}

impl MetricsSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, OperatorMetrics>> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, OperatorMetrics>> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a slot so reports list stages in plan order.
    pub fn register(&self, stage: &str) {
        self.write().entry(stage.to_string()).or_default();
    }

    /// Update metrics for a stage using a closure.
    pub fn update<F>(&self, stage: &str, f: F)
    where
        F: FnOnce(&mut OperatorMetrics),
    {
        let mut guard = self.write();
        f(guard.entry(stage.to_string()).or_default());
    }

    pub fn get(&self, stage: &str) -> Option<OperatorMetrics> {
        self.read().get(stage).cloned()
    }

    pub fn all(&self) -> IndexMap<String, OperatorMetrics> {
        self.read().clone()
    }

    /// Total time across all stages.
    pub fn total_time(&self) -> Duration {
        self.read().values().map(|m| m.exec_time).sum()
    }

    /// Format metrics for EXPLAIN ANALYZE.
    pub fn format_analyze(&self) -> String {
        let metrics = self.read();
        let mut output = String::new();
        for (stage, m) in metrics.iter() {
            let _ = writeln!(
                output,
                "{stage}: rows_in={}, rows_out={}, selectivity={:.3}, time={:?}, rows/s={:.0}",
                m.rows_in,
                m.rows_out,
                m.selectivity(),
                m.exec_time,
                m.throughput()
            );
        }
        drop(metrics);
        if output.is_empty() {
            output.push_str("No metrics collected.\n");
        } else {
            let _ = writeln!(output, "total stage time={:?}", self.total_time());
        }
        output
    }
}

/// Timer for measuring stage execution time.
#[derive(Debug)]
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn stop(self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for ExecutionTimer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_metrics() {
        let mut metrics = OperatorMetrics::new();
        metrics.add_rows_in(1000);
        metrics.add_rows_out(500);
        metrics.add_batch();

        assert_eq!(metrics.batches, 1);
        assert!((metrics.selectivity() - 0.5).abs() < 0.001);
        assert_eq!(OperatorMetrics::new().selectivity(), 1.0);

        metrics.add_time(Duration::from_millis(500));
        assert!((metrics.throughput() - 2000.0).abs() < 1e-6);
        assert_eq!(OperatorMetrics::new().throughput(), 0.0);
    }

    #[test]
    fn test_sink_keeps_registration_order() {
        let sink = MetricsSink::new();
        sink.register("tagger.language");
        sink.register("filter.language");

        sink.update("filter.language", |m| {
            m.add_rows_in(10);
            m.add_rows_out(8);
        });
        sink.update("tagger.language", |m| m.add_rows_in(10));
        sink.update("filter.language", |m| m.add_rows_in(5));

        let names: Vec<_> = sink.all().keys().cloned().collect();
        assert_eq!(names, ["tagger.language", "filter.language"]);
        assert_eq!(sink.get("filter.language").unwrap().rows_in, 15);
        sink.update("tagger.language", |m| m.add_time(Duration::from_millis(30)));
        sink.update("filter.language", |m| m.add_time(Duration::from_millis(20)));
        assert_eq!(sink.total_time(), Duration::from_millis(50));

        let report = sink.format_analyze();
        assert!(report.starts_with("tagger.language:"));
        assert!(report.ends_with("total stage time=50ms\n"));
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(MetricsSink::new().format_analyze(), "No metrics collected.\n");
    }

    #[test]
    fn test_execution_timer() {
        let timer = ExecutionTimer::start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.stop() >= Duration::from_millis(5));
    }
}
