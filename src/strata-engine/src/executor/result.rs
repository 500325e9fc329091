//! Run summary.

use std::fmt::Write;
use std::time::Duration;

use indexmap::IndexMap;

use common_error::StrataError;
use strata_core::{Record, Value};

use crate::metrics::MetricsSink;

/// Final value of one aggregate stage.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
    /// Aggregation type, such as `mean` or `quantile`.
    pub kind: String,
    /// Field the aggregation reads, `None` for record counts.
    pub on: Option<String>,
    pub group_by: Option<String>,
    /// Finalized value. `Null` when the aggregation saw no input.
    pub value: Value,
}

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Pipeline name.
    pub pipeline: String,
    /// Records produced by the reader.
    pub records_in: u64,
    /// Records that survived every stage.
    pub records_out: u64,
    /// Partitions processed.
    pub partitions: usize,
    /// Records removed per stage, by filtering or by the skip policy.
    pub per_stage_drop_count: IndexMap<String, u64>,
    /// Records removed per stage by the skip policy only.
    pub per_stage_skipped: IndexMap<String, u64>,
    /// Aggregation results keyed by stage name, in plan order.
    pub aggregation_results: IndexMap<String, AggregationResult>,
    /// Skipped-record and empty-aggregation errors, capped at the configured
    /// number of reports.
    pub errors: Vec<StrataError>,
    /// Number of errors seen, including those past the cap.
    pub error_count: u64,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// Per-stage metrics.
    pub metrics: MetricsSink,
}

impl RunSummary {
    /// Value of one aggregation.
    pub fn result(&self, stage: &str) -> Option<&Value> {
        self.aggregation_results.get(stage).map(|r| &r.value)
    }

    /// Records dropped by a stage.
    pub fn dropped(&self, stage: &str) -> u64 {
        self.per_stage_drop_count.get(stage).copied().unwrap_or(0)
    }

    /// Records skipped after a failure in a stage.
    pub fn skipped(&self, stage: &str) -> u64 {
        self.per_stage_skipped.get(stage).copied().unwrap_or(0)
    }

    /// Total records skipped across stages.
    pub fn total_skipped(&self) -> u64 {
        self.per_stage_skipped.values().sum()
    }

    /// Aggregation results as records, one per aggregate stage, in the shape
    /// handed to writers.
    pub fn summary_records(&self) -> Vec<Record> {
        self.aggregation_results
            .iter()
            .map(|(name, result)| {
                let mut fields = IndexMap::new();
                fields.insert("aggregation".to_string(), Value::from(name.as_str()));
                fields.insert("type".to_string(), Value::from(result.kind.as_str()));
                fields.insert(
                    "on".to_string(),
                    result.on.as_deref().map_or(Value::Null, Value::from),
                );
                if let Some(group_by) = &result.group_by {
                    fields.insert("group_by".to_string(), Value::from(group_by.as_str()));
                }
                fields.insert("value".to_string(), result.value.clone());
                Record::from_fields(fields)
            })
            .collect()
    }

    /// Get throughput (input records per second).
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.records_in as f64 / secs
        }
    }

    /// Format as EXPLAIN ANALYZE output.
    pub fn explain_analyze(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Pipeline: {}", self.pipeline);
        let _ = writeln!(output, "Execution Time: {:?}", self.elapsed);
        let _ = writeln!(
            output,
            "Records: {} in, {} out ({} partitions)",
            self.records_in, self.records_out, self.partitions
        );
        let _ = writeln!(output, "Throughput: {:.0} records/s", self.throughput());

        output.push_str("\nStages:\n");
        for (stage, dropped) in &self.per_stage_drop_count {
            let _ = writeln!(
                output,
                "  {stage}: dropped={dropped}, skipped={}",
                self.skipped(stage)
            );
        }

        if !self.aggregation_results.is_empty() {
            output.push_str("\nAggregations:\n");
            for (stage, result) in &self.aggregation_results {
                let _ = writeln!(output, "  {stage} = {}", serde_json::Value::from(&result.value));
            }
        }

        if self.error_count > 0 {
            let _ = writeln!(output, "\nErrors ({} total):", self.error_count);
            for error in &self.errors {
                let _ = writeln!(output, "  {error}");
            }
            let hidden = self.error_count.saturating_sub(self.errors.len() as u64);
            if hidden > 0 {
                let _ = writeln!(output, "  ... {hidden} more");
            }
        }

        output.push_str("\nStage Metrics:\n");
        output.push_str(&self.metrics.format_analyze());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        let mut summary = RunSummary {
            pipeline: "demo".to_string(),
            records_in: 10,
            records_out: 8,
            partitions: 2,
            elapsed: Duration::from_secs(2),
            ..RunSummary::default()
        };
        summary
            .per_stage_drop_count
            .insert("filter.language".to_string(), 2);
        summary.aggregation_results.insert(
            "mean_length".to_string(),
            AggregationResult {
                kind: "mean".to_string(),
                on: Some("length".to_string()),
                group_by: None,
                value: Value::Float64(4.5),
            },
        );
        summary.aggregation_results.insert(
            "aggregation.count".to_string(),
            AggregationResult {
                kind: "count".to_string(),
                on: None,
                group_by: None,
                value: Value::Int64(8),
            },
        );
        summary
    }

    #[test]
    fn test_accessors() {
        let summary = summary();
        assert_eq!(summary.dropped("filter.language"), 2);
        assert_eq!(summary.skipped("filter.language"), 0);
        assert_eq!(summary.dropped("missing"), 0);
        assert_eq!(summary.result("mean_length"), Some(&Value::Float64(4.5)));
        assert!((summary.throughput() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_records() {
        let records = summary().summary_records();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].get_str("aggregation"), Some("mean_length"));
        assert_eq!(records[0].get_str("type"), Some("mean"));
        assert_eq!(records[0].get_str("on"), Some("length"));
        assert_eq!(records[0].get("value"), Some(&Value::Float64(4.5)));

        assert_eq!(records[1].get("on"), Some(&Value::Null));
        assert!(!records[1].contains("group_by"));
    }

    #[test]
    fn test_explain_analyze() {
        let mut summary = summary();
        summary.error_count = 3;
        summary
            .errors
            .push(StrataError::value_error("bad record"));

        let text = summary.explain_analyze();
        assert!(text.contains("Records: 10 in, 8 out (2 partitions)"));
        assert!(text.contains("Throughput: 5 records/s"));
        assert!(text.contains("filter.language: dropped=2, skipped=0"));
        assert!(text.contains("mean_length = 4.5"));
        assert!(text.contains("... 2 more"));
    }
}
