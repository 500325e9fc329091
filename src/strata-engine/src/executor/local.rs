//! Local executor: a bounded pool of partition workers.
//!
//! The reader is pulled one partition at a time. A partition is only pulled
//! once a worker slot is free, so at most `parallelism` partitions are in
//! flight. Each worker runs every stage over its partition, stage by stage,
//! on the blocking pool and hands back the surviving records together with
//! one partial accumulator per aggregate stage. Partials are merged once the
//! reader is exhausted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use indexmap::IndexMap;
use tokio::sync::Semaphore;

use common_config::StageErrorPolicy;
use common_error::{RecordLocator, StrataError, StrataResult};
use common_runtime::JoinSet;
use strata_core::{Partition, Record, Value};
use strata_logical::ComponentCategory;
use strata_storage::Writer;

use crate::aggregate::{merge_tree, Accumulator};
use crate::executor::{
    AggregationResult, CancellationHandle, ExecutionContext, RunSummary, RuntimeConfig,
};
use crate::metrics::ExecutionTimer;
use crate::physical::{ExecutionPlan, PlannedStage};
use crate::stages::{MapFn, Stage};

/// Local single-node executor.
#[derive(Debug, Default)]
pub struct LocalExecutor {
    /// Overrides the execution settings carried by the plan.
    config: Option<RuntimeConfig>,
}

impl LocalExecutor {
    /// Create an executor that follows each plan's execution settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            config: Some(config),
        }
    }

    pub fn config(&self) -> Option<&RuntimeConfig> {
        self.config.as_ref()
    }

    /// Run a plan to completion.
    pub async fn run(&self, plan: Arc<ExecutionPlan>) -> StrataResult<RunSummary> {
        self.run_with_cancellation(plan, None).await
    }

    /// Run a plan, stopping early if `cancel` fires.
    ///
    /// On any fatal error, including cancellation, outstanding workers are
    /// stopped and the writer is aborted, so no output is committed.
    pub async fn run_with_cancellation(
        &self,
        plan: Arc<ExecutionPlan>,
        cancel: Option<CancellationHandle>,
    ) -> StrataResult<RunSummary> {
        let start = Instant::now();
        let config = self
            .config
            .clone()
            .unwrap_or_else(|| RuntimeConfig::from(plan.execution()));
        let mut ctx = ExecutionContext::new(config);
        if let Some(handle) = &cancel {
            ctx = ctx.with_cancellation(handle.subscribe());
        }
        if let Some(metrics) = ctx.metrics() {
            for stage in plan.stages() {
                metrics.register(&stage.name);
            }
        }

        log::info!(
            "running pipeline '{}': {} stage(s), parallelism={}, on_stage_error={}",
            plan.name(),
            plan.stages().len(),
            ctx.config.parallelism,
            ctx.config.on_stage_error
        );

        match execute(&plan, &ctx).await {
            Ok(mut summary) => {
                summary.elapsed = start.elapsed();
                log::info!(
                    "pipeline '{}' finished in {:?}: {} record(s) in, {} out, {} skipped",
                    plan.name(),
                    summary.elapsed,
                    summary.records_in,
                    summary.records_out,
                    summary.total_skipped()
                );
                Ok(summary)
            }
            Err(err) => {
                ctx.halt();
                if let Some(output) = plan.writer() {
                    if let Err(abort_err) = output.writer.abort().await {
                        log::warn!("failed to abort writer '{}': {abort_err}", output.format);
                    }
                }
                log::error!("pipeline '{}' failed: {err}", plan.name());
                Err(err)
            }
        }
    }

    /// Run a plan on a fresh runtime, blocking the calling thread.
    pub fn run_sync(&self, plan: Arc<ExecutionPlan>) -> StrataResult<RunSummary> {
        common_runtime::block_on(self.run(plan))?
    }
}

/// Everything a run accumulates on the coordinating task.
struct RunState {
    summary: RunSummary,
    stage_names: Vec<String>,
    /// Partial accumulators, one list per aggregate stage.
    partials: Vec<Vec<Accumulator>>,
    /// Finished partitions waiting for their turn when order is preserved.
    pending: BTreeMap<usize, Partition>,
    next_write: usize,
    preserve_order: bool,
    max_error_reports: usize,
}

impl RunState {
    fn new(plan: &ExecutionPlan, ctx: &ExecutionContext) -> Self {
        let stage_names: Vec<String> = plan.stages().iter().map(|s| s.name.clone()).collect();
        let zeroes: IndexMap<String, u64> =
            stage_names.iter().map(|name| (name.clone(), 0)).collect();
        let summary = RunSummary {
            pipeline: plan.name().to_string(),
            per_stage_drop_count: zeroes.clone(),
            per_stage_skipped: zeroes,
            metrics: ctx.metrics().cloned().unwrap_or_default(),
            ..RunSummary::default()
        };
        Self {
            summary,
            stage_names,
            partials: plan.aggregate_stages().map(|_| Vec::new()).collect(),
            pending: BTreeMap::new(),
            next_write: 0,
            preserve_order: ctx.config.preserve_order,
            max_error_reports: ctx.config.max_error_reports,
        }
    }

    fn report(&mut self, error: StrataError) {
        self.summary.error_count += 1;
        if self.summary.errors.len() < self.max_error_reports {
            self.summary.errors.push(error);
        }
    }

    /// Fold a finished partition into the run.
    async fn absorb(
        &mut self,
        output: PartitionOutput,
        writer: Option<&dyn Writer>,
    ) -> StrataResult<()> {
        self.summary.partitions += 1;
        for (position, name) in self.stage_names.iter().enumerate() {
            *self.summary.per_stage_drop_count.entry(name.clone()).or_default() +=
                output.drops[position];
            *self.summary.per_stage_skipped.entry(name.clone()).or_default() +=
                output.skipped[position];
        }
        // errors past the worker's own cap are only counted
        let unreported = output.error_count - output.errors.len() as u64;
        for error in output.errors {
            self.report(error);
        }
        self.summary.error_count += unreported;

        for (slot, accumulator) in output.accumulators.into_iter().enumerate() {
            self.partials[slot].push(accumulator);
        }

        self.summary.records_out += output.records.len() as u64;
        let partition = Partition::new(output.index, output.records);
        if !self.preserve_order {
            return write(writer, partition).await;
        }
        self.pending.insert(partition.index(), partition);
        while let Some(ready) = self.pending.remove(&self.next_write) {
            write(writer, ready).await?;
            self.next_write += 1;
        }
        Ok(())
    }
}

async fn write(writer: Option<&dyn Writer>, partition: Partition) -> StrataResult<()> {
    match writer {
        Some(writer) if !partition.is_empty() => writer.write_partition(partition).await,
        _ => Ok(()),
    }
}

async fn execute(plan: &Arc<ExecutionPlan>, ctx: &ExecutionContext) -> StrataResult<RunSummary> {
    let writer = plan.writer().map(|w| Arc::clone(&w.writer));
    let mut state = RunState::new(plan, ctx);

    let mut workers = JoinSet::new();
    let pumped = pump(plan, ctx, &mut workers, &mut state, writer.as_deref()).await;
    if pumped.is_err() {
        ctx.halt();
        workers.abort_all();
    }
    pumped?;

    finish_aggregations(plan, ctx, &mut state).await?;

    if let Some(writer) = &writer {
        writer.write_summary(state.summary.summary_records()).await?;
        writer.commit().await?;
    }
    Ok(state.summary)
}

/// Feed partitions to workers and absorb their results until the reader is
/// exhausted and every worker has reported back.
async fn pump(
    plan: &Arc<ExecutionPlan>,
    ctx: &ExecutionContext,
    workers: &mut JoinSet<StrataResult<PartitionOutput>>,
    state: &mut RunState,
    writer: Option<&dyn Writer>,
) -> StrataResult<()> {
    let slots = Arc::new(Semaphore::new(ctx.config.parallelism.max(1)));
    let mut partitions = plan.reader().reader.partitions().await?;
    let mut sequence = 0usize;

    loop {
        ctx.check()?;
        while let Some(done) = workers.try_join_next() {
            state.absorb(done??, writer).await?;
        }

        let permit = Arc::clone(&slots)
            .acquire_owned()
            .await
            .map_err(|_| StrataError::internal("worker pool closed"))?;
        ctx.check()?;
        let Some(next) = partitions.next().await else {
            break;
        };
        let partition = next?.with_index(sequence).with_lineage();
        sequence += 1;
        state.summary.records_in += partition.len() as u64;
        log::debug!(
            "dispatching partition {} ({} record(s))",
            partition.index(),
            partition.len()
        );

        let plan = Arc::clone(plan);
        let worker_ctx = ctx.clone();
        workers.spawn_blocking(move || {
            let _permit = permit;
            process_partition(&plan, &worker_ctx, partition)
        });
    }

    while let Some(done) = workers.join_next().await {
        state.absorb(done??, writer).await?;
    }
    Ok(())
}

/// Merge the partials of every aggregate stage and finalize them.
async fn finish_aggregations(
    plan: &ExecutionPlan,
    ctx: &ExecutionContext,
    state: &mut RunState,
) -> StrataResult<()> {
    let mut merges = JoinSet::new();
    for (slot, partials) in std::mem::take(&mut state.partials).into_iter().enumerate() {
        merges.spawn_blocking(move || (slot, merge_tree(partials)));
    }
    let mut merged: BTreeMap<usize, Option<Accumulator>> = BTreeMap::new();
    while let Some(done) = merges.join_next().await {
        let (slot, result) = done?;
        merged.insert(slot, result?);
    }
    ctx.check()?;

    for (slot, stage) in plan.aggregate_stages().enumerate() {
        let Some(func) = stage.stage.as_aggregate() else {
            continue;
        };
        let mut accumulator = merged
            .remove(&slot)
            .flatten()
            .unwrap_or_else(|| Accumulator::new(stage.name.clone(), Arc::clone(func)));
        let value = match accumulator.finalize() {
            Ok(value) => value,
            Err(err @ StrataError::EmptyAggregation { .. }) => {
                log::warn!("{err}");
                state.report(err);
                Value::Null
            }
            Err(err) => return Err(err),
        };
        state.summary.aggregation_results.insert(
            stage.name.clone(),
            AggregationResult {
                kind: func.kind().to_string(),
                on: func.target().map(str::to_string),
                group_by: func.group_by().map(str::to_string),
                value,
            },
        );
    }
    Ok(())
}

/// Result of running every stage over one partition.
struct PartitionOutput {
    index: usize,
    records: Vec<Record>,
    accumulators: Vec<Accumulator>,
    /// Per stage, in plan order.
    drops: Vec<u64>,
    skipped: Vec<u64>,
    errors: Vec<StrataError>,
    error_count: u64,
}

fn process_partition(
    plan: &ExecutionPlan,
    ctx: &ExecutionContext,
    partition: Partition,
) -> StrataResult<PartitionOutput> {
    let index = partition.index();
    let stages = plan.stages();
    let mut output = PartitionOutput {
        index,
        records: Vec::new(),
        accumulators: stages
            .iter()
            .filter_map(|s| {
                s.stage
                    .as_aggregate()
                    .map(|func| Accumulator::new(s.name.clone(), Arc::clone(func)))
            })
            .collect(),
        drops: vec![0; stages.len()],
        skipped: vec![0; stages.len()],
        errors: Vec::new(),
        error_count: 0,
    };

    let mut records = partition.into_records();
    let mut slot = 0;
    for (position, planned) in stages.iter().enumerate() {
        ctx.check()?;
        let timer = ExecutionTimer::start();
        let rows_in = records.len();
        let mut survivors = Vec::with_capacity(rows_in);

        for (offset, record) in records.into_iter().enumerate() {
            let locator = record
                .origin()
                .unwrap_or(RecordLocator::new(index, offset));
            let result = match &planned.stage {
                Stage::Map(map) => apply_map(planned, map.as_ref(), &record),
                Stage::Filter(filter) => filter.keep(&record).map(|keep| keep.then_some(record)),
                Stage::Aggregate(_) => output.accumulators[slot]
                    .update(&record)
                    .map(|()| Some(record)),
            };
            match result {
                Ok(Some(record)) => survivors.push(record),
                Ok(None) => output.drops[position] += 1,
                Err(err) => {
                    let err = record_failure(planned, locator, ctx.config.on_stage_error, err)?;
                    log::warn!("skipping record: {err}");
                    output.drops[position] += 1;
                    output.skipped[position] += 1;
                    output.error_count += 1;
                    if output.errors.len() < ctx.config.max_error_reports {
                        output.errors.push(err);
                    }
                }
            }
        }

        if matches!(planned.stage, Stage::Aggregate(_)) {
            slot += 1;
        }
        let rows_out = survivors.len();
        ctx.update_metrics(&planned.name, |m| {
            m.add_rows_in(rows_in);
            m.add_rows_out(rows_out);
            m.add_time(timer.stop());
            m.add_batch();
        });
        records = survivors;
    }

    output.records = records;
    Ok(output)
}

/// Run a map stage over one record. Taggers may only add fields.
fn apply_map(
    planned: &PlannedStage,
    map: &dyn MapFn,
    record: &Record,
) -> StrataResult<Option<Record>> {
    let Some(mapped) = map.apply(record)? else {
        return Ok(None);
    };
    if planned.category == ComponentCategory::Tagger {
        if let Some(path) = mapped.first_changed_path(record) {
            return Err(StrataError::value_error(format!(
                "taggers may only add fields, but '{path}' was changed or removed"
            )));
        }
    }
    Ok(Some(mapped.with_origin(record.origin())))
}

/// Classify a stage failure on one record.
///
/// Returns the error to report when the record may be skipped, or `Err` when
/// the run must stop.
fn record_failure(
    planned: &PlannedStage,
    locator: RecordLocator,
    policy: StageErrorPolicy,
    err: StrataError,
) -> StrataResult<StrataError> {
    if !err.is_record_level() {
        return Err(err.in_stage(&planned.name));
    }
    let err = match err {
        err @ StrataError::RecordProcessing { .. } => err,
        other => StrataError::record_processing(planned.name.as_str(), locator, &other),
    };
    match policy {
        StageErrorPolicy::Abort => Err(err),
        StageErrorPolicy::SkipRecord => Ok(err),
    }
}
