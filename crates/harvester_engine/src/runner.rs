use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::{
    update, Batch, BatchState, Effect, ItemError, ItemOrigin, ItemResult, MetricsRow, Msg,
    PhaseExit, StopPolicy,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collab::Collaborators;
use crate::config::HarvestSettings;
use crate::error::HarvestError;
use crate::ledger::{write_error_listing, MetricsLedger};
use crate::pending::PendingLedger;
use crate::pipeline::{ItemOutcome, ItemPipeline, PipelineSettings};
use crate::worker::{PersistenceWorker, WriterSettings};

/// Result of one batch run, after its metrics row was written.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub row: MetricsRow,
    /// Batch items covered by this run, counted from the batch start.
    pub chunk_processed: usize,
    pub errors: Vec<ItemError>,
}

/// Drives the item pipeline over one batch: pending replay, then the batch's
/// own items, then writer drain and reporting.
pub struct BatchRunner<'a> {
    settings: &'a HarvestSettings,
    collaborators: &'a Collaborators,
    ledger: Arc<PendingLedger>,
    metrics: &'a MetricsLedger,
    cancel: CancellationToken,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        settings: &'a HarvestSettings,
        collaborators: &'a Collaborators,
        ledger: Arc<PendingLedger>,
        metrics: &'a MetricsLedger,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            collaborators,
            ledger,
            metrics,
            cancel,
        }
    }

    /// Runs `batch` to completion and writes exactly one metrics row.
    ///
    /// A manual interrupt is returned as [`HarvestError::Interrupted`] after
    /// the row is written; a sustained outage is reported through the row's
    /// termination reason.
    pub async fn run(&self, batch: &Batch) -> Result<BatchReport, HarvestError> {
        let started = Instant::now();
        let name = &self.settings.name;
        engine_info!(
            "[{}] Batch {}: items {}-{} ({} items)",
            name,
            batch.index,
            batch.offset_start + 1,
            batch.offset_end(),
            batch.items.len()
        );

        let pending = self.ledger.load();
        let mut pending_set: HashSet<String> = pending.iter().cloned().collect();

        let worker = PersistenceWorker::spawn(
            self.collaborators.sink.clone(),
            self.ledger.clone(),
            WriterSettings {
                batch_size: self.settings.persist_batch_size,
                flush_interval: self.settings.persist_flush_interval(),
                poll: self.settings.writer_poll(),
            },
        );
        let pipeline = ItemPipeline::new(
            self.collaborators.searcher.clone(),
            self.collaborators.detail.clone(),
            self.ledger.clone(),
            worker.queue(),
            PipelineSettings::from(self.settings),
            self.cancel.clone(),
        );
        let mut worker = Some(worker);

        let mut effects = VecDeque::new();
        let mut state = BatchState::new(batch);

        if !pending.is_empty() {
            engine_info!("[{}] Replaying {} pending items", name, pending.len());
        }
        let (next, exit) = self
            .drive(&pipeline, &pending, ItemOrigin::Pending, state, &mut pending_set)
            .await;
        state = step(next, Msg::PhaseEnded(exit), &mut effects);

        let mut report = None;
        while let Some(effect) = effects.pop_front() {
            match effect {
                Effect::ProcessChunk => {
                    let (next, exit) = self
                        .drive(&pipeline, &batch.items, ItemOrigin::Chunk, state, &mut pending_set)
                        .await;
                    state = step(next, Msg::PhaseEnded(exit), &mut effects);
                }
                Effect::DrainWriter { policy } => {
                    let grace = match policy {
                        StopPolicy::Finish => None,
                        StopPolicy::Grace => Some(self.settings.graceful_wait()),
                    };
                    let totals = match worker.take() {
                        Some(worker) => worker.stop(grace).await,
                        None => Default::default(),
                    };
                    state = step(
                        state,
                        Msg::WriterDrained {
                            saved: totals.saved,
                            failed: totals.failed,
                        },
                        &mut effects,
                    );
                }
                Effect::Report => {
                    report = Some(self.report(&state, started.elapsed().as_secs_f64())?);
                }
            }
        }

        let report = match report {
            Some(report) => report,
            // The state machine always ends in Report; keep the row invariant anyway.
            None => self.report(&state, started.elapsed().as_secs_f64())?,
        };
        if state.interrupted() {
            engine_warn!("[{}] Batch {} interrupted", name, batch.index);
            return Err(HarvestError::Interrupted {
                report: Box::new(report),
            });
        }
        Ok(report)
    }

    async fn drive(
        &self,
        pipeline: &ItemPipeline,
        labels: &[String],
        origin: ItemOrigin,
        mut state: BatchState,
        pending_set: &mut HashSet<String>,
    ) -> (BatchState, PhaseExit) {
        let mut ignored = VecDeque::new();
        for label in labels {
            if origin == ItemOrigin::Chunk && pending_set.contains(label) {
                state = step(state, Msg::ItemSkipped { label: label.clone() }, &mut ignored);
                continue;
            }
            if self.cancel.is_cancelled() {
                return (state, PhaseExit::Interrupted);
            }
            let result = match pipeline.process(label).await {
                ItemOutcome::Enqueued { label: queued } => {
                    pending_set.insert(queued);
                    ItemResult::Enqueued
                }
                ItemOutcome::Missing => ItemResult::Missing,
                ItemOutcome::Failed(error) => ItemResult::Failed { error },
                ItemOutcome::Outage(_) => return (state, PhaseExit::Outage),
                ItemOutcome::Cancelled => return (state, PhaseExit::Interrupted),
            };
            state = step(
                state,
                Msg::ItemDone {
                    origin,
                    label: label.clone(),
                    result,
                },
                &mut ignored,
            );
        }
        (state, PhaseExit::Completed)
    }

    fn report(&self, state: &BatchState, elapsed: f64) -> Result<BatchReport, HarvestError> {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let row = state.metrics_row(elapsed, timestamp);
        self.metrics.append(&row)?;
        engine_info!(
            "[{}] Batch {} {}: processed={} success={} fail={} missing={} saved={} in {:.3}s",
            self.settings.name,
            row.batch_idx,
            row.termination_reason,
            row.processed,
            row.success,
            row.fail,
            row.missing_detail_pages,
            row.saved,
            row.elapsed_seconds
        );

        let errors = state.errors().to_vec();
        if !errors.is_empty() {
            let path = self.settings.error_listing_path(row.batch_idx);
            match write_error_listing(&path, &self.settings.label_key, &errors) {
                Ok(()) => engine_warn!(
                    "[{}] {} failures listed in {:?}",
                    self.settings.name,
                    errors.len(),
                    path
                ),
                Err(err) => engine_error!(
                    "[{}] Failed to write error listing {:?}: {}",
                    self.settings.name,
                    path,
                    err
                ),
            }
        }

        Ok(BatchReport {
            chunk_processed: state.chunk_processed(),
            row,
            errors,
        })
    }
}

fn step(state: BatchState, msg: Msg, effects: &mut VecDeque<Effect>) -> BatchState {
    let (next, new_effects) = update(state, msg);
    effects.extend(new_effects);
    next
}
