use std::sync::Arc;

use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::{advance, next_batch, Advance};
use tokio_util::sync::CancellationToken;

use crate::collab::Collaborators;
use crate::config::HarvestSettings;
use crate::error::{HarvestError, RunExit};
use crate::ledger::MetricsLedger;
use crate::pending::PendingLedger;
use crate::runner::BatchRunner;

/// Snapshot of a domain's on-disk progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub resume_offset: usize,
    /// Labels resolved but not yet confirmed at the sink, oldest first.
    pub pending: Vec<String>,
    pub batches_recorded: usize,
}

/// Reads both ledgers without touching them.
pub fn status(settings: &HarvestSettings) -> StatusReport {
    let metrics = MetricsLedger::new(settings.metrics_path());
    StatusReport {
        resume_offset: metrics.resume_offset(),
        pending: PendingLedger::new(settings.pending_path()).load(),
        batches_recorded: metrics.row_count(),
    }
}

/// Schedules batches over one domain's work list until it is done, stalls or
/// is interrupted.
pub struct Harvester {
    settings: HarvestSettings,
    collaborators: Collaborators,
}

impl Harvester {
    pub fn new(settings: HarvestSettings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
        }
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Runs to completion and maps the outcome to an exit status.
    pub async fn run(&self, cancel: CancellationToken) -> RunExit {
        match self.try_run(cancel).await {
            Ok(exit) => exit,
            Err(HarvestError::Interrupted { report }) => {
                engine_warn!(
                    "[{}] Stopped by interrupt at offset {}",
                    self.settings.name,
                    report.row.end
                );
                RunExit::Interrupted
            }
            Err(err) => {
                engine_error!("[{}] Harvest failed: {}", self.settings.name, err);
                RunExit::Failed
            }
        }
    }

    pub async fn try_run(&self, cancel: CancellationToken) -> Result<RunExit, HarvestError> {
        self.settings.validate()?;
        let name = &self.settings.name;

        let items = self
            .collaborators
            .source
            .list_items()
            .await
            .map_err(HarvestError::Source)?;
        if items.is_empty() {
            engine_warn!("[{}] Item source returned no work", name);
            return Ok(RunExit::NoWork);
        }

        let metrics = MetricsLedger::new(self.settings.metrics_path());
        let ledger = Arc::new(PendingLedger::new(self.settings.pending_path()));
        let mut offset = metrics.resume_offset();
        let total = items.len();
        engine_info!("[{}] {} items, resuming at offset {}", name, total, offset);

        if offset >= total {
            let pending = ledger.load();
            if !pending.is_empty() {
                engine_warn!(
                    "[{}] All items scheduled but {} labels still pending; \
                     they replay once the work list grows",
                    name,
                    pending.len()
                );
            }
            engine_info!("[{}] Nothing left to do", name);
            return Ok(RunExit::Completed);
        }

        let runner = BatchRunner::new(
            &self.settings,
            &self.collaborators,
            ledger,
            &metrics,
            cancel.clone(),
        );
        while let Some(batch) = next_batch(&items, offset, self.settings.batch_size) {
            if cancel.is_cancelled() {
                engine_warn!("[{}] Interrupt received before batch {}", name, batch.index);
                return Ok(RunExit::Interrupted);
            }
            let report = runner.run(&batch).await?;
            match advance(&batch, report.chunk_processed) {
                Advance::Next { offset: next } => offset = next,
                Advance::Partial { offset: next } => {
                    engine_warn!(
                        "[{}] Batch {} ended early ({}); resume from offset {} next run",
                        name,
                        batch.index,
                        report.row.termination_reason,
                        next
                    );
                    return Ok(RunExit::Completed);
                }
                Advance::Stalled { offset: stuck } => {
                    engine_warn!(
                        "[{}] Batch {} made no progress ({}); stopping at offset {}",
                        name,
                        batch.index,
                        report.row.termination_reason,
                        stuck
                    );
                    return Ok(RunExit::Completed);
                }
            }
        }

        engine_info!("[{}] All {} items done", name, total);
        Ok(RunExit::Completed)
    }
}
