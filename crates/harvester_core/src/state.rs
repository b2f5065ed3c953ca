use crate::batch::Batch;
use crate::metrics::{
    decide_termination, error_rate, insert_rate, MetricsRow, TerminationFacts, TerminationReason,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    ReplayingPending,
    ProcessingChunk,
    DrainingWriter,
    Reporting,
}

/// A per-item failure destined for the batch's error listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub label: String,
    pub error: String,
}

/// Bookkeeping for one batch run, advanced by [`crate::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchState {
    phase: BatchPhase,
    batch_idx: usize,
    offset_start: usize,
    chunk_len: usize,
    is_last: bool,
    pub(crate) processed: usize,
    pub(crate) success: usize,
    pub(crate) fail: usize,
    pub(crate) missing: usize,
    pub(crate) chunk_processed: usize,
    pub(crate) saved: usize,
    pub(crate) interrupted: bool,
    pub(crate) outage: bool,
    pub(crate) errors: Vec<ItemError>,
}

impl BatchState {
    pub fn new(batch: &Batch) -> Self {
        Self {
            phase: BatchPhase::ReplayingPending,
            batch_idx: batch.index,
            offset_start: batch.offset_start,
            chunk_len: batch.items.len(),
            is_last: batch.is_last,
            processed: 0,
            success: 0,
            fail: 0,
            missing: 0,
            chunk_processed: 0,
            saved: 0,
            interrupted: false,
            outage: false,
            errors: Vec::new(),
        }
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: BatchPhase) {
        self.phase = phase;
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn success(&self) -> usize {
        self.success
    }

    /// Pipeline failures plus writer failures folded in at drain time.
    pub fn fail(&self) -> usize {
        self.fail
    }

    pub fn missing(&self) -> usize {
        self.missing
    }

    pub fn chunk_processed(&self) -> usize {
        self.chunk_processed
    }

    pub fn saved(&self) -> usize {
        self.saved
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn errors(&self) -> &[ItemError] {
        &self.errors
    }

    pub fn termination_reason(&self) -> TerminationReason {
        decide_termination(TerminationFacts {
            interrupted: self.interrupted,
            outage: self.outage,
            chunk_processed: self.chunk_processed,
            chunk_len: self.chunk_len,
            is_last: self.is_last,
        })
    }

    /// Builds the ledger row for this batch.
    pub fn metrics_row(&self, elapsed_seconds: f64, timestamp: impl Into<String>) -> MetricsRow {
        let start = if self.chunk_processed > 0 {
            self.offset_start + 1
        } else {
            self.offset_start
        };
        MetricsRow {
            batch_idx: self.batch_idx,
            start,
            end: self.offset_start + self.chunk_processed,
            processed: self.processed,
            success: self.success,
            fail: self.fail,
            missing_detail_pages: self.missing,
            termination_reason: self.termination_reason(),
            elapsed_seconds,
            insert_rate_per_sec: insert_rate(self.success, elapsed_seconds),
            error_rate: error_rate(self.fail, self.processed),
            timestamp: timestamp.into(),
            saved: self.saved,
        }
    }
}
