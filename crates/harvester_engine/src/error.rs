use thiserror::Error;

use crate::collab::CollaboratorError;
use crate::config::ConfigError;
use crate::ledger::MetricsError;
use crate::runner::BatchReport;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Raised after the interrupted batch's metrics row was written.
    #[error("interrupted during batch {}", .report.row.batch_idx)]
    Interrupted { report: Box<BatchReport> },
    #[error("item source failed: {0}")]
    Source(CollaboratorError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Process exit status of a harvesting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// All work done, or the run stopped cleanly to resume later.
    Completed,
    Failed,
    /// The item source returned nothing.
    NoWork,
    Interrupted,
}

impl RunExit {
    pub fn code(&self) -> u8 {
        match self {
            RunExit::Completed => 0,
            RunExit::Failed => 1,
            RunExit::NoWork => 2,
            RunExit::Interrupted => 130,
        }
    }
}
