//! Harvester core: pure batch bookkeeping, backoff and record types.
mod backoff;
mod batch;
mod effect;
mod metrics;
mod msg;
mod record;
mod state;
mod update;

pub use backoff::{next_delay, BackoffPolicy, RetryAttempt, RetryDecision};
pub use batch::{advance, batch_range, cell_end, next_batch, Advance, Batch};
pub use effect::{Effect, StopPolicy};
pub use metrics::{
    decide_termination, error_rate, insert_rate, MetricsRow, TerminationFacts, TerminationReason,
};
pub use msg::{ItemOrigin, ItemResult, Msg, PhaseExit};
pub use record::{
    is_block_status, BlockSignal, DetailOutcome, Locator, ResolvedRecord, SearchOutcome,
    BLOCK_STATUS_CODES,
};
pub use state::{BatchPhase, BatchState, ItemError};
pub use update::update;
