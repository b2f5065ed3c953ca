#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// The pipeline finished one item.
    ItemDone {
        origin: ItemOrigin,
        label: String,
        result: ItemResult,
    },
    /// A chunk item was skipped because its label is already pending in this batch.
    ItemSkipped { label: String },
    /// The current processing phase stopped pulling items.
    PhaseEnded(PhaseExit),
    /// The persistence worker was joined (or the grace period ran out).
    WriterDrained { saved: usize, failed: usize },
}

/// Where an item being processed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOrigin {
    Pending,
    Chunk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    /// Resolved, ledgered and queued for persistence.
    Enqueued,
    /// The search reported the item does not exist.
    Missing,
    /// A per-item failure; recorded in the error listing.
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseExit {
    Completed,
    Interrupted,
    Outage,
}
