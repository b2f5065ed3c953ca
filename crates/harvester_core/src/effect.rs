/// Work the batch runner performs in response to a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Replay finished cleanly; run the pipeline over the batch's own items.
    ProcessChunk,
    /// Stop the persistence worker and wait for it.
    DrainWriter { policy: StopPolicy },
    /// Write the metrics row and the error listing.
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Wait for the worker to drain the whole queue.
    Finish,
    /// Wait at most the configured grace period.
    Grace,
}
