use crate::{
    BatchPhase, BatchState, Effect, ItemError, ItemOrigin, ItemResult, Msg, PhaseExit, StopPolicy,
};

/// Pure update function: applies a message to the batch state and returns any effects.
///
/// Messages that do not belong to the current phase are ignored.
pub fn update(mut state: BatchState, msg: Msg) -> (BatchState, Vec<Effect>) {
    let effects = match msg {
        Msg::ItemDone {
            origin,
            label,
            result,
        } => {
            if !is_processing(state.phase()) {
                return (state, Vec::new());
            }
            state.processed += 1;
            if origin == ItemOrigin::Chunk {
                state.chunk_processed += 1;
            }
            match result {
                ItemResult::Enqueued => state.success += 1,
                ItemResult::Missing => state.missing += 1,
                ItemResult::Failed { error } => {
                    state.fail += 1;
                    state.errors.push(ItemError { label, error });
                }
            }
            Vec::new()
        }
        Msg::ItemSkipped { .. } => {
            // Replayed from the pending ledger earlier in this batch.
            if state.phase() == BatchPhase::ProcessingChunk {
                state.chunk_processed += 1;
            }
            Vec::new()
        }
        Msg::PhaseEnded(exit) => match (state.phase(), exit) {
            (BatchPhase::ReplayingPending, PhaseExit::Completed) => {
                state.set_phase(BatchPhase::ProcessingChunk);
                vec![Effect::ProcessChunk]
            }
            (BatchPhase::ProcessingChunk, PhaseExit::Completed) => {
                state.set_phase(BatchPhase::DrainingWriter);
                vec![Effect::DrainWriter {
                    policy: StopPolicy::Finish,
                }]
            }
            (
                BatchPhase::ReplayingPending | BatchPhase::ProcessingChunk,
                PhaseExit::Interrupted,
            ) => {
                state.interrupted = true;
                state.set_phase(BatchPhase::DrainingWriter);
                vec![Effect::DrainWriter {
                    policy: StopPolicy::Grace,
                }]
            }
            (BatchPhase::ReplayingPending | BatchPhase::ProcessingChunk, PhaseExit::Outage) => {
                state.outage = true;
                state.set_phase(BatchPhase::DrainingWriter);
                vec![Effect::DrainWriter {
                    policy: StopPolicy::Finish,
                }]
            }
            (BatchPhase::DrainingWriter | BatchPhase::Reporting, _) => Vec::new(),
        },
        Msg::WriterDrained { saved, failed } => {
            if state.phase() != BatchPhase::DrainingWriter {
                return (state, Vec::new());
            }
            state.saved += saved;
            state.fail += failed;
            state.set_phase(BatchPhase::Reporting);
            vec![Effect::Report]
        }
    };

    (state, effects)
}

fn is_processing(phase: BatchPhase) -> bool {
    matches!(
        phase,
        BatchPhase::ReplayingPending | BatchPhase::ProcessingChunk
    )
}
