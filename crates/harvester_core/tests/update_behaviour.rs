use std::sync::Once;

use harvester_core::{
    next_batch, update, BatchPhase, BatchState, Effect, ItemError, ItemOrigin, ItemResult, Msg,
    PhaseExit, StopPolicy, TerminationReason,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn labels(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("w{i}")).collect()
}

fn apply(state: BatchState, msgs: Vec<Msg>) -> (BatchState, Vec<Effect>) {
    msgs.into_iter().fold((state, Vec::new()), |(state, mut all), msg| {
        let (state, effects) = update(state, msg);
        all.extend(effects);
        (state, all)
    })
}

fn chunk_done(label: &str, result: ItemResult) -> Msg {
    Msg::ItemDone {
        origin: ItemOrigin::Chunk,
        label: label.to_string(),
        result,
    }
}

#[test]
fn clean_batch_walks_every_phase() {
    init_logging();
    let items = labels(4);
    let batch = next_batch(&items, 0, 4).unwrap();
    let (state, effects) = apply(
        BatchState::new(&batch),
        vec![
            Msg::ItemDone {
                origin: ItemOrigin::Pending,
                label: "old".into(),
                result: ItemResult::Enqueued,
            },
            Msg::PhaseEnded(PhaseExit::Completed),
            chunk_done("w0", ItemResult::Enqueued),
            chunk_done("w1", ItemResult::Missing),
            chunk_done(
                "w2",
                ItemResult::Failed {
                    error: "parse".into(),
                },
            ),
            chunk_done("w3", ItemResult::Enqueued),
            Msg::PhaseEnded(PhaseExit::Completed),
            Msg::WriterDrained {
                saved: 2,
                failed: 1,
            },
        ],
    );

    assert_eq!(
        effects,
        vec![
            Effect::ProcessChunk,
            Effect::DrainWriter {
                policy: StopPolicy::Finish
            },
            Effect::Report,
        ]
    );
    assert_eq!(state.phase(), BatchPhase::Reporting);
    assert_eq!(state.processed(), 5);
    assert_eq!(state.chunk_processed(), 4);
    assert_eq!(state.success(), 3);
    assert_eq!(state.missing(), 1);
    assert_eq!(state.fail(), 2);
    assert_eq!(state.saved(), 2);
    assert_eq!(
        state.errors(),
        &[ItemError {
            label: "w2".into(),
            error: "parse".into()
        }]
    );
    // The batch covers the whole work list.
    assert_eq!(state.termination_reason(), TerminationReason::AllDone);

    let row = state.metrics_row(2.0, "2026-01-01 00:00:00");
    assert_eq!(row.start, 1);
    assert_eq!(row.end, 4);
    assert_eq!(row.insert_rate_per_sec, 1.5);
    assert_eq!(row.error_rate, 0.4);
}

#[test]
fn interrupt_during_replay_skips_chunk_and_uses_grace() {
    init_logging();
    let items = labels(8);
    let batch = next_batch(&items, 4, 4).unwrap();
    let (state, effects) = apply(
        BatchState::new(&batch),
        vec![
            Msg::PhaseEnded(PhaseExit::Interrupted),
            Msg::WriterDrained {
                saved: 0,
                failed: 0,
            },
        ],
    );

    assert_eq!(
        effects,
        vec![
            Effect::DrainWriter {
                policy: StopPolicy::Grace
            },
            Effect::Report,
        ]
    );
    assert!(state.interrupted());
    assert_eq!(state.termination_reason(), TerminationReason::ManualExit);
    let row = state.metrics_row(0.5, "t");
    assert_eq!((row.start, row.end), (4, 4));
}

#[test]
fn outage_mid_chunk_keeps_partial_progress() {
    init_logging();
    let items = labels(8);
    let batch = next_batch(&items, 0, 4).unwrap();
    let (state, effects) = apply(
        BatchState::new(&batch),
        vec![
            Msg::PhaseEnded(PhaseExit::Completed),
            chunk_done("w0", ItemResult::Enqueued),
            Msg::PhaseEnded(PhaseExit::Outage),
            Msg::WriterDrained {
                saved: 1,
                failed: 0,
            },
        ],
    );

    assert!(effects.contains(&Effect::DrainWriter {
        policy: StopPolicy::Finish
    }));
    assert_eq!(state.termination_reason(), TerminationReason::NetworkOutage);
    let row = state.metrics_row(1.0, "t");
    assert_eq!((row.start, row.end), (1, 1));
}

#[test]
fn no_new_items_is_suspected_block() {
    init_logging();
    let items = labels(8);
    let batch = next_batch(&items, 0, 4).unwrap();
    let (state, _) = apply(
        BatchState::new(&batch),
        vec![
            Msg::PhaseEnded(PhaseExit::Completed),
            Msg::PhaseEnded(PhaseExit::Completed),
            Msg::WriterDrained {
                saved: 0,
                failed: 0,
            },
        ],
    );
    assert_eq!(state.termination_reason(), TerminationReason::BlockedIp);
}

#[test]
fn skipped_pending_items_count_as_covered() {
    init_logging();
    let items = labels(8);
    let batch = next_batch(&items, 0, 4).unwrap();
    let (state, _) = apply(
        BatchState::new(&batch),
        vec![
            Msg::ItemDone {
                origin: ItemOrigin::Pending,
                label: "w1".into(),
                result: ItemResult::Enqueued,
            },
            Msg::PhaseEnded(PhaseExit::Completed),
            chunk_done("w0", ItemResult::Enqueued),
            Msg::ItemSkipped { label: "w1".into() },
            chunk_done("w2", ItemResult::Enqueued),
            chunk_done("w3", ItemResult::Enqueued),
            Msg::PhaseEnded(PhaseExit::Completed),
        ],
    );
    assert_eq!(state.chunk_processed(), 4);
    assert_eq!(state.processed(), 4);
    assert_eq!(state.termination_reason(), TerminationReason::BatchCompleted);
}
