mod common;

use std::fs;

use common::{collaborators, init_logging, settings_in, MemorySink, StubResolver};
use harvester_core::ItemError;
use harvester_engine::{retry_error_listings, write_error_listing, RetrySummary};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn listed(label: &str, error: &str) -> ItemError {
    ItemError {
        label: label.to_string(),
        error: error.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn listed_failures_get_one_more_pass() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let settings = settings_in(temp.path(), 10);
    write_error_listing(
        &settings.error_listing_path(0),
        "word",
        &[listed("w1", "bad markup"), listed("gone", "timeout")],
    )
    .unwrap();
    write_error_listing(&settings.error_listing_path(3), "word", &[listed("busy", "503")]).unwrap();

    let resolver = StubResolver::new();
    resolver.missing("gone");
    resolver.always_blocked("busy");
    let sink = MemorySink::new();
    let collaborators = collaborators(Vec::new(), &resolver, &sink);

    let summary = retry_error_listings(&settings, &collaborators, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        summary,
        RetrySummary {
            total: 3,
            succeeded: 1,
            failed: 2,
            skipped: 0,
        }
    );
    assert_eq!(sink.saved_labels(), vec!["w1"]);
    // A single attempt per row, even when blocked.
    assert_eq!(resolver.details(), vec!["w1", "busy"]);

    let results = fs::read_to_string(settings.retry_results_path()).unwrap();
    let lines: Vec<&str> = results.lines().collect();
    assert_eq!(
        lines,
        vec![
            "word,original_error,source_file,retry_success,retry_message",
            "w1,bad markup,batch_0_errors.csv,true,saved",
            "gone,timeout,batch_0_errors.csv,false,not found",
            "busy,503,batch_3_errors.csv,false,\"detail blocked, status=429\"",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_retry_writes_what_it_has() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let settings = settings_in(temp.path(), 10);
    write_error_listing(
        &settings.error_listing_path(0),
        "word",
        &[listed("w1", "x"), listed("w2", "y")],
    )
    .unwrap();
    let resolver = StubResolver::new();
    let sink = MemorySink::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let collaborators = collaborators(Vec::new(), &resolver, &sink);
    let summary = retry_error_listings(&settings, &collaborators, &cancel)
        .await
        .unwrap();
    assert_eq!(summary.skipped, 2);
    assert!(resolver.searches().is_empty());
    assert_eq!(
        fs::read_to_string(settings.retry_results_path()).unwrap().lines().count(),
        1
    );
}
