use std::path::Path;

use engine_logging::{engine_info, engine_warn};
use harvester_core::{DetailOutcome, SearchOutcome};
use tokio_util::sync::CancellationToken;

use crate::collab::Collaborators;
use crate::config::HarvestSettings;
use crate::ledger::{read_error_listings, ListedError, MetricsError};

/// Result of one retried row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Saved,
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows left untried because the run was cancelled.
    pub skipped: usize,
}

/// Gives every label in the batch error listings one more search, detail and
/// save pass, without backoff, and writes the outcomes to `retry_results.csv`.
pub async fn retry_error_listings(
    settings: &HarvestSettings,
    collaborators: &Collaborators,
    cancel: &CancellationToken,
) -> Result<RetrySummary, MetricsError> {
    let rows = read_error_listings(&settings.base_dir, &settings.label_key);
    let mut summary = RetrySummary {
        total: rows.len(),
        ..RetrySummary::default()
    };
    engine_info!("[{}] Retrying {} listed failures", settings.name, rows.len());

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        if cancel.is_cancelled() {
            summary.skipped = summary.total - results.len();
            engine_warn!("[{}] Retry interrupted, {} rows left", settings.name, summary.skipped);
            break;
        }
        let outcome = retry_one(settings, collaborators, &row.label).await;
        match &outcome {
            RetryOutcome::Saved => summary.succeeded += 1,
            RetryOutcome::Failed(message) => {
                summary.failed += 1;
                engine_warn!("[{}] Retry of {:?} failed: {}", settings.name, row.label, message);
            }
        }
        results.push((row, outcome));
    }

    write_results(&settings.retry_results_path(), &settings.label_key, &results)?;
    engine_info!(
        "[{}] Retry done: {} saved, {} failed of {}",
        settings.name,
        summary.succeeded,
        summary.failed,
        summary.total
    );
    Ok(summary)
}

async fn retry_one(
    settings: &HarvestSettings,
    collaborators: &Collaborators,
    label: &str,
) -> RetryOutcome {
    let locator = match collaborators.searcher.search(label, settings.search_delay()).await {
        Ok(SearchOutcome::Found(locator)) => locator,
        Ok(SearchOutcome::NotFound) => return failed("not found"),
        Ok(SearchOutcome::Blocked(signal)) => return failed(format!("search blocked, {signal}")),
        Ok(SearchOutcome::Error(message)) => return failed(message),
        Err(err) => return failed(err.to_string()),
    };

    let outcome = match collaborators
        .detail
        .fetch_detail(&locator, settings.request_delay())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => return failed(err.to_string()),
    };
    if let Some(signal) = outcome.block_signal() {
        return failed(format!("detail blocked, {signal}"));
    }
    let mut record = match outcome {
        DetailOutcome::Record(record) => record,
        DetailOutcome::Error { message, .. } => return failed(message),
        DetailOutcome::Blocked(signal) => return failed(format!("detail blocked, {signal}")),
    };
    if record.source_url.is_none() {
        record.source_url = Some(locator.to_string());
    }
    record.normalize_label(&settings.label_key, label);

    match collaborators.sink.save(&record).await {
        Ok(true) => RetryOutcome::Saved,
        Ok(false) => failed("sink refused record"),
        Err(err) => failed(err.to_string()),
    }
}

fn failed(message: impl Into<String>) -> RetryOutcome {
    RetryOutcome::Failed(message.into())
}

fn write_results(
    path: &Path,
    label_key: &str,
    results: &[(ListedError, RetryOutcome)],
) -> Result<(), MetricsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        label_key,
        "original_error",
        "source_file",
        "retry_success",
        "retry_message",
    ])?;
    for (row, outcome) in results {
        let (success, message) = match outcome {
            RetryOutcome::Saved => ("true", "saved"),
            RetryOutcome::Failed(message) => ("false", message.as_str()),
        };
        writer.write_record([
            row.label.as_str(),
            row.error.as_str(),
            row.source_file.as_str(),
            success,
            message,
        ])?;
    }
    writer.flush()?;
    Ok(())
}
