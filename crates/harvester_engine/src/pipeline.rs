use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_warn};
use harvester_core::{BackoffPolicy, DetailOutcome, Locator, ResolvedRecord, SearchOutcome};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::collab::{CollaboratorError, DetailFetcher, Searcher};
use crate::config::HarvestSettings;
use crate::pending::PendingLedger;
use crate::retry::{retry_with_backoff, sleep_or_cancel, Attempt, RetryError};
use crate::worker::PersistenceQueue;

/// Final classification of one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Resolved, recorded in the pending ledger and queued under `label`.
    Enqueued { label: String },
    /// The search reported no such item.
    Missing,
    /// Per-item failure; the batch continues.
    Failed(String),
    /// Backoff exhausted; the rest of the batch is abandoned.
    Outage(String),
    Cancelled,
}

/// Outcome of a single pipeline step.
#[derive(Debug, Clone, PartialEq)]
enum Step<T> {
    Continue(T),
    Halt(Halt),
}

/// Why an item stopped before reaching the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Halt {
    Missing,
    Failure(String),
    Fatal(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub name: String,
    pub label_key: String,
    pub search_delay: Duration,
    pub request_delay: Duration,
    pub jitter_max: Duration,
    pub backoff: BackoffPolicy,
}

impl From<&HarvestSettings> for PipelineSettings {
    fn from(settings: &HarvestSettings) -> Self {
        Self {
            name: settings.name.clone(),
            label_key: settings.label_key.clone(),
            search_delay: settings.search_delay(),
            request_delay: settings.request_delay(),
            jitter_max: settings.jitter_max(),
            backoff: settings.backoff(),
        }
    }
}

/// Per-item state machine: search, fetch detail, then ledger and enqueue.
pub struct ItemPipeline {
    searcher: Arc<dyn Searcher>,
    detail: Arc<dyn DetailFetcher>,
    ledger: Arc<PendingLedger>,
    queue: PersistenceQueue,
    settings: PipelineSettings,
    cancel: CancellationToken,
}

impl ItemPipeline {
    pub fn new(
        searcher: Arc<dyn Searcher>,
        detail: Arc<dyn DetailFetcher>,
        ledger: Arc<PendingLedger>,
        queue: PersistenceQueue,
        settings: PipelineSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            searcher,
            detail,
            ledger,
            queue,
            settings,
            cancel,
        }
    }

    pub async fn process(&self, item: &str) -> ItemOutcome {
        if sleep_or_cancel(self.jitter(), &self.cancel).await.is_err() {
            return ItemOutcome::Cancelled;
        }
        let locator = match self.resolve(item).await {
            Step::Continue(locator) => locator,
            Step::Halt(halt) => return self.conclude(item, "search", halt),
        };

        if sleep_or_cancel(self.jitter(), &self.cancel).await.is_err() {
            return ItemOutcome::Cancelled;
        }
        let record = match self.fetch(item, &locator).await {
            Step::Continue(record) => record,
            Step::Halt(halt) => return self.conclude(item, "detail", halt),
        };

        self.enqueue(item, &locator, record)
    }

    async fn resolve(&self, item: &str) -> Step<Locator> {
        let searcher = self.searcher.as_ref();
        let cancel = &self.cancel;
        let delay = self.settings.search_delay;
        let label = format!("search {item:?}");

        let result = retry_with_backoff(&self.settings.backoff, &label, cancel, move || async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Attempt::Ready(Step::Halt(Halt::Cancelled)),
                outcome = searcher.search(item, delay) => outcome,
            };
            classify_search(outcome)
        })
        .await;
        escalate(result)
    }

    async fn fetch(&self, item: &str, locator: &Locator) -> Step<ResolvedRecord> {
        let detail = self.detail.as_ref();
        let cancel = &self.cancel;
        let delay = self.settings.request_delay;
        let label = format!("detail {item:?}");

        let result = retry_with_backoff(&self.settings.backoff, &label, cancel, move || async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Attempt::Ready(Step::Halt(Halt::Cancelled)),
                outcome = detail.fetch_detail(locator, delay) => outcome,
            };
            classify_detail(outcome)
        })
        .await;
        escalate(result)
    }

    fn enqueue(&self, item: &str, locator: &Locator, mut record: ResolvedRecord) -> ItemOutcome {
        if record.source_url.is_none() {
            record.source_url = Some(locator.to_string());
        }
        let label = record.normalize_label(&self.settings.label_key, item).to_string();

        // Ledger first: a crash after this point replays the label next run.
        if let Err(err) = self.ledger.add(&label) {
            engine_error!(
                "[{}] Failed to add {:?} to pending ledger: {}",
                self.settings.name,
                label,
                err
            );
        }
        if self.queue.send(record).is_err() {
            engine_error!(
                "[{}] Persistence queue closed, {:?} stays pending",
                self.settings.name,
                label
            );
            return ItemOutcome::Failed("persistence queue closed".to_string());
        }
        engine_debug!("[{}] Queued {:?} ({})", self.settings.name, label, locator);
        ItemOutcome::Enqueued { label }
    }

    fn conclude(&self, item: &str, stage: &str, halt: Halt) -> ItemOutcome {
        let name = &self.settings.name;
        match halt {
            Halt::Missing => {
                engine_warn!("[{}] No detail page for {:?}", name, item);
                ItemOutcome::Missing
            }
            Halt::Failure(message) => {
                engine_error!("[{}] {} failed for {:?}: {}", name, stage, item, message);
                ItemOutcome::Failed(message)
            }
            Halt::Fatal(detail) => {
                engine_error!(
                    "[{}] Sustained outage during {} of {:?}: {}",
                    name,
                    stage,
                    item,
                    detail
                );
                ItemOutcome::Outage(detail)
            }
            Halt::Cancelled => ItemOutcome::Cancelled,
        }
    }

    fn jitter(&self) -> Duration {
        random_jitter(self.settings.jitter_max)
    }
}

fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let secs = rand::rng().random_range(0.0..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

fn classify_search(
    outcome: Result<SearchOutcome, CollaboratorError>,
) -> Attempt<Step<Locator>> {
    match outcome {
        Ok(SearchOutcome::Found(locator)) => Attempt::Ready(Step::Continue(locator)),
        Ok(SearchOutcome::Blocked(signal)) => Attempt::Transient(format!("blocked, {signal}")),
        Ok(SearchOutcome::NotFound) => Attempt::Ready(Step::Halt(Halt::Missing)),
        Ok(SearchOutcome::Error(message)) => Attempt::Ready(Step::Halt(Halt::Failure(message))),
        Err(err) if err.is_transient() => Attempt::Transient(err.to_string()),
        Err(err) => Attempt::Ready(Step::Halt(Halt::Failure(err.to_string()))),
    }
}

fn classify_detail(
    outcome: Result<DetailOutcome, CollaboratorError>,
) -> Attempt<Step<ResolvedRecord>> {
    match outcome {
        Ok(outcome) => {
            if let Some(signal) = outcome.block_signal() {
                return Attempt::Transient(format!("blocked, {signal}"));
            }
            match outcome {
                DetailOutcome::Record(record) => Attempt::Ready(Step::Continue(record)),
                DetailOutcome::Error { message, .. } => {
                    Attempt::Ready(Step::Halt(Halt::Failure(message)))
                }
                DetailOutcome::Blocked(signal) => Attempt::Transient(format!("blocked, {signal}")),
            }
        }
        Err(err) if err.is_transient() => Attempt::Transient(err.to_string()),
        Err(err) => Attempt::Ready(Step::Halt(Halt::Failure(err.to_string()))),
    }
}

fn escalate<T>(result: Result<Step<T>, RetryError>) -> Step<T> {
    match result {
        Ok(step) => step,
        Err(RetryError::Exhausted { detail, .. }) => Step::Halt(Halt::Fatal(detail)),
        Err(RetryError::Cancelled) => Step::Halt(Halt::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_core::BlockSignal;

    #[test]
    fn zero_jitter_never_sleeps() {
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
        let max = Duration::from_millis(800);
        for _ in 0..100 {
            assert!(random_jitter(max) <= max);
        }
    }

    #[test]
    fn network_errors_are_transient_others_fail() {
        assert!(matches!(
            classify_search(Err(CollaboratorError::Network("reset".into()))),
            Attempt::Transient(_)
        ));
        assert_eq!(
            classify_search(Err(CollaboratorError::Other("bad markup".into()))),
            Attempt::Ready(Step::Halt(Halt::Failure("bad markup".into())))
        );
        assert_eq!(
            classify_search(Ok(SearchOutcome::NotFound)),
            Attempt::Ready(Step::Halt(Halt::Missing))
        );
    }

    #[test]
    fn detail_block_status_is_transient() {
        let blocked = classify_detail(Ok(DetailOutcome::Error {
            message: "busy".into(),
            status: Some(503),
        }));
        assert_eq!(blocked, Attempt::Transient("blocked, status=503".into()));
        let marker = classify_detail(Ok(DetailOutcome::Blocked(BlockSignal::Marker)));
        assert_eq!(marker, Attempt::Transient("blocked, status=blocked".into()));
        let parse = classify_detail(Ok(DetailOutcome::Error {
            message: "no body".into(),
            status: None,
        }));
        assert_eq!(parse, Attempt::Ready(Step::Halt(Halt::Failure("no body".into()))));
    }
}
