use std::sync::Arc;
use std::time::Duration;

use harvester_core::{DetailOutcome, Locator, ResolvedRecord, SearchOutcome};
use thiserror::Error;

/// Failure raised by a collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Connection-level trouble; retried with backoff.
    #[error("network error: {0}")]
    Network(String),
    /// Anything else; recorded as a per-item failure.
    #[error("{0}")]
    Other(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Network(_))
    }
}

/// Produces the ordered list of work item labels.
#[async_trait::async_trait]
pub trait ItemSource: Send + Sync {
    async fn list_items(&self) -> Result<Vec<String>, CollaboratorError>;
}

/// Resolves a work item label to the locator of its detail record.
#[async_trait::async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, label: &str, delay: Duration)
        -> Result<SearchOutcome, CollaboratorError>;
}

/// Fetches and parses the detail record behind a locator.
#[async_trait::async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(
        &self,
        locator: &Locator,
        delay: Duration,
    ) -> Result<DetailOutcome, CollaboratorError>;
}

/// Durable store for resolved records.
///
/// `save` must be an idempotent upsert: the engine delivers at least once.
#[async_trait::async_trait]
pub trait RecordSink: Send + Sync {
    async fn save(&self, record: &ResolvedRecord) -> Result<bool, CollaboratorError>;
}

/// The external collaborators of one harvesting domain.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn ItemSource>,
    pub searcher: Arc<dyn Searcher>,
    pub detail: Arc<dyn DetailFetcher>,
    pub sink: Arc<dyn RecordSink>,
}
