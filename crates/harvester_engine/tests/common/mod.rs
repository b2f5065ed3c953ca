#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use harvester_core::{BlockSignal, DetailOutcome, Locator, ResolvedRecord, SearchOutcome};
use harvester_engine::{
    CollaboratorError, Collaborators, DetailFetcher, HarvestSettings, ItemSource, RecordSink,
    Searcher,
};
use tokio_util::sync::CancellationToken;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

pub fn labels(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("w{i}")).collect()
}

/// Fast settings rooted in `dir`: no jitter, 1s/2s backoff, small writer batches.
pub fn settings_in(dir: &Path, batch_size: usize) -> HarvestSettings {
    HarvestSettings {
        name: "test".to_string(),
        base_dir: dir.to_path_buf(),
        label_key: "word".to_string(),
        batch_size,
        jitter_max_secs: 0.0,
        persist_batch_size: 2,
        persist_flush_interval_secs: 0.2,
        writer_poll_secs: 0.05,
        graceful_wait_secs: 3.0,
        backoff_base_secs: 1.0,
        backoff_cap_secs: 2.0,
        ..HarvestSettings::default()
    }
}

pub struct StubSource(pub Vec<String>);

#[async_trait::async_trait]
impl ItemSource for StubSource {
    async fn list_items(&self) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.0.clone())
    }
}

/// Scripted search and detail collaborator.
///
/// Labels resolve to `loc:<label>` and a record carrying the label unless a
/// script says otherwise. Every call is recorded.
#[derive(Default)]
pub struct StubResolver {
    pub search_script: Mutex<HashMap<String, Vec<Result<SearchOutcome, CollaboratorError>>>>,
    pub detail_script: Mutex<HashMap<String, Vec<Result<DetailOutcome, CollaboratorError>>>>,
    /// Detail answer repeated forever for these labels.
    pub detail_always: Mutex<HashMap<String, DetailOutcome>>,
    pub not_found: Mutex<HashSet<String>>,
    pub searches: Mutex<Vec<String>>,
    pub details: Mutex<Vec<String>>,
    /// Cancels the token when this label is searched.
    pub cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl StubResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn always_blocked(&self, label: &str) {
        self.detail_always.lock().unwrap().insert(
            label.to_string(),
            DetailOutcome::Blocked(BlockSignal::Status(429)),
        );
    }

    pub fn missing(&self, label: &str) {
        self.not_found.lock().unwrap().insert(label.to_string());
    }

    pub fn script_search(
        &self,
        label: &str,
        answers: Vec<Result<SearchOutcome, CollaboratorError>>,
    ) {
        self.search_script
            .lock()
            .unwrap()
            .insert(label.to_string(), answers);
    }

    pub fn script_detail(
        &self,
        label: &str,
        answers: Vec<Result<DetailOutcome, CollaboratorError>>,
    ) {
        self.detail_script
            .lock()
            .unwrap()
            .insert(label.to_string(), answers);
    }

    pub fn cancel_when_searching(&self, label: &str, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((label.to_string(), token));
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn details(&self) -> Vec<String> {
        self.details.lock().unwrap().clone()
    }
}

fn pop_script<T>(script: &Mutex<HashMap<String, Vec<T>>>, label: &str) -> Option<T> {
    let mut script = script.lock().unwrap();
    let answers = script.get_mut(label)?;
    if answers.is_empty() {
        None
    } else {
        Some(answers.remove(0))
    }
}

#[async_trait::async_trait]
impl Searcher for StubResolver {
    async fn search(
        &self,
        label: &str,
        _delay: Duration,
    ) -> Result<SearchOutcome, CollaboratorError> {
        self.searches.lock().unwrap().push(label.to_string());
        if let Some((trigger, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if trigger == label {
                token.cancel();
            }
        }
        if let Some(answer) = pop_script(&self.search_script, label) {
            return answer;
        }
        if self.not_found.lock().unwrap().contains(label) {
            return Ok(SearchOutcome::NotFound);
        }
        Ok(SearchOutcome::Found(Locator::new(format!("loc:{label}"))))
    }
}

#[async_trait::async_trait]
impl DetailFetcher for StubResolver {
    async fn fetch_detail(
        &self,
        locator: &Locator,
        _delay: Duration,
    ) -> Result<DetailOutcome, CollaboratorError> {
        let label = locator.as_str().trim_start_matches("loc:").to_string();
        self.details.lock().unwrap().push(label.clone());
        if let Some(answer) = pop_script(&self.detail_script, &label) {
            return answer;
        }
        if let Some(outcome) = self.detail_always.lock().unwrap().get(&label) {
            return Ok(outcome.clone());
        }
        Ok(DetailOutcome::Record(
            ResolvedRecord::new(None).with_field("word", label.as_str()),
        ))
    }
}

/// Sink keeping every successful save in memory.
#[derive(Default)]
pub struct MemorySink {
    pub saved: Mutex<Vec<ResolvedRecord>>,
    pub refuse: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self, label: &str) {
        self.refuse.lock().unwrap().insert(label.to_string());
    }

    pub fn saved_labels(&self) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.label.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RecordSink for MemorySink {
    async fn save(&self, record: &ResolvedRecord) -> Result<bool, CollaboratorError> {
        self.calls.lock().unwrap().push(record.label.clone());
        if self.refuse.lock().unwrap().contains(&record.label) {
            return Ok(false);
        }
        self.saved.lock().unwrap().push(record.clone());
        Ok(true)
    }
}

pub fn collaborators(
    items: Vec<String>,
    resolver: &Arc<StubResolver>,
    sink: &Arc<MemorySink>,
) -> Collaborators {
    Collaborators {
        source: Arc::new(StubSource(items)),
        searcher: resolver.clone(),
        detail: resolver.clone(),
        sink: sink.clone(),
    }
}
