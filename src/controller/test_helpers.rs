//! Shared fixtures for controller tests.

use crate::config::Config;
use crate::error::{Error, Result, UpstreamError};
use crate::search::{ItemDetails, ItemRef, SearchProvider, SearchQuery, SearchSession};
use crate::storage::MemoryStore;
use crate::types::{JobStatus, Progress};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::JobController;

type UnitKey = (String, String);

#[derive(Default)]
struct FakeState {
    items_per_search: usize,
    results: HashMap<UnitKey, usize>,
    search_failures: HashMap<UnitKey, VecDeque<UpstreamError>>,
    denied_items: HashSet<String>,
    searches: Vec<UnitKey>,
    item_delay: Duration,
}

/// Scriptable search provider with failure injection
///
/// Every search returns `items_per_search` synthetic items unless overridden
/// per (scope, query). Item ids are `"{scope}:{query}:{n}"`.
#[derive(Clone, Default)]
pub(crate) struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    missing_credentials: Arc<AtomicBool>,
}

impl FakeProvider {
    pub(crate) fn new(items_per_search: usize) -> Self {
        let provider = Self::default();
        provider.state.lock().unwrap().items_per_search = items_per_search;
        provider
    }

    pub(crate) fn with_results(self, scope: &str, query: &str, items: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .results
            .insert((scope.to_string(), query.to_string()), items);
        self
    }

    /// Queue a failure for the next search of (scope, query)
    pub(crate) fn fail_search(self, scope: &str, query: &str, error: UpstreamError) -> Self {
        self.state
            .lock()
            .unwrap()
            .search_failures
            .entry((scope.to_string(), query.to_string()))
            .or_default()
            .push_back(error);
        self
    }

    pub(crate) fn deny_item(self, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .denied_items
            .insert(id.to_string());
        self
    }

    /// Sleep before answering each details fetch
    pub(crate) fn with_item_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().item_delay = delay;
        self
    }

    pub(crate) fn without_credentials(self) -> Self {
        self.missing_credentials.store(true, Ordering::SeqCst);
        self
    }

    /// Every (scope, query) searched, including failed attempts
    pub(crate) fn searches(&self) -> Vec<UnitKey> {
        self.state.lock().unwrap().searches.clone()
    }

    pub(crate) fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for FakeProvider {
    async fn open_session(&self) -> Result<Box<dyn SearchSession>> {
        if self.missing_credentials.load(Ordering::SeqCst) {
            return Err(Error::ConfigurationMissing {
                key: "REDDIT_CLIENT_ID".to_string(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            provider: self.clone(),
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeSession {
    provider: FakeProvider,
}

#[async_trait]
impl SearchSession for FakeSession {
    async fn search(&self, query: &SearchQuery) -> std::result::Result<Vec<ItemRef>, UpstreamError> {
        let key = (query.scope.clone(), query.query.clone());
        let mut state = self.provider.state.lock().unwrap();
        state.searches.push(key.clone());

        if let Some(error) = state
            .search_failures
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        let count = state
            .results
            .get(&key)
            .copied()
            .unwrap_or(state.items_per_search);
        let count = query.limit.map_or(count, |l| count.min(l as usize));

        Ok((0..count)
            .map(|n| ItemRef {
                id: format!("{}:{}:{}", query.scope, query.query, n),
                scope: query.scope.clone(),
            })
            .collect())
    }

    async fn load_details(&self, item: &ItemRef) -> std::result::Result<ItemDetails, UpstreamError> {
        let (delay, denied) = {
            let state = self.provider.state.lock().unwrap();
            (state.item_delay, state.denied_items.contains(&item.id))
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if denied {
            return Err(UpstreamError::AccessDenied { status: 403 });
        }

        Ok(ItemDetails {
            id: item.id.clone(),
            scope: item.scope.clone(),
            title: format!("About {}", item.id),
            url: format!("https://example.com/{}", item.id),
            text: "text".to_string(),
            score: 5,
            upvote_ratio: Some(0.75),
            created_utc: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        })
    }

    async fn comment_bodies(&self, item: &ItemRef) -> std::result::Result<Vec<String>, UpstreamError> {
        Ok(vec![format!("comment on {}", item.id), String::new()])
    }

    async fn close(&self) {
        self.provider.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Configuration with millisecond-scale retries and polling
pub(crate) fn fast_config(chunk_rows: usize) -> Config {
    let mut config = Config::default();
    config.storage.chunk_rows = chunk_rows;
    config.job.pause_poll_interval = Duration::from_millis(5);
    config.job.shutdown_timeout = Duration::from_secs(2);
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config.retry.rate_limit_margin = Duration::from_millis(1);
    config.retry.max_attempts = 3;
    config
}

/// Controller over a fresh `MemoryStore` and the given provider
pub(crate) fn create_test_controller(
    config: Config,
    provider: FakeProvider,
) -> (JobController, MemoryStore) {
    let store = MemoryStore::new();
    let controller =
        JobController::new(config, Arc::new(store.clone()), Arc::new(provider)).unwrap();
    (controller, store)
}

/// Poll until the job leaves the active states
pub(crate) async fn wait_for_terminal(controller: &JobController) -> Progress {
    wait_for(controller, |p| {
        !p.status.is_active() && p.status != JobStatus::Idle
    })
    .await
}

/// Poll until `predicate` holds, failing the test after 10 seconds
pub(crate) async fn wait_for(
    controller: &JobController,
    predicate: impl Fn(&Progress) -> bool,
) -> Progress {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let progress = controller.progress().await;
        if predicate(&progress) {
            return progress;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting; last progress: {progress:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Parse a stored CSV object into records (no header handling)
pub(crate) async fn read_csv(store: &MemoryStore, path: &str) -> Vec<csv::StringRecord> {
    use crate::storage::ObjectStore;

    let bytes = store.get(path).await.unwrap();
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(bytes.as_slice())
        .records()
        .map(|r| r.unwrap())
        .collect()
}
