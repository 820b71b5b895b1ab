use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::api::{ApiClient, ItemsQuery};
use crate::config::Config;
use crate::error::Result;
use crate::models::{Category, Data, Feed, FilteredData, Filters, Updates};
use crate::services::{LoadingTracker, Notices};
use crate::store::{DataStore, FetchPlan, FilteredUpdates, UpdateBus};

/// The one long-lived context of a client session. Owns the API client
/// and the cache store and is shared (via `Arc`) by every consumer;
/// exactly one is constructed per session and it is never torn down
/// while the client runs.
///
/// The store mutex is only ever held for synchronous cache work, never
/// across an await, so handlers interleaving at suspension points always
/// observe a consistent cache.
pub struct Session {
    api: ApiClient,
    store: Mutex<DataStore>,
    bus: Arc<UpdateBus>,
    loading: Arc<LoadingTracker>,
    notices: Notices,
}

impl Session {
    /// Connects and performs the initial state load.
    pub async fn connect(config: &Config) -> Result<Arc<Self>> {
        let api = ApiClient::new(config)?;
        let bus = Arc::new(UpdateBus::new());
        let session = Arc::new(Self {
            api,
            store: Mutex::new(DataStore::new(Arc::clone(&bus))),
            bus,
            loading: LoadingTracker::new(),
            notices: Notices::new(),
        });

        session.initial_load().await?;
        Ok(session)
    }

    async fn initial_load(&self) -> Result<()> {
        let _guard = self.loading.start();
        let state = match self.api.initial_state().await {
            Ok(state) => state,
            Err(e) => {
                self.notices.error(format!("Initial load failed: {e}"));
                return Err(e);
            }
        };
        info!(
            timestamp = state.timestamp,
            feeds = state.feeds.len(),
            "connected"
        );
        self.store.lock().unwrap().apply_initial(state);
        Ok(())
    }

    /// Polls the server for deltas since the current sync watermark and
    /// folds them in, running any backfills the merge exposes.
    ///
    /// Transport failures become notices and leave the cache untouched;
    /// only staleness (`must_refresh`) propagates, because the session
    /// cannot continue past it.
    pub async fn refresh(&self) -> Result<()> {
        let timestamp = self.store.lock().unwrap().timestamp();
        if timestamp == -1 {
            return Ok(());
        }

        let _guard = self.loading.start();
        let su = match self.api.server_updates(timestamp).await {
            Ok(su) => su,
            Err(e) => {
                self.notices.error(format!("Refresh failed: {e}"));
                return Ok(());
            }
        };

        let outcome = {
            let mut store = self.store.lock().unwrap();
            store.apply_server_updates(su)?
        };
        debug!(
            changed = outcome.changed,
            plans = outcome.plans.len(),
            "refresh applied"
        );
        self.run_plans(outcome.plans).await;
        Ok(())
    }

    /// Pushes a locally-originated update through the merge pipeline.
    pub(crate) async fn apply_local(&self, u: Updates) {
        let plans = {
            let mut store = self.store.lock().unwrap();
            store.push_updates(u).plans
        };
        self.run_plans(plans).await;
    }

    /// Executes fetch plans until none remain. Responses can expose
    /// further gaps (a re-enabled feed arriving inside a backfill), but
    /// the metadata latches guarantee the worklist converges.
    pub(crate) async fn run_plans(&self, mut plans: Vec<FetchPlan>) {
        while !plans.is_empty() {
            let batch = std::mem::take(&mut plans);
            let follow_ups: Vec<Vec<FetchPlan>> = stream::iter(batch)
                .map(|plan| async move {
                    let query = plan.query();
                    self.fetch_items(&query).await
                })
                .buffer_unordered(4) // Max 4 concurrent fetches
                .collect()
                .await;
            plans.extend(follow_ups.into_iter().flatten());
        }
    }

    async fn fetch_items(&self, query: &ItemsQuery) -> Vec<FetchPlan> {
        let _guard = self.loading.start();
        match self.api.get_items(query).await {
            Ok(response) => {
                let mut store = self.store.lock().unwrap();
                store.apply_items_response(query, response).plans
            }
            Err(e) => {
                self.notices.error(format!("Fetching items failed: {e}"));
                Vec::new()
            }
        }
    }

    /// Fetches the next page of read history for a feed. Returns whether
    /// the feed's read history is now fully held.
    pub async fn fetch_more_read_for_feed(&self, feed_id: i64) -> bool {
        let query = self.store.lock().unwrap().plan_more_read_for_feed(feed_id);
        if let Some(query) = query {
            let follow_up = self.fetch_items(&query).await;
            self.run_plans(follow_up).await;
        }
        self.store.lock().unwrap().has_all_read(feed_id)
    }

    pub async fn fetch_more_read_for_category(&self, category_id: i64) -> bool {
        let query = self
            .store
            .lock()
            .unwrap()
            .plan_more_read_for_category(category_id);
        if let Some(query) = query {
            let follow_up = self.fetch_items(&query).await;
            self.run_plans(follow_up).await;
        }
        self.store.lock().unwrap().has_all_read_category(category_id)
    }

    // Cache reads. All go through the store so the unchanged-snapshot
    // contract holds; none expose the metadata maps directly.

    pub fn data_for_filters(&self, filters: &Filters) -> FilteredData {
        self.store.lock().unwrap().data_for_filters(filters)
    }

    pub fn snapshot(&self) -> Arc<Data> {
        self.store.lock().unwrap().data()
    }

    pub fn feed(&self, id: i64) -> Result<Feed> {
        let result = self.store.lock().unwrap().feed(id);
        if let Err(e) = &result {
            self.notices.error(format!("{e}"));
        }
        result
    }

    pub fn category(&self, id: i64) -> Option<Category> {
        self.store.lock().unwrap().category(id)
    }

    pub fn initial_timestamp_for_feed(&self, id: i64) -> Option<chrono::DateTime<chrono::Utc>> {
        self.store.lock().unwrap().initial_timestamp_for_feed(id)
    }

    pub fn has_all_read(&self, feed_id: i64) -> bool {
        self.store.lock().unwrap().has_all_read(feed_id)
    }

    // Bus access.

    /// The current snapshot plus a delta stream that starts after it; a
    /// late subscriber bootstraps from the snapshot without racing the
    /// bus.
    pub fn subscribe(&self) -> (Arc<Data>, broadcast::Receiver<Updates>) {
        self.bus.subscribe()
    }

    pub fn updates(&self) -> broadcast::Receiver<Updates> {
        self.bus.updates()
    }

    pub fn feed_updates(&self) -> FilteredUpdates {
        self.bus.feed_updates()
    }

    pub fn category_updates(&self) -> FilteredUpdates {
        self.bus.category_updates()
    }

    pub fn loading(&self) -> &Arc<LoadingTracker> {
        &self.loading
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub(crate) fn api(&self) -> &ApiClient {
        &self.api
    }
}
