use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::api::{CurrentState, ItemsQuery, ItemsResponse, ServerUpdates};
use crate::error::{AppError, Result};
use crate::models::{Category, Data, Feed, FilteredData, Filters, Item, Updates};

use super::bus::UpdateBus;
use super::metadata::{CategoryMetadata, FeedMetadata};

/// Read history is fetched in pages of this many items. A response
/// shorter than the requested count is the only termination signal; the
/// server sends no total.
pub const READ_PAGE_SIZE: u32 = 100;

/// A fetch the store has decided must happen to fill a known gap. The
/// store never performs IO itself; whoever drives it executes these and
/// feeds the responses back through `apply_items_response`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPlan {
    /// Unread items for feeds whose unread coverage is unconfirmed.
    /// Always one plan per merge cycle, keyed by the distinct feed set.
    Unread { feed_ids: Vec<i64> },
    /// Read items from `after` forward, for feeds that joined a view
    /// whose read history is already materialized back to `after`.
    ReadSince {
        feed_ids: Vec<i64>,
        after: DateTime<Utc>,
    },
}

impl FetchPlan {
    pub fn query(&self) -> ItemsQuery {
        match self {
            FetchPlan::Unread { feed_ids } => ItemsQuery::unread_for_feeds(feed_ids.clone()),
            FetchPlan::ReadSince { feed_ids, after } => ItemsQuery {
                feed_ids: feed_ids.clone(),
                read_after: Some(*after),
                ..ItemsQuery::default()
            },
        }
    }
}

/// What applying one update cycle did.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub changed: bool,
    /// The broadcast carried the full entity set instead of the delta.
    pub replayed: bool,
    pub plans: Vec<FetchPlan>,
}

#[derive(Default)]
struct MetadataDelta {
    must_replay: bool,
    backfill_unread: HashSet<i64>,
    backfill_read: HashSet<i64>,
}

/// The single owner of the mutable cache: the merged `Data`, the sync
/// watermark, and the per-feed/per-category metadata describing what the
/// server is known to have already supplied.
///
/// Every mutation happens synchronously inside one call; callers must
/// not hold a reference across an await. External reads go through
/// `data_for_filters` rather than the metadata maps so the
/// unchanged-`Arc` fast path stays intact for consumers.
pub struct DataStore {
    timestamp: i64,
    data: Arc<Data>,
    feed_metadata: HashMap<i64, FeedMetadata>,
    category_metadata: HashMap<i64, CategoryMetadata>,
    /// Per-feed newest-item display hints from the initial load.
    initial_newest: HashMap<i64, DateTime<Utc>>,
    bus: Arc<UpdateBus>,
}

impl DataStore {
    pub fn new(bus: Arc<UpdateBus>) -> Self {
        Self {
            timestamp: -1,
            data: Arc::new(Data::default()),
            feed_metadata: HashMap::new(),
            category_metadata: HashMap::new(),
            initial_newest: HashMap::new(),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<UpdateBus> {
        &self.bus
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn data(&self) -> Arc<Data> {
        Arc::clone(&self.data)
    }

    pub fn data_for_filters(&self, filters: &Filters) -> FilteredData {
        FilteredData::new(self.data.filter(filters), filters.clone())
    }

    /// The feed snapshot from metadata, which exists even for feeds that
    /// are currently filtered out of `Data`. Asking for a feed that was
    /// never sighted is a caller bug worth surfacing.
    pub fn feed(&self, id: i64) -> Result<Feed> {
        self.feed_metadata
            .get(&id)
            .map(|m| m.feed.clone())
            .ok_or(AppError::UnknownFeed(id))
    }

    pub fn category(&self, id: i64) -> Option<Category> {
        self.category_metadata.get(&id).map(|m| m.category.clone())
    }

    pub fn initial_timestamp_for_feed(&self, id: i64) -> Option<DateTime<Utc>> {
        self.initial_newest.get(&id).copied()
    }

    pub fn has_all_read(&self, feed_id: i64) -> bool {
        self.feed_metadata
            .get(&feed_id)
            .is_some_and(|m| m.all_read())
    }

    pub fn has_all_read_category(&self, category_id: i64) -> bool {
        self.category_metadata
            .get(&category_id)
            .is_some_and(|m| m.all_read())
    }

    /// Seeds the cache from the initial state fetch. Feeds present here
    /// are complete as of `state.timestamp`: their unread items were all
    /// delivered, their read history was not.
    pub fn apply_initial(&mut self, state: CurrentState) {
        self.timestamp = state.timestamp;
        self.initial_newest = state.newest_timestamps;
        self.data = Arc::new(Data {
            categories: state.categories,
            feeds: state.feeds,
            items: state.items,
        });

        for f in &self.data.feeds {
            self.feed_metadata
                .insert(f.id, FeedMetadata::new(f.clone(), true, false));
        }
        for c in &self.data.categories {
            self.category_metadata
                .insert(c.id, CategoryMetadata::new(c.clone()));
        }

        debug!(
            timestamp = self.timestamp,
            feeds = self.data.feeds.len(),
            items = self.data.items.len(),
            "initial state applied"
        );
        self.bus.publish_data(Arc::clone(&self.data));
    }

    /// Folds a delta poll response into the cache. `must_refresh` is
    /// fatal for the session; nothing is applied.
    pub fn apply_server_updates(&mut self, su: ServerUpdates) -> Result<ApplyOutcome> {
        if su.must_refresh {
            return Err(AppError::StaleClient);
        }
        let u = Updates::new(true, su.categories, su.feeds, su.items);
        let outcome = self.handle_updates(u, false);
        // Advance the watermark only after the merge so metadata seeded
        // during it still compares against the old sync point.
        if su.timestamp > self.timestamp {
            self.timestamp = su.timestamp;
        }
        Ok(outcome)
    }

    /// Entry point for locally-originated updates: optimistic mutations,
    /// their rollbacks, and authoritative mutation responses.
    pub fn push_updates(&mut self, u: Updates) -> ApplyOutcome {
        self.handle_updates(u, false)
    }

    /// Folds a backfill or read-page response back through the same
    /// pipeline as organic updates. Duplicate deliveries are idempotent:
    /// the second arrival changes nothing because commit timestamps no
    /// longer advance.
    pub fn apply_items_response(
        &mut self,
        query: &ItemsQuery,
        response: ItemsResponse,
    ) -> ApplyOutcome {
        let is_unread = query.unread;
        let u = Updates::new(false, Vec::new(), response.feeds, response.items);

        let delta = self.merge_metadata(&u, is_unread);

        // The fetch covered these feeds whether or not any items came
        // back; an empty response still confirms unread coverage.
        for fid in &query.feed_ids {
            if let Some(m) = self.feed_metadata.get_mut(fid) {
                if is_unread {
                    m.has_unread = true;
                }
            }
        }

        let watermarks_changed = self.apply_read_bookkeeping(query, &u.items);

        // A replay triggered by this response subsumes its own delta:
        // handle_updates broadcasts the full state once instead of the
        // delta plus a second full broadcast.
        let outcome = self.handle_updates(u, delta.must_replay);

        if watermarks_changed && !outcome.changed && !outcome.replayed {
            // Only coverage flags moved; consumers re-evaluate derived
            // state off an explicitly forced empty update.
            self.bus.publish_forced(Updates::empty(false));
        }

        outcome
    }

    fn handle_updates(&mut self, mut u: Updates, force_replay: bool) -> ApplyOutcome {
        let (merged, changed) = self.data.merge(&u, &Filters::default());
        let mut replayed = false;
        let mut plans = Vec::new();

        if changed {
            // Swap the snapshot in before broadcasting so snapshot
            // subscribers already see the post-merge state.
            self.data = merged;
            let delta = self.merge_metadata(&u, false);
            plans = self.plan_backfills(&delta);
            if delta.must_replay || force_replay {
                replayed = true;
                u = self.full_replay(u.refresh);
            }
            self.bus.publish_data(Arc::clone(&self.data));
        } else if force_replay {
            replayed = true;
            u = self.full_replay(u.refresh);
        } else {
            u = Updates::empty(u.refresh);
        }

        self.bus.publish(u);
        ApplyOutcome {
            changed,
            replayed,
            plans,
        }
    }

    fn full_replay(&self, refresh: bool) -> Updates {
        // Replays are rare; cloning the whole entity set is fine.
        Updates::new(
            refresh,
            self.data.categories.clone(),
            self.data.feeds.clone(),
            self.data.items.clone(),
        )
    }

    /// Applies an update's metadata transitions, reporting whether a
    /// replay is required and which feeds now have known gaps.
    fn merge_metadata(&mut self, u: &Updates, is_backfill: bool) -> MetadataDelta {
        let mut delta = MetadataDelta::default();

        for c in &u.categories {
            match self.category_metadata.get_mut(&c.id) {
                Some(m) => {
                    if m.category.commit_timestamp > c.commit_timestamp {
                        continue;
                    }
                    let old = std::mem::replace(&mut m.category, c.clone());
                    // Visibility transitions change filtered-view
                    // membership in ways a delta can't express.
                    if c.disabled != old.disabled
                        || c.hidden_main != old.hidden_main
                        || c.hidden_nav != old.hidden_nav
                    {
                        delta.must_replay = true;
                    }
                }
                None => {
                    self.category_metadata
                        .insert(c.id, CategoryMetadata::new(c.clone()));
                    delta.must_replay = true;
                }
            }
        }

        for f in &u.feeds {
            if let Some(m) = self.feed_metadata.get_mut(&f.id) {
                if is_backfill {
                    m.has_unread = true;
                }

                if m.feed.commit_timestamp > f.commit_timestamp {
                    continue;
                }
                let old = std::mem::replace(&mut m.feed, f.clone());

                if f.disabled {
                    continue;
                }

                if old.disabled {
                    delta.must_replay = true;
                    delta.backfill_read.insert(f.id);
                }

                if !m.has_unread {
                    delta.backfill_unread.insert(f.id);
                }

                if old.category_id != f.category_id {
                    delta.must_replay = true;
                    delta.backfill_read.insert(f.id);
                }
            } else {
                // Feeds created after the sync watermark arrive complete
                // through the normal delta stream; older feeds are not
                // assumed complete until backfilled.
                let fresh = f.create_timestamp >= self.timestamp;
                self.feed_metadata
                    .insert(f.id, FeedMetadata::new(f.clone(), is_backfill || fresh, fresh));

                if f.disabled {
                    continue;
                }

                if f.category_id.is_some() {
                    // Catches a feed that is created directly into a
                    // category a consumer may already be watching.
                    delta.must_replay = true;
                }

                if !is_backfill && !fresh {
                    delta.backfill_unread.insert(f.id);
                    delta.backfill_read.insert(f.id);
                }
            }
        }

        delta
    }

    fn plan_backfills(&self, delta: &MetadataDelta) -> Vec<FetchPlan> {
        let mut plans = Vec::new();

        if !delta.backfill_unread.is_empty() {
            let mut feed_ids: Vec<i64> = delta.backfill_unread.iter().copied().collect();
            feed_ids.sort_unstable();
            plans.push(FetchPlan::Unread { feed_ids });
        }

        // Read gaps only need filling where a view has already
        // materialized read history, tracked by category watermarks.
        let mut by_category: BTreeMap<i64, (DateTime<Utc>, Vec<i64>)> = BTreeMap::new();
        for &fid in &delta.backfill_read {
            let Some(fm) = self.feed_metadata.get(&fid) else {
                continue;
            };
            let Some(cid) = fm.feed.category_id else {
                continue;
            };
            let Some(after) = self
                .category_metadata
                .get(&cid)
                .and_then(|cm| cm.read_after())
            else {
                continue;
            };
            if fm.has_read_after(after) {
                continue;
            }
            by_category
                .entry(cid)
                .or_insert_with(|| (after, Vec::new()))
                .1
                .push(fid);
        }
        for (_, (after, mut feed_ids)) in by_category {
            feed_ids.sort_unstable();
            plans.push(FetchPlan::ReadSince { feed_ids, after });
        }

        if !plans.is_empty() {
            debug!(?plans, "backfill planned");
        }
        plans
    }

    /// Watermark effects of a read fetch: a page shorter than requested
    /// exhausts history, otherwise coverage extends to the oldest
    /// returned timestamp. Returns whether any coverage flag moved.
    fn apply_read_bookkeeping(&mut self, query: &ItemsQuery, items: &[Item]) -> bool {
        let mut changed = false;

        if let Some(count) = query.read_before_count {
            let oldest = items.iter().map(|i| i.timestamp).min();
            let short_page = (items.len() as u32) < count;

            if let Some(cid) = query.category_id {
                if let Some(cm) = self.category_metadata.get_mut(&cid) {
                    let before = (cm.all_read(), cm.read_after());
                    if let Some(oldest) = oldest {
                        cm.set_read_after(oldest);
                    }
                    if short_page {
                        cm.mark_all_read();
                    }
                    changed |= before != (cm.all_read(), cm.read_after());
                }
            }
            for fid in &query.feed_ids {
                if let Some(fm) = self.feed_metadata.get_mut(fid) {
                    let before = (fm.all_read(), fm.read_after());
                    if let Some(oldest) = oldest {
                        fm.set_read_after(oldest);
                    }
                    if short_page {
                        fm.mark_all_read();
                    }
                    changed |= before != (fm.all_read(), fm.read_after());
                }
            }
        } else if let Some(after) = query.read_after {
            for fid in &query.feed_ids {
                if let Some(fm) = self.feed_metadata.get_mut(fid) {
                    if !fm.has_read_after(after) {
                        fm.set_read_after(after);
                        changed = true;
                    }
                }
            }
            if let Some(cid) = query.category_id {
                if let Some(cm) = self.category_metadata.get_mut(&cid) {
                    if !cm.has_read_after(after) {
                        cm.set_read_after(after);
                        changed = true;
                    }
                }
            }
        }

        changed
    }

    /// The next read-history page for a feed, or `None` once everything
    /// is held.
    pub fn plan_more_read_for_feed(&self, feed_id: i64) -> Option<ItemsQuery> {
        let fm = self.feed_metadata.get(&feed_id)?;
        if fm.all_read() {
            return None;
        }
        let before = fm.read_after().unwrap_or_else(Utc::now);
        Some(ItemsQuery::read_before_feed(feed_id, before, READ_PAGE_SIZE))
    }

    pub fn plan_more_read_for_category(&self, category_id: i64) -> Option<ItemsQuery> {
        let cm = self.category_metadata.get(&category_id)?;
        if cm.all_read() {
            return None;
        }
        let before = cm.read_after().unwrap_or_else(Utc::now);
        Some(ItemsQuery::read_before_category(
            category_id,
            before,
            READ_PAGE_SIZE,
        ))
    }
}
