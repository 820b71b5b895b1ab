use std::sync::Arc;

use super::entities::{Category, Entity, Feed, Item};
use super::filter::{DataFilter, Filters};

/// A sparse delta against the cache. Every change of any kind, server
/// pushed or locally originated, is expressed as one of these.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates {
    /// Whether this came from a user-triggered refresh.
    pub refresh: bool,
    pub categories: Vec<Category>,
    pub feeds: Vec<Feed>,
    pub items: Vec<Item>,
}

impl Updates {
    pub fn new(
        refresh: bool,
        categories: Vec<Category>,
        feeds: Vec<Feed>,
        items: Vec<Item>,
    ) -> Self {
        Self {
            refresh,
            categories,
            feeds,
            items,
        }
    }

    pub fn empty(refresh: bool) -> Self {
        Self {
            refresh,
            ..Self::default()
        }
    }

    pub fn item(item: Item) -> Self {
        Self {
            items: vec![item],
            ..Self::default()
        }
    }

    pub fn items(items: Vec<Item>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn feed(feed: Feed) -> Self {
        Self {
            feeds: vec![feed],
            ..Self::default()
        }
    }

    pub fn category(category: Category) -> Self {
        Self {
            categories: vec![category],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.refresh
            && self.categories.is_empty()
            && self.feeds.is_empty()
            && self.items.is_empty()
    }
}

/// The cached entity sets. All three sequences are sorted by id in
/// strictly ascending order.
///
/// `Data` is always handled through an `Arc`: a merge that changes
/// nothing hands back the same allocation, which consumers rely on
/// (via `Arc::ptr_eq`) to skip re-render and re-sort work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data {
    pub categories: Vec<Category>,
    pub feeds: Vec<Feed>,
    pub items: Vec<Item>,
}

/// Merges an id-ascending update sequence into an id-ascending existing
/// sequence. Most merges are a small number of updates into a larger
/// list, and tend toward the newer end of it.
///
/// When both sides hold the same id the copy with the lower commit
/// timestamp loses. The loser is not silently dropped: a stale echo of a
/// still-valid record goes through `keep` like any other existing entity.
/// An update identical to the cached record is treated as the cached
/// record, so redelivering the same update never reports a change.
fn merge_entities<'f, T: Entity + PartialEq>(
    existing: &[T],
    updates: &[T],
    df: &mut DataFilter<'f>,
    keep: fn(&mut DataFilter<'f>, &T) -> bool,
    admit: fn(&mut DataFilter<'f>, &T) -> bool,
) -> (Vec<T>, bool) {
    let mut merged: Vec<T> = Vec::with_capacity(existing.len() + updates.len());
    let mut changed = false;
    let mut di = 0;

    for ue in updates {
        while di < existing.len() && existing[di].id() < ue.id() {
            let de = &existing[di];
            if keep(df, de) {
                merged.push(de.clone());
            } else {
                changed = true;
            }
            di += 1;
        }

        if di < existing.len() && existing[di].id() == ue.id() {
            let de = &existing[di];
            di += 1;
            if ue.commit_timestamp() < de.commit_timestamp() || ue == de {
                if keep(df, de) {
                    merged.push(de.clone());
                    continue;
                }
            } else if keep(df, ue) {
                merged.push(ue.clone());
            }
            changed = true;
        } else if admit(df, ue) {
            changed = true;
            merged.push(ue.clone());
        }
    }

    while di < existing.len() {
        let de = &existing[di];
        if keep(df, de) {
            merged.push(de.clone());
        } else {
            changed = true;
        }
        di += 1;
    }

    (merged, changed)
}

impl Data {
    pub fn find_category(&self, id: i64) -> Option<&Category> {
        self.categories
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|idx| &self.categories[idx])
    }

    pub fn find_feed(&self, id: i64) -> Option<&Feed> {
        self.feeds
            .binary_search_by_key(&id, |f| f.id)
            .ok()
            .map(|idx| &self.feeds[idx])
    }

    pub fn find_item(&self, id: i64) -> Option<&Item> {
        self.items
            .binary_search_by_key(&id, |i| i.id)
            .ok()
            .map(|idx| &self.items[idx])
    }

    /// The result of filtering this data, discarding the changed flag.
    pub fn filter(self: &Arc<Self>, filters: &Filters) -> Arc<Data> {
        self.merge(&Updates::empty(true), filters).0
    }

    /// Merges `u` into this data under `filters`, returning the result
    /// and whether anything changed. An unchanged merge returns this
    /// exact `Arc`.
    ///
    /// Tiers are merged categories first, then feeds, then items; the
    /// filter state built by each tier gates the next. An excluded tier
    /// is not merged and contributes an empty sequence to any rebuilt
    /// `Data`.
    pub fn merge(self: &Arc<Self>, u: &Updates, filters: &Filters) -> (Arc<Data>, bool) {
        let mut df = DataFilter::new(u.refresh, filters);
        let mut categories = Vec::new();
        let mut feeds = Vec::new();
        let mut items = Vec::new();
        let mut changed = false;

        if !filters.exclude_categories {
            let (merged, c) = merge_entities(
                &self.categories,
                &u.categories,
                &mut df,
                DataFilter::keep_existing_category,
                DataFilter::admit_new_category,
            );
            categories = merged;
            changed = changed || c;
        }
        if !filters.exclude_feeds {
            let (merged, c) = merge_entities(
                &self.feeds,
                &u.feeds,
                &mut df,
                DataFilter::keep_existing_feed,
                DataFilter::admit_new_feed,
            );
            feeds = merged;
            changed = changed || c;
        }
        if !filters.exclude_items {
            let (merged, c) = merge_entities(
                &self.items,
                &u.items,
                &mut df,
                DataFilter::keep_existing_item,
                DataFilter::admit_new_item,
            );
            items = merged;
            changed = changed || c;
        }

        if !changed {
            return (Arc::clone(self), false);
        }
        (
            Arc::new(Data {
                categories,
                feeds,
                items,
            }),
            true,
        )
    }
}

/// A `Data` snapshot bound to the filters that produced it, so deltas can
/// keep being folded in under the same view.
#[derive(Debug, Clone)]
pub struct FilteredData {
    data: Arc<Data>,
    pub filters: Filters,
}

impl FilteredData {
    pub fn new(data: Arc<Data>, filters: Filters) -> Self {
        Self { data, filters }
    }

    /// A filtered view that matches nothing and never changes.
    pub fn empty() -> Self {
        Self {
            data: Arc::new(Data::default()),
            filters: Filters::exclude_all(),
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.data.categories
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.data.feeds
    }

    pub fn items(&self) -> &[Item] {
        &self.data.items
    }

    pub fn merge(&self, u: &Updates) -> (FilteredData, bool) {
        let (data, changed) = self.data.merge(u, &self.filters);
        if !changed {
            return (self.clone(), false);
        }
        (
            FilteredData {
                data,
                filters: self.filters.clone(),
            },
            true,
        )
    }
}
