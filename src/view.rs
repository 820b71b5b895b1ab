use std::cmp::Ordering;

use tracing::warn;

use crate::models::{Category, FilteredData, Filters, Item, Updates};

/// Display order for items: newest publish time first, ties broken by
/// higher id first.
pub fn compare_items(a: &Item, b: &Item) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id))
}

/// Nav order for categories: explicit sort positions first in position
/// order, then the rest by id.
pub fn compare_categories(a: &Category, b: &Category) -> Ordering {
    match (a.sort_position, b.sort_position) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    }
}

pub fn sort_items(items: &[Item]) -> Vec<Item> {
    let mut sorted = items.to_vec();
    sorted.sort_by(compare_items);
    sorted
}

/// One view's item list: a `FilteredData` under the view's filters plus
/// the display-sorted materialization of its items.
///
/// Deltas are folded in through the filtered merge; when the item set
/// membership is unchanged and the delta is small the sorted list is
/// patched in place instead of re-sorted. A patch that doesn't line up
/// against the sorted list falls back to a full re-sort; that fallback
/// is a consistency safety net only and never signals missing data.
pub struct ItemPanel {
    filtered: FilteredData,
    sorted_items: Vec<Item>,
}

impl ItemPanel {
    pub fn new(filtered: FilteredData) -> Self {
        let sorted_items = sort_items(filtered.items());
        Self {
            filtered,
            sorted_items,
        }
    }

    pub fn empty() -> Self {
        Self::new(FilteredData::empty())
    }

    /// Replaces the backing view, e.g. after a navigation changed the
    /// filters.
    pub fn set_data(&mut self, filtered: FilteredData) {
        self.sorted_items = sort_items(filtered.items());
        self.filtered = filtered;
    }

    pub fn filters(&self) -> &Filters {
        &self.filtered.filters
    }

    pub fn filtered(&self) -> &FilteredData {
        &self.filtered
    }

    pub fn items(&self) -> &[Item] {
        &self.sorted_items
    }

    /// The mark-read fence for a single-feed view: the highest item id
    /// on display, meaningless once everything shown is read.
    pub fn max_item_id(&self) -> Option<i64> {
        if self.filtered.items().iter().any(|i| !i.read) {
            self.filtered.items().last().map(|i| i.id)
        } else {
            None
        }
    }

    /// Folds a delta in. Returns whether anything on display changed.
    pub fn apply_updates(&mut self, u: &Updates) -> bool {
        let old_len = self.filtered.items().len();
        let (filtered, changed) = self.filtered.merge(u);
        if !changed {
            return false;
        }

        let fast_path = !u.refresh
            && old_len == filtered.items().len()
            && u.items.len() < self.sorted_items.len();
        self.filtered = filtered;

        if !fast_path || !self.merge_sorted(&u.items) {
            if fast_path {
                warn!(
                    updates = u.items.len(),
                    "sorted item view out of sync with update, re-sorting"
                );
            }
            self.sorted_items = sort_items(self.filtered.items());
        }
        true
    }

    /// Patches updated items into the sorted list in place. Fails (for
    /// the caller to re-sort) when an update doesn't line up against the
    /// current sorted positions.
    fn merge_sorted(&mut self, items: &[Item]) -> bool {
        let mut incoming: Vec<&Item> = items.iter().collect();
        incoming.sort_by(|a, b| compare_items(a, b));

        let mut i = 0;
        for nit in incoming {
            loop {
                let Some(sit) = self.sorted_items.get(i) else {
                    return false;
                };
                match compare_items(nit, sit) {
                    Ordering::Greater => i += 1,
                    Ordering::Equal => {
                        if nit.commit_timestamp >= sit.commit_timestamp {
                            self.sorted_items[i] = nit.clone();
                        }
                        break;
                    }
                    // The update sorts somewhere we hold no item.
                    Ordering::Less => return false,
                }
            }
        }
        true
    }
}
