use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::entities::{Category, Feed, Item};

/// Declarative filters for applying updates or filtering cached data.
/// Pure data with structural equality; two equal filters are
/// interchangeable for no-op detection. By default everything is kept
/// unconditionally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    /// Discard all invalid (disabled, read, etc) feeds or items.
    /// Unread items for discarded feeds are also "invalid".
    pub valid_only: bool,
    /// Exclude items that have been read.
    pub unread_only: bool,
    pub is_main_view: bool,
    /// Keep existing entities unconditionally on non-refresh updates.
    /// Existing objects are kept and updated but new objects won't be
    /// added, which avoids unexpected UI shuffling. Only affects updates;
    /// meaningless without valid_only or unread_only.
    pub keep_unless_refresh: bool,
    /// A feed or category referenced directly is considered valid even if
    /// valid_only would exclude it. Feeds not included by either a
    /// category or directly by id will be excluded.
    pub category_name: Option<String>,
    pub feed_id: Option<i64>,
    pub item_ids: Vec<i64>,
    /// Exclude whole entity tiers, mostly for performance.
    /// These apply first and will break some other filters.
    pub exclude_categories: bool,
    pub exclude_feeds: bool,
    pub exclude_items: bool,
    /// Set by consumers that will never request new data on their own.
    pub do_not_fetch: bool,
}

impl Filters {
    /// Filters that match nothing, used by consumers before they have a
    /// real view to maintain.
    pub fn exclude_all() -> Self {
        Filters {
            exclude_categories: true,
            exclude_feeds: true,
            exclude_items: true,
            ..Filters::default()
        }
    }
}

/// Stateful keep/admit decision function for a single merge pass.
///
/// The pass must evaluate categories before feeds and feeds before items:
/// category decisions record exclusions consulted by the feed rules, and
/// feed admissions feed the item rules. A `DataFilter` is built per merge
/// invocation and must not be reused across merges.
pub struct DataFilter<'f> {
    f: &'f Filters,
    keep_existing: bool,
    item_ids: HashSet<i64>,
    excluded_categories: HashSet<i64>,
    included_feed_ids: HashSet<i64>,
    category_id: Option<i64>,
}

impl<'f> DataFilter<'f> {
    pub fn new(refresh: bool, f: &'f Filters) -> Self {
        Self {
            f,
            keep_existing: !refresh && f.keep_unless_refresh,
            item_ids: f.item_ids.iter().copied().collect(),
            excluded_categories: HashSet::new(),
            included_feed_ids: HashSet::new(),
            category_id: None,
        }
    }

    pub fn keep_existing_category(&mut self, c: &Category) -> bool {
        if let Some(name) = &self.f.category_name {
            if *name == c.name {
                self.category_id = Some(c.id);
                return true;
            }
            return false;
        }

        if self.keep_existing {
            return true;
        }

        self.admit_new_category(c)
    }

    pub fn admit_new_category(&mut self, c: &Category) -> bool {
        if let Some(name) = &self.f.category_name {
            if *name == c.name {
                self.category_id = Some(c.id);
                return true;
            }
            return false;
        }

        if !c.disabled && self.f.is_main_view && (c.hidden_main || c.hidden_nav) {
            // Hidden categories are only included when referenced
            // directly by name.
            self.excluded_categories.insert(c.id);
            return false;
        }

        !self.f.valid_only || !c.disabled
    }

    pub fn keep_existing_feed(&mut self, feed: &Feed) -> bool {
        if let Some(id) = self.f.feed_id {
            if id == feed.id {
                self.included_feed_ids.insert(feed.id);
                return true;
            }
            return false;
        }

        if self.category_id.is_some() && feed.category_id != self.category_id {
            return false;
        }

        if let Some(cid) = feed.category_id {
            if self.excluded_categories.contains(&cid) {
                return false;
            }
        }

        if self.keep_existing {
            self.included_feed_ids.insert(feed.id);
            return true;
        }

        self.admit_new_feed(feed)
    }

    pub fn admit_new_feed(&mut self, feed: &Feed) -> bool {
        if let Some(id) = self.f.feed_id {
            if id == feed.id {
                self.included_feed_ids.insert(feed.id);
                return true;
            }
            return false;
        }

        if self.f.valid_only && feed.disabled {
            return false;
        }

        if let Some(cid) = feed.category_id {
            if self.excluded_categories.contains(&cid) {
                return false;
            }
        }

        if self.f.category_name.is_some()
            && (self.category_id.is_none() || feed.category_id != self.category_id)
        {
            return false;
        }

        self.included_feed_ids.insert(feed.id);
        true
    }

    pub fn keep_existing_item(&mut self, item: &Item) -> bool {
        if (!self.included_feed_ids.is_empty() || self.category_id.is_some())
            && !self.included_feed_ids.contains(&item.feed_id)
        {
            return false;
        }

        if self.keep_existing {
            return true;
        }

        self.admit_new_item(item)
    }

    pub fn admit_new_item(&mut self, item: &Item) -> bool {
        if !self.item_ids.is_empty() && self.item_ids.contains(&item.id) {
            return true;
        }

        if self.f.unread_only && item.read {
            return false;
        }

        if !self.included_feed_ids.contains(&item.feed_id) {
            return false;
        }

        if let Some(id) = self.f.feed_id {
            if id != item.feed_id {
                return false;
            }
        }

        if !self.item_ids.is_empty() {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testutil::{category, feed, item};

    #[test]
    fn category_name_pins_and_gates_feeds() {
        let filters = Filters {
            category_name: Some("news".to_string()),
            ..Filters::default()
        };
        let mut df = DataFilter::new(false, &filters);

        let mut news = category(3, "news");
        assert!(df.admit_new_category(&news));
        news.name = "other".to_string();
        assert!(!df.admit_new_category(&news));

        // Feeds outside the pinned category are rejected even when valid.
        let in_cat = feed(10, Some(3));
        let out_cat = feed(11, Some(4));
        let uncategorized = feed(12, None);
        assert!(df.admit_new_feed(&in_cat));
        assert!(!df.admit_new_feed(&out_cat));
        assert!(!df.admit_new_feed(&uncategorized));

        // Items follow their feeds.
        assert!(df.admit_new_item(&item(100, 10, false)));
        assert!(!df.admit_new_item(&item(101, 11, false)));
    }

    #[test]
    fn main_view_excludes_hidden_categories_and_their_feeds() {
        let filters = Filters {
            is_main_view: true,
            valid_only: true,
            ..Filters::default()
        };
        let mut df = DataFilter::new(true, &filters);

        let mut hidden = category(5, "quiet");
        hidden.hidden_main = true;
        assert!(!df.admit_new_category(&hidden));

        // The rejection is recorded so the category's feeds drop too.
        assert!(!df.admit_new_feed(&feed(20, Some(5))));
        assert!(df.admit_new_feed(&feed(21, None)));
        assert!(!df.admit_new_item(&item(200, 20, false)));
        assert!(df.admit_new_item(&item(201, 21, false)));
    }

    #[test]
    fn disabled_hidden_category_is_not_excluded_as_hidden() {
        // A disabled category takes the valid_only branch, not the
        // hidden-exclusion branch.
        let filters = Filters {
            is_main_view: true,
            ..Filters::default()
        };
        let mut df = DataFilter::new(true, &filters);

        let mut c = category(6, "gone");
        c.disabled = true;
        c.hidden_nav = true;
        assert!(df.admit_new_category(&c));

        let filters = Filters {
            is_main_view: true,
            valid_only: true,
            ..Filters::default()
        };
        let mut df = DataFilter::new(true, &filters);
        assert!(!df.admit_new_category(&c));
        // But its feeds were not recorded as excluded-by-hidden.
        assert!(df.admit_new_feed(&feed(30, Some(6))));
    }

    #[test]
    fn keep_unless_refresh_shortcircuits_on_updates_only() {
        let filters = Filters {
            unread_only: true,
            keep_unless_refresh: true,
            ..Filters::default()
        };

        // Non-refresh: existing read item is kept, new read item is not.
        let mut df = DataFilter::new(false, &filters);
        df.admit_new_feed(&feed(1, None));
        assert!(df.keep_existing_item(&item(10, 1, true)));
        assert!(!df.admit_new_item(&item(11, 1, true)));

        // Refresh: the shortcircuit is off and read items drop.
        let mut df = DataFilter::new(true, &filters);
        df.admit_new_feed(&feed(1, None));
        assert!(!df.keep_existing_item(&item(10, 1, true)));
    }

    #[test]
    fn item_allow_list_always_admits_and_rejects_the_rest() {
        let filters = Filters {
            item_ids: vec![100, 101],
            unread_only: true,
            ..Filters::default()
        };
        let mut df = DataFilter::new(false, &filters);
        df.admit_new_feed(&feed(1, None));

        // Allow-listed items are admitted even when read.
        assert!(df.admit_new_item(&item(100, 1, true)));
        // Items off the list are rejected even when they'd otherwise pass.
        assert!(!df.admit_new_item(&item(102, 1, false)));
    }

    #[test]
    fn feed_id_filter_gates_all_tiers() {
        let filters = Filters {
            feed_id: Some(7),
            ..Filters::default()
        };
        let mut df = DataFilter::new(false, &filters);

        assert!(df.admit_new_feed(&feed(7, None)));
        assert!(!df.admit_new_feed(&feed(8, None)));
        assert!(df.admit_new_item(&item(70, 7, false)));
        assert!(!df.admit_new_item(&item(80, 8, false)));
    }
}
