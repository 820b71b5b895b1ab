use chrono::{DateTime, Utc};

use crate::models::{Category, Feed};

/// What the server is known to have already supplied for one feed,
/// independent of what is currently materialized in `Data` (which may be
/// filtered or trimmed). Created on first sighting of a feed and never
/// destroyed, even for disabled feeds.
#[derive(Debug, Clone)]
pub struct FeedMetadata {
    pub feed: Feed,
    /// True when every currently-unread item of this feed is known
    /// locally, at least up to the store's sync watermark.
    pub has_unread: bool,
    /// True only when we hold every read item ever created for the feed.
    all_read: bool,
    /// All read items with `timestamp >= read_after` are known locally.
    read_after: Option<DateTime<Utc>>,
}

impl FeedMetadata {
    pub fn new(feed: Feed, has_unread: bool, all_read: bool) -> Self {
        Self {
            feed,
            has_unread,
            all_read,
            read_after: None,
        }
    }

    pub fn all_read(&self) -> bool {
        self.all_read
    }

    pub fn read_after(&self) -> Option<DateTime<Utc>> {
        self.read_after
    }

    /// Extends the read watermark to cover history back to `d`. Coverage
    /// only ever grows: a call that covers less history than what is
    /// already held is a no-op. Reaching the feed's creation time means
    /// every read item is held.
    pub fn set_read_after(&mut self, d: DateTime<Utc>) {
        if self.read_after.is_some_and(|current| current <= d) {
            return;
        }
        if d <= self.feed.created_at() {
            self.all_read = true;
        }
        self.read_after = Some(d);
    }

    /// All read items from `d` forward are locally cached.
    pub fn has_read_after(&self, d: DateTime<Utc>) -> bool {
        self.all_read || self.read_after.is_some_and(|current| current <= d)
    }

    pub fn mark_all_read(&mut self) {
        self.all_read = true;
    }
}

/// The read-history watermark at category granularity, aggregating over
/// the category's feeds.
#[derive(Debug, Clone)]
pub struct CategoryMetadata {
    pub category: Category,
    all_read: bool,
    read_after: Option<DateTime<Utc>>,
}

impl CategoryMetadata {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            all_read: false,
            read_after: None,
        }
    }

    pub fn all_read(&self) -> bool {
        self.all_read
    }

    pub fn read_after(&self) -> Option<DateTime<Utc>> {
        self.read_after
    }

    pub fn set_read_after(&mut self, d: DateTime<Utc>) {
        if self.read_after.is_some_and(|current| current <= d) {
            return;
        }
        self.read_after = Some(d);
    }

    pub fn has_read_after(&self, d: DateTime<Utc>) -> bool {
        self.all_read || self.read_after.is_some_and(|current| current <= d)
    }

    pub fn mark_all_read(&mut self) {
        self.all_read = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testutil::{category, feed};
    use chrono::TimeZone;

    fn date(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn watermark_never_regresses_under_out_of_order_extension() {
        let mut f = feed(1, None);
        f.create_timestamp = 0;
        let mut meta = FeedMetadata::new(f, true, false);

        meta.set_read_after(date(5_000));
        meta.set_read_after(date(3_000));
        // Covering less history than what is held changes nothing.
        meta.set_read_after(date(4_000));
        assert_eq!(meta.read_after(), Some(date(3_000)));

        assert!(meta.has_read_after(date(3_000)));
        assert!(meta.has_read_after(date(9_000)));
        assert!(!meta.has_read_after(date(2_000)));
    }

    #[test]
    fn reaching_feed_creation_means_all_read() {
        let mut f = feed(1, None);
        f.create_timestamp = 1_000;
        let mut meta = FeedMetadata::new(f, true, false);

        meta.set_read_after(date(2_000));
        assert!(!meta.all_read());

        meta.set_read_after(date(1_000));
        assert!(meta.all_read());
        // all_read implies coverage for any date.
        assert!(meta.has_read_after(date(0)));
    }

    #[test]
    fn category_watermark_behaves_like_feed_watermark() {
        let mut meta = CategoryMetadata::new(category(1, "news"));
        assert!(!meta.has_read_after(date(100)));

        meta.set_read_after(date(500));
        meta.set_read_after(date(800));
        assert_eq!(meta.read_after(), Some(date(500)));

        meta.mark_all_read();
        assert!(meta.has_read_after(date(0)));
    }
}
