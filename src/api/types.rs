use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Category, Feed, Item};

/// Response of the parameterless initial-state fetch. `timestamp` becomes
/// the client's synchronization watermark; `newest_timestamps` seeds
/// per-feed most-recent-item hints without a full item fetch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentState {
    pub timestamp: i64,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub feeds: Vec<Feed>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub newest_timestamps: HashMap<i64, DateTime<Utc>>,
}

/// Response of a delta fetch. `must_refresh` means the client state is
/// unrecoverably stale and only a restart helps.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerUpdates {
    pub timestamp: i64,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub feeds: Vec<Feed>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub must_refresh: bool,
}

/// Item batch fetch parameters. At most one of `feed_ids`/`category_id`
/// targets the query, and exactly one of unread / read-before /
/// read-after semantics is meaningful at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub feed_ids: Vec<i64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unread: bool,
    /// Fetch at least `read_before_count` read items strictly before this
    /// timestamp. The server guarantees no read item between the oldest
    /// returned timestamp and `read_before` is missing from the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_before_count: Option<u32>,
    /// Fetch all read items at or after this timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_after: Option<DateTime<Utc>>,
}

impl ItemsQuery {
    pub fn unread_for_feeds(mut feed_ids: Vec<i64>) -> Self {
        feed_ids.sort_unstable();
        Self {
            feed_ids,
            unread: true,
            ..Self::default()
        }
    }

    pub fn read_before_feed(feed_id: i64, before: DateTime<Utc>, count: u32) -> Self {
        Self {
            feed_ids: vec![feed_id],
            read_before: Some(before),
            read_before_count: Some(count),
            ..Self::default()
        }
    }

    pub fn read_before_category(category_id: i64, before: DateTime<Utc>, count: u32) -> Self {
        Self {
            category_id: Some(category_id),
            read_before: Some(before),
            read_before_count: Some(count),
            ..Self::default()
        }
    }

    pub fn read_after_category(category_id: i64, after: DateTime<Utc>) -> Self {
        Self {
            category_id: Some(category_id),
            read_after: Some(after),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub feeds: Vec<Feed>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFeedRequest {
    pub url: String,
    /// Becomes the feed's user title when non-empty.
    pub title: String,
    /// Skip feed detection and subscribe to the URL as-is.
    pub force: bool,
}

/// Either the created feed, or candidate feed URLs discovered on an HTML
/// page that the user must pick from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFeedResponse {
    #[serde(default)]
    pub feed: Option<Feed>,
    #[serde(default)]
    pub candidates: Option<Vec<String>>,
}

/// Everything a user is allowed to change about a feed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub clear_category: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCategoryRequest {
    pub name: String,
    pub title: String,
    pub hidden_nav: bool,
    pub hidden_main: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_nav: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_main: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoriesResponse {
    #[serde(default)]
    pub categories: Vec<Category>,
}
