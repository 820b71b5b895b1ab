use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Server-assigned recency marker shared by all entities. When two copies
/// of the same record meet, the one with the lower commit timestamp loses,
/// regardless of arrival order.
pub trait Entity: Clone {
    fn id(&self) -> i64;
    fn commit_timestamp(&self) -> i64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    /// A short name consisting of lowercase characters and hyphens.
    /// Used in routes.
    pub name: String,
    pub title: String,
    /// Disabled categories are effectively deleted, but are kept in the
    /// cache so clients are not inconvenienced.
    #[serde(default)]
    pub disabled: bool,
    /// Hidden in the nav bar unless opened directly.
    #[serde(default)]
    pub hidden_nav: bool,
    /// Items in this category are hidden in the main view.
    /// Implied by hidden_nav.
    #[serde(default)]
    pub hidden_main: bool,
    /// Categories without sort positions sort by id, after any categories
    /// with sort positions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_position: Option<i64>,
    pub commit_timestamp: i64,
}

impl Entity for Category {
    fn id(&self) -> i64 {
        self.id
    }

    fn commit_timestamp(&self) -> i64 {
        self.commit_timestamp
    }
}

pub fn valid_category_name(name: &str) -> bool {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    NAME_REGEX
        .get_or_init(|| Regex::new("^[a-z][a-z0-9-]+$").unwrap())
        .is_match(name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub title: String,
    /// Set when the user has overridden the title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_title: Option<String>,
    pub site_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_since: Option<DateTime<Utc>>,
    /// Anchors whether this feed existed before the client's sync
    /// watermark; feeds created after it arrive complete through the
    /// normal delta stream.
    pub create_timestamp: i64,
    pub commit_timestamp: i64,
}

impl Feed {
    pub fn display_title(&self) -> &str {
        self.user_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(if !self.title.is_empty() {
                &self.title
            } else if !self.site_url.is_empty() {
                &self.site_url
            } else {
                &self.url
            })
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.create_timestamp, 0).unwrap_or_default()
    }
}

impl Entity for Feed {
    fn id(&self) -> i64 {
        self.id
    }

    fn commit_timestamp(&self) -> i64 {
        self.commit_timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    /// Publish time, used for display ordering.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    pub commit_timestamp: i64,
}

impl Entity for Item {
    fn id(&self) -> i64 {
        self.id
    }

    fn commit_timestamp(&self) -> i64 {
        self.commit_timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_name_validation() {
        assert!(valid_category_name("news"));
        assert!(valid_category_name("long-reads2"));
        assert!(!valid_category_name("News"));
        assert!(!valid_category_name("x"));
        assert!(!valid_category_name("9to5"));
        assert!(!valid_category_name(""));
    }

    #[test]
    fn feed_display_title_fallback() {
        let mut feed = Feed {
            id: 1,
            url: "https://example.com/rss".to_string(),
            title: "Example".to_string(),
            user_title: None,
            site_url: "https://example.com".to_string(),
            category_id: None,
            disabled: false,
            failing_since: None,
            create_timestamp: 0,
            commit_timestamp: 0,
        };
        assert_eq!(feed.display_title(), "Example");

        feed.user_title = Some("Mine".to_string());
        assert_eq!(feed.display_title(), "Mine");

        feed.user_title = None;
        feed.title = String::new();
        assert_eq!(feed.display_title(), "https://example.com");
    }
}
