mod data;
mod entities;
mod filter;

pub use data::{Data, FilteredData, Updates};
pub use entities::{valid_category_name, Category, Entity, Feed, Item};
pub use filter::{DataFilter, Filters};

#[cfg(test)]
pub mod testutil {
    use chrono::{DateTime, TimeZone, Utc};

    use super::{Category, Feed, Item};

    pub fn category(id: i64, name: &str) -> Category {
        Category {
            id,
            name: name.to_string(),
            title: name.to_string(),
            disabled: false,
            hidden_nav: false,
            hidden_main: false,
            sort_position: None,
            commit_timestamp: 1,
        }
    }

    pub fn feed(id: i64, category_id: Option<i64>) -> Feed {
        Feed {
            id,
            url: format!("https://feeds.example/{id}.xml"),
            title: format!("Feed {id}"),
            user_title: None,
            site_url: format!("https://feeds.example/{id}"),
            category_id,
            disabled: false,
            failing_since: None,
            create_timestamp: 0,
            commit_timestamp: 1,
        }
    }

    pub fn publish_time(id: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + id * 60, 0).unwrap()
    }

    pub fn item(id: i64, feed_id: i64, read: bool) -> Item {
        item_with_commit(id, feed_id, read, 1)
    }

    pub fn item_with_commit(id: i64, feed_id: i64, read: bool, commit_timestamp: i64) -> Item {
        Item {
            id,
            feed_id,
            title: format!("Item {id}"),
            url: format!("https://feeds.example/{feed_id}/{id}"),
            timestamp: publish_time(id),
            read,
            commit_timestamp,
        }
    }
}
