use std::sync::Arc;

use crate::api::{AddCategoryRequest, AddFeedRequest, CategoryEdit, FeedEdit};
use crate::error::Result;
use crate::models::{valid_category_name, Category, Item, Updates};
use crate::session::Session;

/// User-triggered mutations. Every edit is optimistic: the speculative
/// version lands in the cache immediately, the server's authoritative
/// entity replaces it on success, and on failure the pre-mutation entity
/// is restored, but only if the cache still holds the speculative
/// version (a concurrent server delta wins over the rollback).
///
/// All cache effects flow through the session's merge pipeline; this
/// type never touches the store directly.
pub struct Mutator {
    session: Arc<Session>,
}

impl Mutator {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn mark_item_read(&self, item_id: i64, read: bool) -> Result<Item> {
        let _guard = self.session.loading().start();

        let original = self.session.snapshot().find_item(item_id).cloned();
        let speculative = original.as_ref().map(|it| Item {
            read,
            ..it.clone()
        });
        if let Some(s) = &speculative {
            self.session.apply_local(Updates::item(s.clone())).await;
        }

        match self.session.api().mark_item(item_id, read).await {
            Ok(item) => {
                self.session.apply_local(Updates::item(item.clone())).await;
                Ok(item)
            }
            Err(e) => {
                self.session
                    .notices()
                    .error(format!("Failed to update item: {e}"));
                self.rollback_items(
                    original.into_iter().collect(),
                    speculative.into_iter().collect(),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Marks every listed item read in one request.
    pub async fn mark_items_read(&self, item_ids: &[i64]) -> Result<()> {
        let _guard = self.session.loading().start();

        let snapshot = self.session.snapshot();
        let originals: Vec<Item> = item_ids
            .iter()
            .filter_map(|id| snapshot.find_item(*id).cloned())
            .collect();
        let speculative: Vec<Item> = originals
            .iter()
            .map(|it| Item {
                read: true,
                ..it.clone()
            })
            .collect();
        self.apply_items(speculative.clone()).await;

        match self.session.api().mark_items_read(item_ids).await {
            Ok(response) => {
                self.session
                    .apply_local(Updates::new(false, vec![], response.feeds, response.items))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.session
                    .notices()
                    .error(format!("Failed to mark items read: {e}"));
                self.rollback_items(originals, speculative).await;
                Err(e)
            }
        }
    }

    /// Marks a feed's unread items up to `max_item_id` as read.
    pub async fn mark_feed_read(&self, feed_id: i64, max_item_id: i64) -> Result<()> {
        let _guard = self.session.loading().start();

        let snapshot = self.session.snapshot();
        let originals: Vec<Item> = snapshot
            .items
            .iter()
            .filter(|it| it.feed_id == feed_id && !it.read && it.id <= max_item_id)
            .cloned()
            .collect();
        let speculative: Vec<Item> = originals
            .iter()
            .map(|it| Item {
                read: true,
                ..it.clone()
            })
            .collect();
        self.apply_items(speculative.clone()).await;

        match self.session.api().mark_feed_read(feed_id, max_item_id).await {
            Ok(response) => {
                self.session
                    .apply_local(Updates::new(false, vec![], response.feeds, response.items))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.session
                    .notices()
                    .error(format!("Failed to mark feed read: {e}"));
                self.rollback_items(originals, speculative).await;
                Err(e)
            }
        }
    }

    /// Subscribes to a new feed. `Ok(Some(..))` carries candidate feed
    /// URLs when the server found an HTML page instead of a feed and
    /// needs the user to pick one.
    pub async fn new_feed(
        &self,
        url: String,
        title: String,
        force: bool,
    ) -> Result<Option<Vec<String>>> {
        let _guard = self.session.loading().start();

        let request = AddFeedRequest { url, title, force };
        match self.session.api().add_feed(&request).await {
            Ok(response) => {
                if let Some(feed) = response.feed {
                    self.session.apply_local(Updates::feed(feed)).await;
                }
                Ok(response.candidates)
            }
            Err(e) => {
                self.session
                    .notices()
                    .error(format!("Failed to add feed: {e}"));
                Err(e)
            }
        }
    }

    pub async fn edit_feed(&self, feed_id: i64, edit: FeedEdit) -> Result<()> {
        let _guard = self.session.loading().start();

        let original = self.session.snapshot().find_feed(feed_id).cloned();
        let speculative = original.as_ref().map(|f| {
            let mut f = f.clone();
            if let Some(cid) = edit.category_id {
                f.category_id = Some(cid);
            } else if edit.clear_category {
                f.category_id = None;
            }
            if let Some(disabled) = edit.disabled {
                f.disabled = disabled;
            }
            if let Some(title) = &edit.user_title {
                f.user_title = (!title.is_empty()).then(|| title.clone());
            }
            f
        });
        if let Some(s) = &speculative {
            self.session.apply_local(Updates::feed(s.clone())).await;
        }

        match self.session.api().edit_feed(feed_id, &edit).await {
            Ok(feed) => {
                self.session.apply_local(Updates::feed(feed)).await;
                Ok(())
            }
            Err(e) => {
                self.session
                    .notices()
                    .error(format!("Failed to edit feed: {e}"));
                if let (Some(original), Some(speculative)) = (original, speculative) {
                    let current = self.session.snapshot().find_feed(feed_id).cloned();
                    if current.as_ref() == Some(&speculative) {
                        self.session.apply_local(Updates::feed(original)).await;
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn new_category(&self, request: AddCategoryRequest) -> Result<Category> {
        if !valid_category_name(&request.name) {
            return Err(anyhow::anyhow!("Invalid category name: {}", request.name).into());
        }

        let _guard = self.session.loading().start();
        match self.session.api().add_category(&request).await {
            Ok(category) => {
                self.session
                    .apply_local(Updates::category(category.clone()))
                    .await;
                Ok(category)
            }
            Err(e) => {
                self.session
                    .notices()
                    .error(format!("Failed to add category: {e}"));
                Err(e)
            }
        }
    }

    pub async fn edit_category(&self, category_id: i64, edit: CategoryEdit) -> Result<()> {
        let _guard = self.session.loading().start();

        let original = self.session.snapshot().find_category(category_id).cloned();
        let speculative = original.as_ref().map(|c| {
            let mut c = c.clone();
            if let Some(name) = &edit.name {
                c.name = name.clone();
            }
            if let Some(title) = &edit.title {
                c.title = title.clone();
            }
            if let Some(hidden_nav) = edit.hidden_nav {
                c.hidden_nav = hidden_nav;
            }
            if let Some(hidden_main) = edit.hidden_main {
                c.hidden_main = hidden_main;
            }
            if let Some(disabled) = edit.disabled {
                c.disabled = disabled;
            }
            c
        });
        if let Some(s) = &speculative {
            self.session.apply_local(Updates::category(s.clone())).await;
        }

        match self.session.api().edit_category(category_id, &edit).await {
            Ok(category) => {
                self.session.apply_local(Updates::category(category)).await;
                Ok(())
            }
            Err(e) => {
                self.session
                    .notices()
                    .error(format!("Failed to edit category: {e}"));
                if let (Some(original), Some(speculative)) = (original, speculative) {
                    let current = self.session.snapshot().find_category(category_id).cloned();
                    if current.as_ref() == Some(&speculative) {
                        self.session.apply_local(Updates::category(original)).await;
                    }
                }
                Err(e)
            }
        }
    }

    /// Persists a complete category ordering. Positions are assigned
    /// from the order of `category_ids`; categories left out keep their
    /// id-ordered fallback position.
    pub async fn reorder_categories(&self, category_ids: &[i64]) -> Result<()> {
        let _guard = self.session.loading().start();

        let snapshot = self.session.snapshot();
        let originals: Vec<Category> = category_ids
            .iter()
            .filter_map(|id| snapshot.find_category(*id).cloned())
            .collect();
        let speculative: Vec<Category> = originals
            .iter()
            .map(|c| {
                let mut c = c.clone();
                c.sort_position = category_ids
                    .iter()
                    .position(|id| *id == c.id)
                    .map(|p| p as i64);
                c
            })
            .collect();
        if !speculative.is_empty() {
            let mut sorted = speculative.clone();
            sorted.sort_by_key(|c| c.id);
            self.session
                .apply_local(Updates::new(false, sorted, vec![], vec![]))
                .await;
        }

        match self.session.api().reorder_categories(category_ids).await {
            Ok(response) => {
                self.session
                    .apply_local(Updates::new(false, response.categories, vec![], vec![]))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.session
                    .notices()
                    .error(format!("Failed to reorder categories: {e}"));
                let current = self.session.snapshot();
                let mut restore: Vec<Category> = originals
                    .into_iter()
                    .zip(speculative)
                    .filter(|(o, s)| current.find_category(o.id) == Some(s))
                    .map(|(o, _)| o)
                    .collect();
                restore.sort_by_key(|c| c.id);
                if !restore.is_empty() {
                    self.session
                        .apply_local(Updates::new(false, restore, vec![], vec![]))
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn apply_items(&self, items: Vec<Item>) {
        if items.is_empty() {
            return;
        }
        self.session.apply_local(Updates::items(items)).await;
    }

    /// Restores pre-mutation items whose cached copy still matches the
    /// speculative edit. Entities that diverged since (a server delta
    /// overtook the mutation) are left alone.
    async fn rollback_items(&self, originals: Vec<Item>, speculative: Vec<Item>) {
        let snapshot = self.session.snapshot();
        let restore: Vec<Item> = originals
            .into_iter()
            .zip(speculative)
            .filter(|(original, speculative)| {
                snapshot.find_item(original.id) == Some(speculative)
            })
            .map(|(original, _)| original)
            .collect();
        self.apply_items(restore).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item_json(id: i64, feed_id: i64, read: bool, commit: i64) -> serde_json::Value {
        json!({
            "id": id,
            "feedId": feed_id,
            "title": format!("Item {id}"),
            "url": format!("https://feeds.example/{feed_id}/{id}"),
            "timestamp": "2026-01-02T03:04:05Z",
            "read": read,
            "commitTimestamp": commit
        })
    }

    fn feed_json(id: i64) -> serde_json::Value {
        json!({
            "id": id,
            "url": format!("https://feeds.example/{id}.xml"),
            "title": format!("Feed {id}"),
            "siteUrl": format!("https://feeds.example/{id}"),
            "createTimestamp": 250,
            "commitTimestamp": 150
        })
    }

    async fn session_with_item(server: &MockServer) -> Arc<Session> {
        Mock::given(method("GET"))
            .and(path("/api/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "timestamp": 200,
                "categories": [],
                "feeds": [feed_json(1)],
                "items": [item_json(10, 1, false, 150)],
                "newestTimestamps": {}
            })))
            .mount(server)
            .await;

        let config = Config {
            server_url: server.uri(),
            ..Config::default()
        };
        Session::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn successful_mark_read_holds_the_authoritative_item() {
        let server = MockServer::start().await;
        let session = session_with_item(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/items/10/read"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(item_json(10, 1, true, 160)),
            )
            .mount(&server)
            .await;

        let mutator = Mutator::new(Arc::clone(&session));
        mutator.mark_item_read(10, true).await.unwrap();

        let snapshot = session.snapshot();
        let item = snapshot.find_item(10).unwrap();
        assert!(item.read);
        assert_eq!(item.commit_timestamp, 160);
        assert!(!session.loading().is_loading());
    }

    #[tokio::test]
    async fn failed_mark_read_rolls_back_and_drains_loading() {
        let server = MockServer::start().await;
        let session = session_with_item(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/items/10/read"))
            .respond_with(ResponseTemplate::new(500).set_body_string("nope"))
            .mount(&server)
            .await;

        let mutator = Mutator::new(Arc::clone(&session));
        let err = mutator.mark_item_read(10, true).await.unwrap_err();
        assert!(!err.is_fatal());

        // The cache holds the original unread item again and the
        // indicator reached zero.
        let snapshot = session.snapshot();
        let item = snapshot.find_item(10).unwrap();
        assert!(!item.read);
        assert_eq!(item.commit_timestamp, 150);
        assert!(!session.loading().is_loading());
    }

    #[tokio::test]
    async fn optimistic_edit_is_visible_before_the_server_answers() {
        let server = MockServer::start().await;
        let session = session_with_item(&server).await;
        // Delay the response long enough to observe the speculative state.
        Mock::given(method("POST"))
            .and(path("/api/items/10/read"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(item_json(10, 1, true, 160))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { Mutator::new(session).mark_item_read(10, true).await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(session.snapshot().find_item(10).unwrap().read);

        pending.await.unwrap().unwrap();
        assert_eq!(session.snapshot().find_item(10).unwrap().commit_timestamp, 160);
    }

    #[tokio::test]
    async fn mark_feed_read_marks_cached_unread_items_up_to_the_fence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "timestamp": 200,
                "categories": [],
                "feeds": [feed_json(1)],
                "items": [
                    item_json(10, 1, false, 150),
                    item_json(11, 1, false, 150),
                    item_json(12, 1, false, 150)
                ],
                "newestTimestamps": {}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/feeds/1/read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [item_json(10, 1, true, 170), item_json(11, 1, true, 170)]
            })))
            .mount(&server)
            .await;

        let config = Config {
            server_url: server.uri(),
            ..Config::default()
        };
        let session = Session::connect(&config).await.unwrap();
        let mutator = Mutator::new(Arc::clone(&session));
        mutator.mark_feed_read(1, 11).await.unwrap();

        let snapshot = session.snapshot();
        assert!(snapshot.find_item(10).unwrap().read);
        assert!(snapshot.find_item(11).unwrap().read);
        // Above the fence stays unread.
        assert!(!snapshot.find_item(12).unwrap().read);
    }

    #[tokio::test]
    async fn new_feed_surfaces_candidates() {
        let server = MockServer::start().await;
        let session = session_with_item(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/feeds/add"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": ["https://example.com/rss", "https://example.com/atom"]
            })))
            .mount(&server)
            .await;

        let mutator = Mutator::new(Arc::clone(&session));
        let candidates = mutator
            .new_feed("https://example.com".to_string(), String::new(), false)
            .await
            .unwrap();
        assert_eq!(candidates.unwrap().len(), 2);
        // No feed was created, the cache is untouched.
        assert_eq!(session.snapshot().feeds.len(), 1);
    }

    #[tokio::test]
    async fn invalid_category_name_is_rejected_locally() {
        let server = MockServer::start().await;
        let session = session_with_item(&server).await;
        let mutator = Mutator::new(session);

        let request = AddCategoryRequest {
            name: "Bad Name".to_string(),
            title: "Bad".to_string(),
            hidden_nav: false,
            hidden_main: false,
        };
        assert!(mutator.new_category(request).await.is_err());
    }
}
