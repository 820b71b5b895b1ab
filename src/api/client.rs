use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Category, Feed, Item};

use super::types::{
    AddCategoryRequest, AddFeedRequest, AddFeedResponse, CategoriesResponse, CategoryEdit,
    CurrentState, FeedEdit, ItemsQuery, ItemsResponse, ServerUpdates,
};

/// Thin typed wrapper over the aggregation server's HTTP API. Endpoint
/// shapes live in `types.rs`; everything else in the crate talks in
/// those contracts and never sees HTTP details.
pub struct ApiClient {
    client: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base = Url::parse(&config.server_url)
            .map_err(|e| AppError::Config(format!("invalid server_url: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("drift-reader/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| AppError::Config(format!("invalid endpoint {path}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.endpoint(path)?).send().await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn initial_state(&self) -> Result<CurrentState> {
        self.get("/api/current").await
    }

    pub async fn server_updates(&self, timestamp: i64) -> Result<ServerUpdates> {
        self.get(&format!("/api/updates/{timestamp}")).await
    }

    pub async fn get_items(&self, query: &ItemsQuery) -> Result<ItemsResponse> {
        self.post("/api/items", query).await
    }

    pub async fn mark_item(&self, id: i64, read: bool) -> Result<Item> {
        let verb = if read { "read" } else { "unread" };
        self.post(&format!("/api/items/{id}/{verb}"), &serde_json::json!({}))
            .await
    }

    /// Bulk mark: every listed item becomes read.
    pub async fn mark_items_read(&self, item_ids: &[i64]) -> Result<ItemsResponse> {
        self.post("/api/items/read", &serde_json::json!({ "itemIds": item_ids }))
            .await
    }

    /// Marks all of a feed's unread items up to `max_item_id` as read,
    /// returning the items that actually changed.
    pub async fn mark_feed_read(&self, feed_id: i64, max_item_id: i64) -> Result<ItemsResponse> {
        self.post(
            &format!("/api/feeds/{feed_id}/read"),
            &serde_json::json!({ "maxItemId": max_item_id }),
        )
        .await
    }

    pub async fn add_feed(&self, request: &AddFeedRequest) -> Result<AddFeedResponse> {
        self.post("/api/feeds/add", request).await
    }

    pub async fn edit_feed(&self, id: i64, edit: &FeedEdit) -> Result<Feed> {
        self.post(
            &format!("/api/feeds/{id}/edit"),
            &serde_json::json!({ "edit": edit }),
        )
        .await
    }

    pub async fn add_category(&self, request: &AddCategoryRequest) -> Result<Category> {
        self.post("/api/categories/add", request).await
    }

    pub async fn edit_category(&self, id: i64, edit: &CategoryEdit) -> Result<Category> {
        self.post(
            &format!("/api/categories/{id}/edit"),
            &serde_json::json!({ "edit": edit }),
        )
        .await
    }

    /// Persists a complete category ordering; positions are assigned from
    /// the order of `category_ids`.
    pub async fn reorder_categories(&self, category_ids: &[i64]) -> Result<CategoriesResponse> {
        self.post(
            "/api/categories/reorder",
            &serde_json::json!({ "categoryIds": category_ids }),
        )
        .await
    }
}
