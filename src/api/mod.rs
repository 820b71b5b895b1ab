mod client;
mod types;

pub use client::ApiClient;
pub use types::{
    AddCategoryRequest, AddFeedRequest, AddFeedResponse, CategoriesResponse, CategoryEdit,
    CurrentState, FeedEdit, ItemsQuery, ItemsResponse, ServerUpdates,
};
