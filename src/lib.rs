//! Client-side incremental synchronization and caching for an RSS
//! aggregation server.
//!
//! The crate keeps a local, partially-loaded mirror of server entities
//! (categories, feeds, items), folds server deltas and optimistic user
//! mutations into it without discarding unrelated state, and decides
//! from declarative filters when additional data has to be fetched to
//! satisfy a view.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod mutate;
pub mod services;
pub mod session;
pub mod store;
pub mod view;
