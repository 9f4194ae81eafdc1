//! Client-side normalized entity cache.
//!
//! [`cache`] holds the identity-mapped records, lists and fetch coordination;
//! [`infra`] adapts a REST/JSON backend and wires up logging; [`config`]
//! loads layered settings for the bundled `normcache-cli` binary.

pub mod cache;
pub mod config;
pub mod infra;

pub use cache::{
    CacheError, EntityRecord, EntityRef, EntityStore, FilteredList, LoadState, ModelApi,
    ModelList, OptionalModel, Registry,
};
pub use infra::http::RestModelApi;
