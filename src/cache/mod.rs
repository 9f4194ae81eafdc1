//! Normalized entity cache.
//!
//! Sits between a backend API and its consumers:
//!
//! - **Records**: one shared [`EntityRecord`] per `(model type, id)`, handed
//!   out immediately and filled in place as payloads arrive.
//! - **Lists**: named, ordered [`ModelList`]s that reconcile themselves from
//!   full and partial backend results, plus live [`FilteredList`] views.
//! - **Fetches**: at most one outstanding load per record or list; clearing a
//!   store cancels outstanding loads softly.
//!
//! ## Configuration
//!
//! Store behavior is controlled via `normcache.toml`:
//!
//! ```toml
//! [cache]
//! default_list = "all"
//! auto_load = true
//! ```

mod api;
mod config;
mod denormalize;
mod entity;
mod error;
mod fetch;
mod filter;
mod list;
mod load_state;
mod lock;
mod metadata;
mod optional;
mod registry;
mod store;

pub use api::{FetchOne, ModelApi, PartialSink, SaveRequest};
pub use config::{CacheConfig, DEFAULT_LIST_NAME};
pub use denormalize::{Denormalized, Denormalizer, LinkResolver, SchemaDenormalizer};
pub use entity::{
    EntityLink, EntityRecord, EntityRef, FieldSet, FieldValue, LinkLookup, NEW_MODEL_ID,
};
pub use error::{ApiError, CacheError, FieldError, UnknownTypeError};
pub use fetch::{Epoch, PendingLoad};
pub use filter::{Filter, FilterValue, FilteredList};
pub use list::{ListLoader, ListRef, ListSnapshot, ListView, ModelList};
pub use load_state::LoadState;
pub use metadata::{FieldKind, FieldMeta, ModelMetadata};
pub use optional::OptionalModel;
pub use registry::{ModelStore, Registry};
pub use store::{CompletenessCheck, EntityStore, required_fields_present};

/// Metric names emitted by the cache, for exporters to describe.
pub mod metric_names {
    pub use super::fetch::{FETCH_JOINED, FETCH_STARTED, FETCH_SUPPRESSED};
    pub use super::store::INVALID_MODELS;
}
