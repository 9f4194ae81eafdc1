//! Backend collaborator used by an [`EntityStore`](super::EntityStore).

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use super::entity::EntityRecord;
use super::error::ApiError;

/// Outcome of a single-entity fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOne {
    Found(Value),
    /// The backend cannot fetch one entity; the store falls back to the
    /// default list.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveRequest<C, U> {
    Create(C),
    Update(U),
}

type PushFn = dyn Fn(Vec<Value>, usize) + Send + Sync;

/// Channel for intermediate list pages.
///
/// Each push is applied to the list immediately, positioned at
/// `start_index`.
pub struct PartialSink {
    push: Box<PushFn>,
}

impl PartialSink {
    pub fn new(push: impl Fn(Vec<Value>, usize) + Send + Sync + 'static) -> Self {
        Self {
            push: Box::new(push),
        }
    }

    /// A sink that drops every page.
    pub fn discard() -> Self {
        Self::new(|_, _| {})
    }

    pub fn push(&self, models: Vec<Value>, start_index: usize) {
        (self.push)(models, start_index);
    }
}

impl fmt::Debug for PartialSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PartialSink")
    }
}

#[async_trait]
pub trait ModelApi: Send + Sync + 'static {
    type CreateRequest: Send + 'static;
    type UpdateRequest: Send + 'static;

    async fn fetch_one(&self, id: &str) -> Result<FetchOne, ApiError> {
        let _ = id;
        Ok(FetchOne::Unsupported)
    }

    /// Fetches the list called `name`. Pages may be reported early through
    /// `partial`; the returned vector is the final payload.
    async fn fetch_list(&self, name: &str, partial: &PartialSink) -> Result<Vec<Value>, ApiError>;

    async fn create(&self, request: Self::CreateRequest) -> Result<Value, ApiError>;

    async fn update(&self, request: Self::UpdateRequest) -> Result<Value, ApiError>;

    async fn delete_one(&self, model: &EntityRecord) -> Result<(), ApiError>;
}
