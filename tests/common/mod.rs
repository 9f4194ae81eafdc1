//! Shared fixtures for the integration tests: a scripted in-memory backend
//! and a small self-linking model type.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use normcache::cache::{
    ApiError, CacheConfig, EntityRecord, EntityStore, FetchOne, FieldKind, FieldMeta, ModelApi,
    ModelMetadata, PartialSink, Registry, required_fields_present,
};
use serde_json::{Value, json};
use tokio::sync::watch;

pub const MODEL_TYPE: &str = "ModelType";

/// `id`, a required `name` and an optional self link stored under `myModelId`.
pub fn metadata() -> ModelMetadata {
    ModelMetadata::new(MODEL_TYPE)
        .field(FieldMeta::new("id", [FieldKind::String]).required())
        .field(FieldMeta::new("name", [FieldKind::String]).required())
        .field(
            FieldMeta::new("myModel", [FieldKind::Link, FieldKind::Null])
                .api_field("myModelId")
                .links_to(MODEL_TYPE),
        )
}

pub fn raw(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name })
}

pub fn config(auto_load: bool) -> CacheConfig {
    CacheConfig::default().with_auto_load(auto_load)
}

/// Registry with a single `ModelType` store backed by `api`.
pub fn store(
    api: ScriptedApi,
    auto_load: bool,
) -> (Arc<Registry>, Arc<EntityStore<ScriptedApi>>) {
    let registry = Registry::new();
    let store = register(&registry, metadata(), api, auto_load);
    (registry, store)
}

pub fn register(
    registry: &Arc<Registry>,
    metadata: ModelMetadata,
    api: ScriptedApi,
    auto_load: bool,
) -> Arc<EntityStore<ScriptedApi>> {
    let is_full = required_fields_present(&metadata);
    EntityStore::with_config(registry, metadata, api, is_full, &config(auto_load))
}

/// Awaits `future`, failing the test instead of hanging.
pub async fn settle<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("future settled in time")
}

/// Lets spawned tasks run on the current-thread test runtime.
pub async fn ticks(count: usize) {
    for _ in 0..count {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct Script {
    single_fetch_disabled: bool,
    items: HashMap<String, Value>,
    lists: HashMap<String, Vec<Value>>,
    partials: HashMap<String, Vec<(Vec<Value>, usize)>>,
    fetch_one_error: Option<ApiError>,
    list_error: Option<ApiError>,
    save_response: Option<Result<Value, ApiError>>,
    delete_error: Option<ApiError>,
}

struct Inner {
    script: Mutex<Script>,
    gate: watch::Sender<bool>,
    page_gate: watch::Sender<bool>,
    fetch_one_calls: AtomicUsize,
    fetch_list_calls: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

/// In-memory backend driven by the test. Clones share one script.
#[derive(Clone)]
pub struct ScriptedApi {
    inner: Arc<Inner>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::with_gate(true)
    }

    /// Every fetch waits until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        Self::with_gate(false)
    }

    fn with_gate(open: bool) -> Self {
        let (gate, _) = watch::channel(open);
        let (page_gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                script: Mutex::new(Script::default()),
                gate,
                page_gate,
                fetch_one_calls: AtomicUsize::new(0),
                fetch_list_calls: AtomicUsize::new(0),
                deleted: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn release(&self) {
        self.inner.gate.send_replace(true);
    }

    /// List fetches stop after every pushed page until
    /// [`release_pages`](Self::release_pages) is called.
    pub fn hold_pages(&self) {
        self.inner.page_gate.send_replace(false);
    }

    pub fn release_pages(&self) {
        self.inner.page_gate.send_replace(true);
    }

    pub fn without_single_fetch(self) -> Self {
        self.script().single_fetch_disabled = true;
        self
    }

    /// Payload served by `fetch_one(id)`.
    pub fn put_item(&self, id: &str, raw: Value) {
        self.script().items.insert(id.to_owned(), raw);
    }

    pub fn set_list(&self, name: &str, models: Vec<Value>) {
        self.script().lists.insert(name.to_owned(), models);
    }

    /// Page pushed through the partial sink before the list resolves.
    pub fn push_partial(&self, name: &str, models: Vec<Value>, start_index: usize) {
        self.script()
            .partials
            .entry(name.to_owned())
            .or_default()
            .push((models, start_index));
    }

    pub fn fail_fetch_one(&self, error: ApiError) {
        self.script().fetch_one_error = Some(error);
    }

    pub fn fail_list(&self, error: ApiError) {
        self.script().list_error = Some(error);
    }

    /// Response for the next create or update; requests are echoed otherwise.
    pub fn respond_to_save(&self, response: Result<Value, ApiError>) {
        self.script().save_response = Some(response);
    }

    pub fn fail_delete(&self, error: ApiError) {
        self.script().delete_error = Some(error);
    }

    pub fn clear_delete_failure(&self) {
        self.script().delete_error = None;
    }

    pub fn fetch_one_calls(&self) -> usize {
        self.inner.fetch_one_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_list_calls(&self) -> usize {
        self.inner.fetch_list_calls.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.inner.deleted.lock().unwrap().clone()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner.script.lock().unwrap()
    }

    async fn pass_gate(&self) {
        pass(&self.inner.gate).await;
    }

    fn save(&self, request: Value) -> Result<Value, ApiError> {
        self.script().save_response.take().unwrap_or(Ok(request))
    }
}

async fn pass(gate: &watch::Sender<bool>) {
    let mut gate = gate.subscribe();
    let _ = gate.wait_for(|open| *open).await;
}

#[async_trait]
impl ModelApi for ScriptedApi {
    type CreateRequest = Value;
    type UpdateRequest = Value;

    async fn fetch_one(&self, id: &str) -> Result<FetchOne, ApiError> {
        self.inner.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;

        let script = self.script();
        if script.single_fetch_disabled {
            return Ok(FetchOne::Unsupported);
        }
        if let Some(error) = script.fetch_one_error.clone() {
            return Err(error);
        }
        script
            .items
            .get(id)
            .cloned()
            .map(FetchOne::Found)
            .ok_or_else(|| ApiError::status(404, format!("no item `{id}`")))
    }

    async fn fetch_list(&self, name: &str, partial: &PartialSink) -> Result<Vec<Value>, ApiError> {
        self.inner.fetch_list_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;

        let (pages, outcome) = {
            let script = self.script();
            let pages = script.partials.get(name).cloned().unwrap_or_default();
            let outcome = match script.list_error.clone() {
                Some(error) => Err(error),
                None => Ok(script.lists.get(name).cloned().unwrap_or_default()),
            };
            (pages, outcome)
        };
        for (models, start_index) in pages {
            partial.push(models, start_index);
            pass(&self.inner.page_gate).await;
        }
        outcome
    }

    async fn create(&self, request: Value) -> Result<Value, ApiError> {
        self.save(request)
    }

    async fn update(&self, request: Value) -> Result<Value, ApiError> {
        self.save(request)
    }

    async fn delete_one(&self, model: &EntityRecord) -> Result<(), ApiError> {
        if let Some(error) = self.script().delete_error.clone() {
            return Err(error);
        }
        self.inner.deleted.lock().unwrap().push(model.id().to_owned());
        Ok(())
    }
}
