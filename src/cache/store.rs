//! Per-type entity store.
//!
//! An [`EntityStore`] owns the identity map and the named lists of one model
//! type. Read paths hand out shared records immediately and settle them in
//! the background; write paths record failures on the record and return
//! them.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use metrics::counter;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use super::api::{FetchOne, ModelApi, PartialSink, SaveRequest};
use super::config::CacheConfig;
use super::entity::{EntityRecord, EntityRef, NEW_MODEL_ID};
use super::error::CacheError;
use super::fetch::{self, Epoch, FetchCoordinator, FetchKey, PendingLoad};
use super::filter::{Filter, FilteredList};
use super::list::{ListLoader, ListRef, ListSnapshot, ListView, ModelList};
use super::load_state::LoadState;
use super::metadata::ModelMetadata;
use super::optional::OptionalModel;
use super::registry::{ModelStore, Registry};

const SOURCE: &str = "cache::store";

pub const INVALID_MODELS: &str = "normcache_invalid_models_total";

/// Decides whether a record carries everything a full rendering needs.
pub type CompletenessCheck = Arc<dyn Fn(&EntityRecord) -> bool + Send + Sync>;

/// Completeness check requiring every `required` field to be non-null.
pub fn required_fields_present(
    metadata: &ModelMetadata,
) -> impl Fn(&EntityRecord) -> bool + Send + Sync + 'static {
    let required: Vec<String> = metadata
        .required_fields()
        .map(|field| field.name.clone())
        .collect();
    move |record: &EntityRecord| {
        required
            .iter()
            .all(|name| record.field(name).is_some_and(|value| !value.is_null()))
    }
}

pub struct EntityStore<A: ModelApi> {
    this: Weak<EntityStore<A>>,
    registry: Weak<Registry>,
    metadata: Arc<ModelMetadata>,
    api: A,
    is_full: CompletenessCheck,
    config: CacheConfig,
    models: DashMap<String, EntityRef>,
    lists: DashMap<String, ListRef>,
    fetches: Arc<FetchCoordinator>,
}

impl<A: ModelApi> EntityStore<A> {
    /// Creates a store with the default [`CacheConfig`] and registers it.
    pub fn new(
        registry: &Arc<Registry>,
        metadata: ModelMetadata,
        api: A,
        is_full: impl Fn(&EntityRecord) -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_config(registry, metadata, api, is_full, &CacheConfig::default())
    }

    pub fn with_config(
        registry: &Arc<Registry>,
        metadata: ModelMetadata,
        api: A,
        is_full: impl Fn(&EntityRecord) -> bool + Send + Sync + 'static,
        config: &CacheConfig,
    ) -> Arc<Self> {
        let store = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            registry: Arc::downgrade(registry),
            metadata: Arc::new(metadata),
            api,
            is_full: Arc::new(is_full),
            config: config.clone(),
            models: DashMap::new(),
            lists: DashMap::new(),
            fetches: FetchCoordinator::new(),
        });
        registry.register(Arc::clone(&store) as Arc<dyn ModelStore>);
        store
    }

    pub fn model_type(&self) -> &str {
        &self.metadata.model_type
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.upgrade()
    }

    pub fn is_full_model(&self, record: &EntityRecord) -> bool {
        (self.is_full)(record)
    }

    /// Number of loads currently in flight for this store.
    pub fn in_flight(&self) -> usize {
        self.fetches.in_flight_count()
    }

    // ---- identity map ----

    /// The canonical record for `id`, created in `None` state when absent.
    pub fn get_or_create(&self, id: &str) -> EntityRef {
        if let Some(existing) = self.models.get(id) {
            return Arc::clone(existing.value());
        }
        let created = self.models.entry(id.to_owned()).or_insert_with(|| {
            trace!(target_module = SOURCE, model_type = %self.model_type(), id, "Created record");
            EntityRecord::new(self.model_type(), id, self.metadata.empty_fields())
        });
        Arc::clone(created.value())
    }

    pub fn has_model(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn find_model(&self, id: &str) -> Option<EntityRef> {
        self.models.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Placeholder for an entity that does not exist on the backend yet.
    /// It never joins the identity map.
    pub fn create_new_model(&self) -> EntityRef {
        EntityRecord::new(self.model_type(), NEW_MODEL_ID, self.metadata.empty_fields())
    }

    /// Returns the record for `id` at once.
    ///
    /// With `Some(true)` a load is always scheduled; with `None` only while
    /// the record has never been requested (and `auto_load` is enabled).
    /// Loads start on the next scheduler tick, never inline.
    pub fn get_model(&self, id: &str, auto_load: Option<bool>) -> EntityRef {
        let record = self.get_or_create(id);
        let forced = auto_load == Some(true);
        let implicit = auto_load.is_none() && self.config.auto_load && record.load_state().is_none();
        if forced || implicit {
            self.schedule_model_load(&record, forced);
        }
        record
    }

    pub fn get_optional_model(&self, id: &str) -> OptionalModel {
        OptionalModel::new(self.get_model(id, None), Arc::clone(&self.is_full))
    }

    fn schedule_model_load(&self, record: &EntityRef, forced: bool) {
        let Ok(handle) = Handle::try_current() else {
            warn!(
                target_module = SOURCE,
                model_type = %self.model_type(),
                id = %record.id(),
                "No async runtime available; skipped model load"
            );
            return;
        };
        let this = self.this.clone();
        let record = Arc::clone(record);
        handle.spawn(async move {
            let Some(store) = this.upgrade() else { return };
            // An implicit load is dropped when a payload arrived meanwhile.
            if forced || record.load_state().is_none() {
                let _ = store.load_model(&record);
            }
        });
    }

    // ---- single-model loading ----

    /// Loads `record` unless a load is already pending for it.
    pub fn load_model(&self, record: &EntityRef) -> PendingLoad {
        let key = FetchKey::entity(record);
        if record.load_state().is_pending() {
            return self
                .fetches
                .in_flight(key)
                .unwrap_or_else(|| fetch::ready(LoadState::Pending));
        }

        let this = self.this.clone();
        let target = Arc::clone(record);
        self.fetches.dispatch(key, move |epoch| {
            target.set_load_state(LoadState::Pending);
            async move {
                match this.upgrade() {
                    Some(store) => store.fetch_model(&target, epoch).await,
                    None => target.load_state(),
                }
            }
        })
    }

    async fn fetch_model(&self, record: &EntityRef, epoch: Epoch) -> LoadState {
        debug!(
            target_module = SOURCE,
            model_type = %self.model_type(),
            id = %record.id(),
            epoch,
            "Fetching model"
        );
        let outcome = self.api.fetch_one(record.id()).await;
        if !self.fetches.is_current(epoch) {
            self.fetches.note_suppressed("entity", epoch);
            return record.load_state();
        }

        match outcome {
            Ok(FetchOne::Found(raw)) => self.consume_fetched(record, &raw),
            Ok(FetchOne::Unsupported) => return self.load_through_default_list(record, epoch).await,
            Err(error) => {
                warn!(
                    target_module = SOURCE,
                    model_type = %self.model_type(),
                    id = %record.id(),
                    error = %error,
                    "Model fetch failed"
                );
                record.set_load_state(LoadState::Error(error.into()));
            }
        }
        record.load_state()
    }

    fn consume_fetched(&self, requested: &EntityRef, raw: &Value) {
        if let Some(received) = raw_id(raw).filter(|received| *received != requested.id()) {
            warn!(
                target_module = SOURCE,
                model_type = %self.model_type(),
                expected = %requested.id(),
                received = %received,
                "Fetched model id does not match the requested id"
            );
            requested.set_load_state(LoadState::Error(CacheError::consistency(
                self.model_type(),
                requested.id(),
                received,
            )));
            // The payload still describes a real entity.
            let _ = self.consume_model(raw);
            return;
        }

        if let Err(error) = self.consume_model(raw) {
            requested.set_load_state(LoadState::Error(error));
        }
    }

    /// Fallback for backends without single fetch: load the default list
    /// and look for the record there.
    async fn load_through_default_list(&self, record: &EntityRef, epoch: Epoch) -> LoadState {
        let list = self.get_existing_list(&self.config.default_list);
        let list_state = self.load_list(&list).await;
        if !self.fetches.is_current(epoch) {
            self.fetches.note_suppressed("entity", epoch);
            return record.load_state();
        }

        if record.load_state().is_pending() {
            let error = match list_state {
                LoadState::Error(error) if error.is_transport() => error,
                _ => CacheError::not_found(self.model_type(), record.id()),
            };
            debug!(
                target_module = SOURCE,
                model_type = %self.model_type(),
                id = %record.id(),
                error = %error,
                "Model missing from default list"
            );
            record.set_load_state(LoadState::Error(error));
        }
        record.load_state()
    }

    // ---- consumption ----

    /// Merges one backend payload into its canonical record.
    ///
    /// A payload flagged `metadata.deleted` removes the record from the
    /// identity map and from every list instead.
    pub fn consume_model(&self, raw: &Value) -> Result<EntityRef, CacheError> {
        let Some(id) = raw_id(raw) else {
            debug!(
                target_module = SOURCE,
                model_type = %self.model_type(),
                payload = %raw,
                "Rejected payload without id"
            );
            return Err(CacheError::missing_id(self.model_type()));
        };

        let record = self.get_or_create(id);
        if is_deletion(raw) {
            self.purge_deleted(&record);
            return Ok(record);
        }

        match self.denormalize(&record, raw) {
            Ok(()) => {
                record.set_load_state(LoadState::Done);
                let default_list = self.get_existing_list(&self.config.default_list);
                if default_list.unshift_if_absent(&record) {
                    trace!(
                        target_module = SOURCE,
                        model_type = %self.model_type(),
                        id,
                        "Added consumed model to default list"
                    );
                }
            }
            Err(error) => {
                debug!(
                    target_module = SOURCE,
                    model_type = %self.model_type(),
                    id,
                    error = %error,
                    "Model denormalizing failed"
                );
                record.set_load_state(LoadState::Error(error));
            }
        }
        Ok(record)
    }

    /// Places `raws` into `list` (the default list when `None`) starting at
    /// `start_index`, then settles the list.
    pub fn consume_models(&self, raws: &[Value], list: Option<&ListRef>, start_index: usize) {
        let list = match list {
            Some(list) => Arc::clone(list),
            None => self.get_existing_list(&self.config.default_list),
        };
        self.push_models_to_list(raws, &list, start_index);
        list.finish_batch(self.model_type());
    }

    pub(crate) fn push_models_to_list(&self, raws: &[Value], list: &ListRef, start_index: usize) {
        let mut placed = Vec::with_capacity(raws.len());
        let mut invalid = Vec::new();

        for (offset, raw) in raws.iter().enumerate() {
            let Some(id) = raw_id(raw) else {
                invalid.push(raw.clone());
                continue;
            };
            let record = self.get_or_create(id);
            match self.denormalize(&record, raw) {
                Ok(()) => {
                    record.set_load_state(LoadState::Done);
                    placed.push((start_index + offset, record));
                }
                Err(error) => {
                    debug!(
                        target_module = SOURCE,
                        model_type = %self.model_type(),
                        list = %list.name(),
                        id,
                        error = %error,
                        "List model denormalizing failed"
                    );
                    record.set_load_state(LoadState::Error(error));
                    invalid.push(raw.clone());
                }
            }
        }

        if !invalid.is_empty() {
            counter!(INVALID_MODELS).increment(invalid.len() as u64);
        }
        list.place(placed, invalid);
    }

    fn denormalize(&self, record: &EntityRecord, raw: &Value) -> Result<(), CacheError> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| CacheError::detached(self.model_type()))?;
        registry.denormalize_model(record, raw, &self.metadata)
    }

    fn purge_deleted(&self, record: &EntityRef) {
        record.set_load_state(LoadState::Deleted);
        self.models
            .remove_if(record.id(), |_, existing| Arc::ptr_eq(existing, record));
        let lists = self
            .all_lists()
            .iter()
            .filter(|list| list.remove_id(record.id()))
            .count();
        debug!(
            target_module = SOURCE,
            model_type = %self.model_type(),
            id = %record.id(),
            lists,
            "Purged deleted model"
        );
    }

    // ---- lists ----

    pub fn get_default_list(&self) -> ListRef {
        self.get_list(&self.config.default_list)
    }

    pub fn get_list(&self, name: &str) -> ListRef {
        self.get_list_with(name, None, true)
    }

    /// The list called `name`, created with `filter` as its tag when absent.
    pub fn get_list_with(&self, name: &str, filter: Option<Value>, auto_load: bool) -> ListRef {
        let list = self.list_entry(name, filter);
        if auto_load && self.config.auto_load && list.load_state().is_none() {
            self.schedule_list_load(&list);
        }
        list
    }

    /// Like [`get_list`](Self::get_list) but never loads.
    pub fn get_existing_list(&self, name: &str) -> ListRef {
        self.list_entry(name, None)
    }

    pub fn get_filtered_list(&self, filter: Filter) -> FilteredList {
        FilteredList::new(filter.list_name(), self.get_default_list(), filter)
    }

    fn list_entry(&self, name: &str, filter: Option<Value>) -> ListRef {
        if let Some(existing) = self.lists.get(name) {
            return Arc::clone(existing.value());
        }
        let loader = self.list_loader();
        let created = self
            .lists
            .entry(name.to_owned())
            .or_insert_with(|| ModelList::new(name, filter, Some(loader)));
        Arc::clone(created.value())
    }

    fn list_loader(&self) -> Weak<dyn ListLoader> {
        self.this.clone()
    }

    fn all_lists(&self) -> Vec<ListRef> {
        self.lists
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn schedule_list_load(&self, list: &ListRef) {
        let Ok(handle) = Handle::try_current() else {
            warn!(
                target_module = SOURCE,
                model_type = %self.model_type(),
                list = %list.name(),
                "No async runtime available; skipped list load"
            );
            return;
        };
        let this = self.this.clone();
        let list = Arc::clone(list);
        handle.spawn(async move {
            let Some(store) = this.upgrade() else { return };
            if list.load_state().is_none() {
                let _ = store.load_list(&list);
            }
        });
    }

    /// Fetches `list` from the backend; concurrent calls share one fetch.
    ///
    /// Pages pushed through the [`PartialSink`] are placed as they arrive.
    /// Without any page the final payload replaces the list; after pages it
    /// is appended and deduplicated so the final payload wins.
    pub fn load_list(&self, list: &ListRef) -> PendingLoad {
        let this = self.this.clone();
        let target = Arc::clone(list);
        self.fetches.dispatch(FetchKey::list(list), move |epoch| {
            target.begin_load();
            async move {
                match this.upgrade() {
                    Some(store) => store.fetch_list(&target, epoch).await,
                    None => target.load_state(),
                }
            }
        })
    }

    async fn fetch_list(&self, list: &ListRef, epoch: Epoch) -> LoadState {
        let pushed = Arc::new(AtomicBool::new(false));
        let sink = self.partial_sink(list, epoch, Arc::clone(&pushed));

        debug!(
            target_module = SOURCE,
            model_type = %self.model_type(),
            list = %list.name(),
            epoch,
            "Fetching list"
        );
        let outcome = self.api.fetch_list(list.name(), &sink).await;
        if !self.fetches.is_current(epoch) {
            self.fetches.note_suppressed("list", epoch);
            return list.load_state();
        }

        match outcome {
            Ok(models) => {
                let start_index = if pushed.load(Ordering::SeqCst) {
                    list.len()
                } else {
                    list.clear_models();
                    0
                };
                self.consume_models(&models, Some(list), start_index);
                debug!(
                    target_module = SOURCE,
                    model_type = %self.model_type(),
                    list = %list.name(),
                    total = list.total(),
                    invalid = list.invalid_models().len(),
                    "List loaded"
                );
            }
            Err(error) => {
                warn!(
                    target_module = SOURCE,
                    model_type = %self.model_type(),
                    list = %list.name(),
                    error = %error,
                    "List fetch failed"
                );
                list.set_load_state(LoadState::Error(error.into()));
            }
        }
        list.load_state()
    }

    fn partial_sink(&self, list: &ListRef, epoch: Epoch, pushed: Arc<AtomicBool>) -> PartialSink {
        let this = self.this.clone();
        let list = Arc::clone(list);
        PartialSink::new(move |models, start_index| {
            let Some(store) = this.upgrade() else { return };
            if !store.fetches.is_current(epoch) {
                store.fetches.note_suppressed("list", epoch);
                return;
            }
            pushed.store(true, Ordering::SeqCst);
            trace!(
                target_module = SOURCE,
                model_type = %store.model_type(),
                list = %list.name(),
                start_index,
                count = models.len(),
                "Applying partial list push"
            );
            store.push_models_to_list(&models, &list, start_index);
        })
    }

    /// Rebuilds a list from a snapshot, replacing any list of the same name.
    pub fn restore_list(&self, snapshot: &ListSnapshot) -> ListRef {
        let list = ModelList::from_snapshot(
            snapshot,
            |id| self.get_or_create(id),
            Some(self.list_loader()),
        );
        self.lists.insert(snapshot.name.clone(), Arc::clone(&list));
        debug!(
            target_module = SOURCE,
            model_type = %self.model_type(),
            list = %snapshot.name,
            models = snapshot.model_ids.len(),
            "Restored list from snapshot"
        );
        list
    }

    // ---- writes ----

    /// Sends a create or update and consumes the response.
    pub async fn create_or_update(
        &self,
        model: &EntityRef,
        request: SaveRequest<A::CreateRequest, A::UpdateRequest>,
    ) -> Result<EntityRef, CacheError> {
        let (action, response) = match request {
            SaveRequest::Create(request) => ("create", self.api.create(request).await),
            SaveRequest::Update(request) => ("update", self.api.update(request).await),
        };

        let raw = response.map_err(|error| {
            warn!(
                target_module = SOURCE,
                model_type = %self.model_type(),
                id = %model.id(),
                action,
                error = %error,
                "Save request failed"
            );
            let error = CacheError::from(error);
            model.set_load_state(LoadState::Error(error.clone()));
            error
        })?;

        let record = self
            .consume_model(&raw)
            .inspect_err(|error| model.set_load_state(LoadState::Error(error.clone())))?;
        if model.is_new() {
            model.set_load_state(record.load_state());
        }

        match record.load_state() {
            LoadState::Error(error) => Err(error),
            _ => {
                info!(
                    target_module = SOURCE,
                    model_type = %self.model_type(),
                    id = %record.id(),
                    action,
                    "Saved model"
                );
                Ok(record)
            }
        }
    }

    /// Deletes `model` on the backend, then drops its canonical record from
    /// the identity map and every list.
    pub async fn delete_model(&self, model: &EntityRef) -> Result<(), CacheError> {
        let canonical = self.find_model(model.id());
        if let Some(record) = &canonical {
            record.set_load_state(LoadState::Pending);
        }

        if let Err(error) = self.api.delete_one(model).await {
            warn!(
                target_module = SOURCE,
                model_type = %self.model_type(),
                id = %model.id(),
                error = %error,
                "Delete request failed"
            );
            let error = CacheError::from(error);
            model.set_load_state(LoadState::Error(error.clone()));
            return Err(error);
        }

        if let Some(record) = canonical {
            record.set_load_state(LoadState::Done);
            self.models
                .remove_if(record.id(), |_, existing| Arc::ptr_eq(existing, &record));
            for list in self.all_lists() {
                list.remove_record(&record);
            }
        }
        info!(
            target_module = SOURCE,
            model_type = %self.model_type(),
            id = %model.id(),
            "Deleted model"
        );
        Ok(())
    }

    // ---- reset ----

    /// Forgets every record and list and cancels outstanding loads.
    ///
    /// Records already handed out stay usable but no longer receive updates.
    pub fn clear_repository(&self) {
        let (epoch, cancelled) = self.fetches.cancel_all();
        let models = self.models.len();
        let lists = self.lists.len();
        self.models.clear();
        self.lists.clear();
        info!(
            target_module = SOURCE,
            model_type = %self.model_type(),
            epoch,
            cancelled,
            models,
            lists,
            "Cleared repository"
        );
    }
}

impl<A: ModelApi> ListLoader for EntityStore<A> {
    fn load(&self, list: &ListRef) -> PendingLoad {
        self.load_list(list)
    }
}

impl<A: ModelApi> ModelStore for EntityStore<A> {
    fn model_type(&self) -> &str {
        &self.metadata.model_type
    }

    fn metadata(&self) -> Arc<ModelMetadata> {
        Arc::clone(&self.metadata)
    }

    fn completeness(&self) -> CompletenessCheck {
        Arc::clone(&self.is_full)
    }

    fn get_raw_model(&self, id: &str, auto_load: Option<bool>) -> EntityRef {
        self.get_model(id, auto_load)
    }

    fn has_model(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    fn find_model(&self, id: &str) -> Option<EntityRef> {
        EntityStore::find_model(self, id)
    }

    fn consume_model(&self, raw: &Value) -> Result<EntityRef, CacheError> {
        EntityStore::consume_model(self, raw)
    }

    fn clear_repository(&self) {
        EntityStore::clear_repository(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<A: ModelApi> fmt::Debug for EntityStore<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("model_type", &self.metadata.model_type)
            .field("models", &self.models.len())
            .field("lists", &self.lists.len())
            .field("in_flight", &self.fetches.in_flight_count())
            .finish()
    }
}

fn raw_id(raw: &Value) -> Option<&str> {
    raw.get("id").and_then(Value::as_str)
}

fn is_deletion(raw: &Value) -> bool {
    raw.pointer("/metadata/deleted")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::cache::error::ApiError;
    use crate::cache::metadata::{FieldKind, FieldMeta};

    struct NoBackend;

    #[async_trait]
    impl ModelApi for NoBackend {
        type CreateRequest = Value;
        type UpdateRequest = Value;

        async fn fetch_list(&self, _: &str, _: &PartialSink) -> Result<Vec<Value>, ApiError> {
            Ok(Vec::new())
        }

        async fn create(&self, request: Value) -> Result<Value, ApiError> {
            Ok(request)
        }

        async fn update(&self, request: Value) -> Result<Value, ApiError> {
            Ok(request)
        }

        async fn delete_one(&self, _: &EntityRecord) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn tag_store(registry: &Arc<Registry>) -> Arc<EntityStore<NoBackend>> {
        let metadata = ModelMetadata::new("Tag")
            .field(FieldMeta::new("id", [FieldKind::String]).required())
            .field(FieldMeta::new("label", [FieldKind::String]).required());
        let is_full = required_fields_present(&metadata);
        EntityStore::with_config(
            registry,
            metadata,
            NoBackend,
            is_full,
            &CacheConfig::default().with_auto_load(false),
        )
    }

    #[test]
    fn payload_helpers() {
        assert_eq!(raw_id(&json!({"id": "a"})), Some("a"));
        assert_eq!(raw_id(&json!({"id": 1})), None);
        assert!(is_deletion(&json!({"id": "a", "metadata": {"deleted": true}})));
        assert!(!is_deletion(&json!({"id": "a", "metadata": {}})));
    }

    #[test]
    fn identity_map_and_placeholders_without_runtime() {
        let registry = Registry::new();
        let store = tag_store(&registry);

        let first = store.get_model("t1", None);
        let second = store.get_or_create("t1");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(store.has_model("t1"));
        assert!(first.load_state().is_none());

        let draft = store.create_new_model();
        assert!(draft.is_new());
        assert!(!store.has_model(NEW_MODEL_ID));
    }

    #[test]
    fn consume_sets_done_and_fills_default_list() {
        let registry = Registry::new();
        let store = tag_store(&registry);

        let tag = store.consume_model(&json!({"id": "t1", "label": "rust"})).unwrap();
        assert!(tag.load_state().is_done());
        assert!(store.is_full_model(&tag));
        assert_eq!(store.get_existing_list("all").ids(), vec!["t1"]);

        let error = store.consume_model(&json!({"label": "orphan"})).unwrap_err();
        assert!(matches!(error, CacheError::Validation { .. }));
    }

    #[test]
    fn dropped_registry_detaches_the_store() {
        let registry = Registry::new();
        let store = tag_store(&registry);
        drop(registry);

        let tag = store.consume_model(&json!({"id": "t1", "label": "rust"})).unwrap();
        assert_eq!(tag.load_state(), LoadState::Error(CacheError::detached("Tag")));
    }
}
