//! Cross-type registry of entity stores.
//!
//! Link fields name a model type and an id; the registry routes them to the
//! store owning that type so every record stays unique per `(type, id)`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;
use tracing::{info, warn};

use super::api::ModelApi;
use super::denormalize::{Denormalizer, LinkResolver, SchemaDenormalizer};
use super::entity::{EntityRecord, EntityRef, LinkLookup};
use super::error::{CacheError, UnknownTypeError};
use super::lock::{rw_read, rw_write};
use super::metadata::ModelMetadata;
use super::optional::OptionalModel;
use super::store::{CompletenessCheck, EntityStore};

const SOURCE: &str = "cache::registry";

/// Type-erased view of an [`EntityStore`].
pub trait ModelStore: Send + Sync + 'static {
    fn model_type(&self) -> &str;

    fn metadata(&self) -> Arc<ModelMetadata>;

    fn completeness(&self) -> CompletenessCheck;

    fn get_raw_model(&self, id: &str, auto_load: Option<bool>) -> EntityRef;

    fn has_model(&self, id: &str) -> bool;

    /// The record in the identity map, without creating one.
    fn find_model(&self, id: &str) -> Option<EntityRef>;

    fn consume_model(&self, raw: &Value) -> Result<EntityRef, CacheError>;

    fn clear_repository(&self);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub struct Registry {
    this: Weak<Registry>,
    stores: RwLock<HashMap<String, Arc<dyn ModelStore>>>,
    denormalizer: Arc<dyn Denormalizer>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Self::with_denormalizer(Arc::new(SchemaDenormalizer))
    }

    pub fn with_denormalizer(denormalizer: Arc<dyn Denormalizer>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            stores: RwLock::new(HashMap::new()),
            denormalizer,
        })
    }

    /// Adds `store` under its model type, replacing any previous store.
    pub fn register(&self, store: Arc<dyn ModelStore>) {
        let model_type = store.model_type().to_owned();
        let replaced = rw_write(&self.stores, SOURCE, "register")
            .insert(model_type.clone(), store)
            .is_some();
        if replaced {
            warn!(
                target_module = SOURCE,
                model_type = %model_type,
                "Replaced an already registered store"
            );
        } else {
            info!(target_module = SOURCE, model_type = %model_type, "Registered store");
        }
    }

    pub fn get_store(&self, model_type: &str) -> Option<Arc<dyn ModelStore>> {
        rw_read(&self.stores, SOURCE, "get_store")
            .get(model_type)
            .cloned()
    }

    /// The concrete store for `model_type`, if it is backed by `A`.
    pub fn get_typed_store<A: ModelApi>(&self, model_type: &str) -> Option<Arc<EntityStore<A>>> {
        self.get_store(model_type)?
            .into_any()
            .downcast::<EntityStore<A>>()
            .ok()
    }

    pub fn model_types(&self) -> Vec<String> {
        let mut types: Vec<String> = rw_read(&self.stores, SOURCE, "model_types")
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    fn store(&self, model_type: &str) -> Result<Arc<dyn ModelStore>, UnknownTypeError> {
        self.get_store(model_type)
            .ok_or_else(|| UnknownTypeError::new(model_type))
    }

    /// Record for `(model_type, id)`, loading it on first access.
    pub fn get_model(&self, model_type: &str, id: &str) -> Result<OptionalModel, UnknownTypeError> {
        let store = self.store(model_type)?;
        let record = store.get_raw_model(id, None);
        Ok(OptionalModel::new(record, store.completeness()))
    }

    pub fn get_raw_model(&self, model_type: &str, id: &str) -> Result<EntityRef, UnknownTypeError> {
        Ok(self.store(model_type)?.get_raw_model(id, None))
    }

    /// `false` for unknown types.
    pub fn is_full_model(&self, record: &EntityRecord, model_type: &str) -> bool {
        self.get_store(model_type)
            .is_some_and(|store| (store.completeness())(record))
    }

    pub fn metadata(&self, model_type: &str) -> Result<Arc<ModelMetadata>, UnknownTypeError> {
        Ok(self.store(model_type)?.metadata())
    }

    pub fn is_known_type(&self, model_type: &str) -> bool {
        rw_read(&self.stores, SOURCE, "is_known_type").contains_key(model_type)
    }

    /// Denormalizes `raw` into `record`, merging every valid field even when
    /// others fail.
    pub fn denormalize_model(
        &self,
        record: &EntityRecord,
        raw: &Value,
        metadata: &ModelMetadata,
    ) -> Result<(), CacheError> {
        let result = self.denormalizer.denormalize(raw, metadata, self);
        record.merge_fields(result.value);
        if result.errors.is_empty() {
            Ok(())
        } else {
            Err(CacheError::validation(&metadata.model_type, result.errors))
        }
    }

    pub fn clear_all(&self) {
        let stores: Vec<Arc<dyn ModelStore>> = rw_read(&self.stores, SOURCE, "clear_all")
            .values()
            .cloned()
            .collect();
        for store in &stores {
            store.clear_repository();
        }
        info!(target_module = SOURCE, stores = stores.len(), "Cleared every store");
    }
}

impl LinkResolver for Registry {
    fn resolve_link(&self, model_type: &str, id: &str) -> Result<EntityRef, UnknownTypeError> {
        self.get_raw_model(model_type, id)
    }

    fn is_known_type(&self, model_type: &str) -> bool {
        Registry::is_known_type(self, model_type)
    }

    fn link_lookup(&self) -> Option<Weak<dyn LinkLookup>> {
        let lookup: Weak<dyn LinkLookup> = self.this.clone();
        Some(lookup)
    }
}

impl LinkLookup for Registry {
    fn find_model(&self, model_type: &str, id: &str) -> Option<EntityRef> {
        self.get_store(model_type)?.find_model(id)
    }
}
