//! Identity-bound shared records.
//!
//! A record is created once per `(model_type, id)` and handed out as an
//! [`EntityRef`]. Its fields and load state mutate in place, so every holder
//! observes payloads and errors as they arrive.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use serde_json::{Map, Value};
use tokio::sync::watch;

use super::load_state::{LoadState, wait_settled};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::entity";

/// Placeholder id carried by records that do not exist on the backend yet.
pub const NEW_MODEL_ID: &str = "@@new";

pub type EntityRef = Arc<EntityRecord>;

pub type FieldSet = BTreeMap<String, FieldValue>;

/// Finds the record currently registered for `(model_type, id)`.
pub trait LinkLookup: Send + Sync {
    fn find_model(&self, model_type: &str, id: &str) -> Option<EntityRef>;
}

#[derive(Clone)]
enum LinkTarget {
    Shared(EntityRef),
    /// Links from a record to itself; a strong pointer would never be freed.
    SelfRef(Weak<EntityRecord>),
}

/// Reference from one record to another.
///
/// The record resolved at denormalization time stays reachable through the
/// link, so a deleted target remains observable in its `Deleted` state.
/// Links built with a [`LinkLookup`] follow the identity map on every read:
/// once the target's store is cleared and the id is requested again, the
/// link yields the new canonical record.
#[derive(Clone)]
pub struct EntityLink {
    model_type: String,
    id: String,
    target: LinkTarget,
    lookup: Option<Weak<dyn LinkLookup>>,
}

impl EntityLink {
    pub fn new(record: &EntityRef) -> Self {
        Self {
            model_type: record.model_type.clone(),
            id: record.id.clone(),
            target: LinkTarget::Shared(Arc::clone(record)),
            lookup: None,
        }
    }

    pub fn with_lookup(mut self, lookup: Weak<dyn LinkLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The linked record: the current canonical one when the lookup knows
    /// it, otherwise the record resolved originally. Deleted targets are
    /// returned as they are.
    pub fn get(&self) -> Option<EntityRef> {
        let resolved = match &self.target {
            LinkTarget::Shared(record) => Some(Arc::clone(record)),
            LinkTarget::SelfRef(record) => record.upgrade(),
        };
        if resolved
            .as_ref()
            .is_some_and(|record| record.load_state().is_deleted())
        {
            return resolved;
        }
        self.lookup
            .as_ref()
            .and_then(Weak::upgrade)
            .and_then(|lookup| lookup.find_model(&self.model_type, &self.id))
            .or(resolved)
    }

    pub fn points_to(&self, record: &EntityRecord) -> bool {
        self.model_type == record.model_type && self.id == record.id
    }

    fn is_shared_with(&self, record: &EntityRecord) -> bool {
        matches!(&self.target, LinkTarget::Shared(target) if std::ptr::eq(Arc::as_ptr(target), record))
    }

    fn downgrade(&mut self) {
        let LinkTarget::Shared(target) = &self.target else {
            return;
        };
        let weak = Arc::downgrade(target);
        self.target = LinkTarget::SelfRef(weak);
    }
}

impl PartialEq for EntityLink {
    fn eq(&self, other: &Self) -> bool {
        self.model_type == other.model_type && self.id == other.id
    }
}

impl Eq for EntityLink {}

impl fmt::Debug for EntityLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.model_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    Link(EntityLink),
    Links(Vec<EntityLink>),
}

impl FieldValue {
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&EntityLink> {
        match self {
            Self::Link(link) => Some(link),
            _ => None,
        }
    }

    fn weaken_links_to(&mut self, record: &EntityRecord) {
        let links = match self {
            Self::Link(link) => std::slice::from_mut(link),
            Self::Links(links) => links.as_mut_slice(),
            Self::Value(_) => return,
        };
        for link in links.iter_mut().filter(|link| link.is_shared_with(record)) {
            link.downgrade();
        }
    }

    /// Wire form of the value; links collapse to their ids.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Link(link) => Value::String(link.id.clone()),
            Self::Links(links) => links
                .iter()
                .map(|link| Value::String(link.id.clone()))
                .collect(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

#[derive(Default)]
struct EntityState {
    fields: FieldSet,
    load_state: LoadState,
}

pub struct EntityRecord {
    model_type: String,
    id: String,
    state: RwLock<EntityState>,
    revision: watch::Sender<u64>,
}

impl EntityRecord {
    pub(crate) fn new(model_type: impl Into<String>, id: impl Into<String>, fields: FieldSet) -> EntityRef {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            model_type: model_type.into(),
            id: id.into(),
            state: RwLock::new(EntityState {
                fields,
                load_state: LoadState::None,
            }),
            revision,
        })
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_new(&self) -> bool {
        self.id == NEW_MODEL_ID
    }

    pub fn load_state(&self) -> LoadState {
        rw_read(&self.state, SOURCE, "load_state").load_state.clone()
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        rw_read(&self.state, SOURCE, "field").fields.get(name).cloned()
    }

    /// Plain JSON value of a field; `None` for links and unknown fields.
    pub fn value(&self, name: &str) -> Option<Value> {
        match self.field(name)? {
            FieldValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn link(&self, name: &str) -> Option<EntityRef> {
        match self.field(name)? {
            FieldValue::Link(link) => link.get(),
            _ => None,
        }
    }

    pub fn links(&self, name: &str) -> Vec<EntityRef> {
        match self.field(name) {
            Some(FieldValue::Links(links)) => links.iter().filter_map(EntityLink::get).collect(),
            _ => Vec::new(),
        }
    }

    pub fn fields(&self) -> FieldSet {
        rw_read(&self.state, SOURCE, "fields").fields.clone()
    }

    /// The record as a JSON object with links rendered as ids.
    pub fn to_json(&self) -> Value {
        let state = rw_read(&self.state, SOURCE, "to_json");
        let mut object = Map::with_capacity(state.fields.len() + 1);
        object.insert("id".to_owned(), Value::String(self.id.clone()));
        for (name, value) in &state.fields {
            object.insert(name.clone(), value.to_json());
        }
        Value::Object(object)
    }

    /// Number of mutations applied so far.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver that wakes on every field or state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Resolves once the record leaves `None`/`Pending`.
    pub async fn settled(&self) -> LoadState {
        wait_settled(self.subscribe(), || self.load_state()).await
    }

    pub(crate) fn set_load_state(&self, load_state: LoadState) {
        {
            let mut state = rw_write(&self.state, SOURCE, "set_load_state");
            if state.load_state == load_state {
                return;
            }
            state.load_state = load_state;
        }
        self.touch();
    }

    pub(crate) fn merge_fields(&self, mut fields: FieldSet) {
        if fields.is_empty() {
            return;
        }
        for value in fields.values_mut() {
            value.weaken_links_to(self);
        }
        rw_write(&self.state, SOURCE, "merge_fields")
            .fields
            .extend(fields);
        self.touch();
    }

    fn touch(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = rw_read(&self.state, SOURCE, "debug");
        f.debug_struct("EntityRecord")
            .field("model_type", &self.model_type)
            .field("id", &self.id)
            .field("load_state", &state.load_state)
            .field("fields", &state.fields)
            .finish()
    }
}
