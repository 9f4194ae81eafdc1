//! Named, ordered collections of records.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use super::entity::{EntityRecord, EntityRef};
use super::error::CacheError;
use super::fetch::{self, PendingLoad};
use super::load_state::{LoadState, wait_settled};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::list";

pub type ListRef = Arc<ModelList>;

/// Anything that can fill a [`ModelList`]; implemented by entity stores.
pub trait ListLoader: Send + Sync {
    fn load(&self, list: &ListRef) -> PendingLoad;
}

/// Read side shared by stored and filtered lists.
pub trait ListView {
    fn name(&self) -> &str;

    fn load_state(&self) -> LoadState;

    fn total(&self) -> usize;

    fn models(&self) -> Vec<EntityRef>;

    fn invalid_models(&self) -> Vec<Value>;

    fn load_list(&self) -> PendingLoad;

    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// Serializable shape of a list: its name, filter tag and member ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    pub model_ids: Vec<String>,
}

#[derive(Default)]
struct ListState {
    models: Vec<EntityRef>,
    invalid_models: Vec<Value>,
    total: usize,
    load_state: LoadState,
}

pub struct ModelList {
    this: Weak<ModelList>,
    name: String,
    filter: Option<Value>,
    loader: Option<Weak<dyn ListLoader>>,
    state: RwLock<ListState>,
    revision: watch::Sender<u64>,
}

impl ModelList {
    pub(crate) fn new(
        name: impl Into<String>,
        filter: Option<Value>,
        loader: Option<Weak<dyn ListLoader>>,
    ) -> ListRef {
        Self::with_state(name.into(), filter, loader, ListState::default())
    }

    fn with_state(
        name: String,
        filter: Option<Value>,
        loader: Option<Weak<dyn ListLoader>>,
        state: ListState,
    ) -> ListRef {
        let (revision, _) = watch::channel(0);
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            name,
            filter,
            loader,
            state: RwLock::new(state),
            revision,
        })
    }

    /// Rebuilds a settled list from a snapshot, resolving ids through
    /// `resolve`.
    pub fn from_snapshot(
        snapshot: &ListSnapshot,
        mut resolve: impl FnMut(&str) -> EntityRef,
        loader: Option<Weak<dyn ListLoader>>,
    ) -> ListRef {
        let models: Vec<EntityRef> = snapshot.model_ids.iter().map(|id| resolve(id)).collect();
        let state = ListState {
            total: models.len(),
            models,
            invalid_models: Vec::new(),
            load_state: LoadState::Done,
        };
        Self::with_state(snapshot.name.clone(), snapshot.filter.clone(), loader, state)
    }

    pub fn snapshot(&self) -> ListSnapshot {
        let state = rw_read(&self.state, SOURCE, "snapshot");
        ListSnapshot {
            name: self.name.clone(),
            filter: self.filter.clone(),
            model_ids: state
                .models
                .iter()
                .map(|model| model.id().to_owned())
                .collect(),
        }
    }

    pub fn filter(&self) -> Option<&Value> {
        self.filter.as_ref()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.state, SOURCE, "len").models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pointer-identity membership.
    pub fn contains(&self, record: &EntityRef) -> bool {
        rw_read(&self.state, SOURCE, "contains")
            .models
            .iter()
            .any(|model| Arc::ptr_eq(model, record))
    }

    pub fn ids(&self) -> Vec<String> {
        rw_read(&self.state, SOURCE, "ids")
            .models
            .iter()
            .map(|model| model.id().to_owned())
            .collect()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub async fn settled(&self) -> LoadState {
        wait_settled(self.subscribe(), || ListView::load_state(self)).await
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

    /// Enters `Pending` and forgets the invalid payloads of the previous
    /// load.
    pub(crate) fn begin_load(&self) {
        {
            let mut state = rw_write(&self.state, SOURCE, "begin_load");
            state.invalid_models.clear();
            state.load_state = LoadState::Pending;
        }
        self.touch();
    }

    pub(crate) fn clear_models(&self) {
        {
            let mut state = rw_write(&self.state, SOURCE, "clear_models");
            state.models.clear();
            state.invalid_models.clear();
        }
        self.touch();
    }

    /// Writes `placed` records at their absolute positions, appending past
    /// the end, records `invalid` payloads, then drops duplicate ids so the
    /// last occurrence wins.
    pub(crate) fn place(&self, placed: Vec<(usize, EntityRef)>, invalid: Vec<Value>) {
        {
            let mut state = rw_write(&self.state, SOURCE, "place");
            for (index, record) in placed {
                if index < state.models.len() {
                    state.models[index] = record;
                } else {
                    state.models.push(record);
                }
            }
            state.invalid_models.extend(invalid);
            dedupe_keep_last(&mut state.models);
        }
        self.touch();
    }

    /// Settles the list after a batch of payloads was placed.
    pub(crate) fn finish_batch(&self, model_type: &str) {
        {
            let mut state = rw_write(&self.state, SOURCE, "finish_batch");
            state.total = state.models.len();
            state.load_state = match state.invalid_models.len() {
                0 => LoadState::Done,
                count => LoadState::Error(CacheError::invalid_models(model_type, count)),
            };
        }
        self.touch();
    }

    /// Inserts `record` at the front unless it is already a member.
    pub(crate) fn unshift_if_absent(&self, record: &EntityRef) -> bool {
        {
            let mut state = rw_write(&self.state, SOURCE, "unshift_if_absent");
            if state.models.iter().any(|model| Arc::ptr_eq(model, record)) {
                return false;
            }
            state.models.insert(0, Arc::clone(record));
            state.total += 1;
        }
        self.touch();
        true
    }

    pub(crate) fn remove_record(&self, record: &EntityRecord) -> bool {
        self.remove_where(|model| std::ptr::eq(Arc::as_ptr(model), record))
    }

    pub(crate) fn remove_id(&self, id: &str) -> bool {
        self.remove_where(|model| model.id() == id)
    }

    fn remove_where(&self, matches: impl Fn(&EntityRef) -> bool) -> bool {
        {
            let mut state = rw_write(&self.state, SOURCE, "remove");
            let Some(index) = state.models.iter().position(|model| matches(model)) else {
                return false;
            };
            state.models.remove(index);
            state.total = state.total.saturating_sub(1);
        }
        self.touch();
        true
    }

    fn touch(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl ListView for ModelList {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_state(&self) -> LoadState {
        rw_read(&self.state, SOURCE, "load_state").load_state.clone()
    }

    fn total(&self) -> usize {
        rw_read(&self.state, SOURCE, "total").total
    }

    fn models(&self) -> Vec<EntityRef> {
        rw_read(&self.state, SOURCE, "models").models.clone()
    }

    fn invalid_models(&self) -> Vec<Value> {
        rw_read(&self.state, SOURCE, "invalid_models")
            .invalid_models
            .clone()
    }

    /// Loads through the owning store; a detached list reports its current
    /// state.
    fn load_list(&self) -> PendingLoad {
        let loader = self.loader.as_ref().and_then(Weak::upgrade);
        match (loader, self.this.upgrade()) {
            (Some(loader), Some(this)) => loader.load(&this),
            _ => fetch::ready(ListView::load_state(self)),
        }
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

impl fmt::Debug for ModelList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = rw_read(&self.state, SOURCE, "debug");
        f.debug_struct("ModelList")
            .field("name", &self.name)
            .field("load_state", &state.load_state)
            .field("total", &state.total)
            .field("models", &state.models.len())
            .field("invalid_models", &state.invalid_models.len())
            .finish()
    }
}

fn dedupe_keep_last(models: &mut Vec<EntityRef>) {
    let mut seen = HashSet::with_capacity(models.len());
    let mut kept: Vec<EntityRef> = models
        .drain(..)
        .rev()
        .filter(|model| seen.insert(model.id().to_owned()))
        .collect();
    kept.reverse();
    *models = kept;
}
