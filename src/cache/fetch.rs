//! In-flight fetch tickets and soft cancellation.
//!
//! Every outstanding load is tracked as a shared future keyed by the address
//! of the record or list it fills. Concurrent requests for the same target
//! join that future. A repository clear bumps the epoch; completions started
//! under an older epoch no longer apply their results.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::counter;
use tokio::runtime::Handle;
use tracing::debug;

use super::entity::EntityRef;
use super::list::ListRef;
use super::load_state::LoadState;

const SOURCE: &str = "cache::fetch";

pub const FETCH_STARTED: &str = "normcache_fetch_started_total";
pub const FETCH_JOINED: &str = "normcache_fetch_joined_total";
pub const FETCH_SUPPRESSED: &str = "normcache_fetch_suppressed_total";

/// Monotonic generation of a store's fetches.
pub type Epoch = u64;

/// A load that any number of callers can await; resolves to the settled
/// state of its target.
pub type PendingLoad = Shared<BoxFuture<'static, LoadState>>;

/// Already-settled load.
pub fn ready(state: LoadState) -> PendingLoad {
    futures::future::ready(state).boxed().shared()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FetchKey {
    Entity(usize),
    List(usize),
}

impl FetchKey {
    pub(crate) fn entity(record: &EntityRef) -> Self {
        Self::Entity(Arc::as_ptr(record) as usize)
    }

    pub(crate) fn list(list: &ListRef) -> Self {
        Self::List(Arc::as_ptr(list) as usize)
    }

    pub(crate) fn kind(self) -> &'static str {
        match self {
            Self::Entity(_) => "entity",
            Self::List(_) => "list",
        }
    }
}

struct Ticket {
    epoch: Epoch,
    load: PendingLoad,
}

pub(crate) struct FetchCoordinator {
    this: Weak<FetchCoordinator>,
    tickets: DashMap<FetchKey, Ticket>,
    epoch: AtomicU64,
}

impl FetchCoordinator {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            tickets: DashMap::new(),
            epoch: AtomicU64::new(0),
        })
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn is_current(&self, epoch: Epoch) -> bool {
        self.epoch() == epoch
    }

    pub(crate) fn in_flight(&self, key: FetchKey) -> Option<PendingLoad> {
        self.tickets.get(&key).map(|ticket| ticket.load.clone())
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.tickets.len()
    }

    /// Joins the outstanding load for `key`, or starts one with `start`.
    ///
    /// `start` runs at most once per ticket, under the map entry, and must
    /// only build the future. The new load is spawned on the current runtime
    /// so it makes progress even if nobody awaits it.
    pub(crate) fn dispatch<F, Fut>(&self, key: FetchKey, start: F) -> PendingLoad
    where
        F: FnOnce(Epoch) -> Fut,
        Fut: Future<Output = LoadState> + Send + 'static,
    {
        use dashmap::mapref::entry::Entry;

        let load = match self.tickets.entry(key) {
            Entry::Occupied(ticket) => {
                counter!(FETCH_JOINED, "kind" => key.kind()).increment(1);
                debug!(
                    target_module = SOURCE,
                    kind = key.kind(),
                    epoch = ticket.get().epoch,
                    "Joined in-flight fetch"
                );
                return ticket.get().load.clone();
            }
            Entry::Vacant(slot) => {
                let epoch = self.epoch();
                let coordinator = self.this.clone();
                let work = start(epoch);
                let load = async move {
                    let state = work.await;
                    if let Some(coordinator) = coordinator.upgrade() {
                        coordinator.settle(key, epoch);
                    }
                    state
                }
                .boxed()
                .shared();
                slot.insert(Ticket {
                    epoch,
                    load: load.clone(),
                });
                load
            }
        };

        counter!(FETCH_STARTED, "kind" => key.kind()).increment(1);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(load.clone());
            }
            Err(_) => debug!(
                target_module = SOURCE,
                kind = key.kind(),
                "No runtime available; fetch runs when awaited"
            ),
        }
        load
    }

    /// Drops every ticket and starts a new epoch. Returns the new epoch and
    /// the number of tickets dropped.
    pub(crate) fn cancel_all(&self) -> (Epoch, usize) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let dropped = self.tickets.len();
        self.tickets.clear();
        (epoch, dropped)
    }

    pub(crate) fn note_suppressed(&self, kind: &'static str, epoch: Epoch) {
        counter!(FETCH_SUPPRESSED, "kind" => kind).increment(1);
        debug!(
            target_module = SOURCE,
            kind,
            stale_epoch = epoch,
            current_epoch = self.epoch(),
            "Suppressed fetch result from a cleared repository"
        );
    }

    fn settle(&self, key: FetchKey, epoch: Epoch) {
        self.tickets
            .remove_if(&key, |_, ticket| ticket.epoch == epoch);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::oneshot;

    use super::*;
    use crate::cache::entity::{EntityRecord, FieldSet};

    #[tokio::test]
    async fn concurrent_dispatches_share_one_load() {
        let coordinator = FetchCoordinator::new();
        let record = EntityRecord::new("Post", "1", FieldSet::new());
        let key = FetchKey::entity(&record);
        let starts = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();

        let first = coordinator.dispatch(key, |_| {
            starts.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = gate.await;
                LoadState::Done
            }
        });
        let second = coordinator.dispatch(key, |_| {
            starts.fetch_add(1, Ordering::SeqCst);
            async { LoadState::Pending }
        });

        assert_eq!(coordinator.in_flight_count(), 1);
        release.send(()).unwrap();

        assert_eq!(first.await, LoadState::Done);
        assert_eq!(second.await, LoadState::Done);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn cancel_all_starts_new_epoch_and_keeps_fresh_tickets() {
        let coordinator = FetchCoordinator::new();
        let record = EntityRecord::new("Post", "1", FieldSet::new());
        let key = FetchKey::entity(&record);
        let (release_old, gate_old) = oneshot::channel::<()>();

        let stale = coordinator.dispatch(key, |epoch| {
            assert_eq!(epoch, 0);
            async move {
                let _ = gate_old.await;
                LoadState::Done
            }
        });

        let (epoch, dropped) = coordinator.cancel_all();
        assert_eq!((epoch, dropped), (1, 1));
        assert!(!coordinator.is_current(0));

        let (release_new, gate_new) = oneshot::channel::<()>();
        let fresh = coordinator.dispatch(key, |epoch| {
            assert_eq!(epoch, 1);
            async move {
                let _ = gate_new.await;
                LoadState::Done
            }
        });

        release_old.send(()).unwrap();
        stale.await;
        // The stale completion must not remove the ticket of the new epoch.
        assert!(coordinator.in_flight(key).is_some());

        release_new.send(()).unwrap();
        fresh.await;
        assert!(coordinator.in_flight(key).is_none());
    }
}
