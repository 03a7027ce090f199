//! The [`QueryCache`] itself: entries, observers, and the fetch outbox.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::{CacheData, CacheEntry, CacheKey, FetchTicket};
use crate::error::SyncError;
use crate::model::{Task, TaskId};

/// Called with the new entry every time the observed key changes.
///
/// Listeners run inside the cache call that caused the change and must not
/// call back into the cache.
pub type Listener = Box<dyn FnMut(&Arc<CacheEntry>)>;

/// Handle for one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Returned by [`QueryCache::subscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// The entry as it stands after the subscribe (possibly now loading).
    pub entry: Arc<CacheEntry>,
}

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Data stored, entry fresh.
    Applied,
    /// Error stored on the entry, prior data kept.
    Failed,
    /// A newer fetch, a patch, or a cancellation overtook this ticket.
    Superseded,
}

struct Slot {
    entry: Arc<CacheEntry>,
    observers: Vec<SubscriptionId>,
    /// Generation of the fetch whose result we are still willing to accept.
    in_flight: Option<u64>,
}

impl Slot {
    fn new(key: CacheKey) -> Self {
        Self {
            entry: Arc::new(CacheEntry::empty(key)),
            observers: Vec::new(),
            in_flight: None,
        }
    }

    fn needs_fetch(&self) -> bool {
        self.entry.is_stale && self.in_flight.is_none()
    }
}

struct Observer {
    key: CacheKey,
    listener: Listener,
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

/// Process-wide store of remote-derived data, owned by one session.
///
/// All changes to an entry's data go through [`patch`](Self::patch) or
/// [`complete_fetch`](Self::complete_fetch). Fetches are not executed here;
/// they queue up as [`FetchTicket`]s in an outbox drained with
/// [`drain_fetches`](Self::drain_fetches).
#[derive(Default)]
pub struct QueryCache {
    slots: BTreeMap<CacheKey, Slot>,
    observers: BTreeMap<SubscriptionId, Observer>,
    outbox: VecDeque<FetchTicket>,
    next_subscription: u64,
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` on `key` and return the current entry.
    ///
    /// Creates the entry on first use. Issues a fetch if the entry is stale
    /// (never fetched, invalidated, or last fetch failed) and nothing is in
    /// flight for it.
    pub fn subscribe(&mut self, key: CacheKey, listener: Listener) -> Subscription {
        if self.slot_mut(key).needs_fetch() {
            self.begin_fetch(key);
        }

        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.attach(key, id, listener);
        debug!(%key, subscription = id.0, "subscribed");

        Subscription {
            id,
            entry: self.entry_arc(key),
        }
    }

    /// Remove an observer. When the last observer of a key leaves, its
    /// in-flight fetch is cancelled and the late response will be dropped.
    /// The entry itself stays cached.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(observer) = self.observers.remove(&id) else {
            return false;
        };
        self.detach(observer.key, id);
        debug!(key = %observer.key, subscription = id.0, "unsubscribed");
        true
    }

    /// Move a live observer to another key, as when the active workspace
    /// changes. The listener is called once with the new key's entry.
    pub fn rekey(&mut self, id: SubscriptionId, new_key: CacheKey) -> Option<Arc<CacheEntry>> {
        let observer = self.observers.remove(&id)?;
        if observer.key == new_key {
            self.observers.insert(id, observer);
            return self.read(new_key);
        }

        let old_key = observer.key;
        self.detach(old_key, id);
        if self.slot_mut(new_key).needs_fetch() {
            self.begin_fetch(new_key);
        }
        let mut listener = observer.listener;
        let entry = self.entry_arc(new_key);
        listener(&entry);
        self.attach(new_key, id, listener);
        debug!(from = %old_key, to = %new_key, subscription = id.0, "rekeyed");
        Some(entry)
    }

    /// Current entry for `key`, without subscribing or fetching.
    #[must_use]
    pub fn read(&self, key: CacheKey) -> Option<Arc<CacheEntry>> {
        self.slots.get(&key).map(|slot| Arc::clone(&slot.entry))
    }

    /// Replace the data under `key` with `updater(current)` and notify
    /// observers once. No fetch is issued.
    ///
    /// The patch advances the key's generation, so a fetch issued before it
    /// can no longer overwrite the patched data. Staleness is left as it was.
    pub fn patch<F>(&mut self, key: CacheKey, updater: F) -> Arc<CacheEntry>
    where
        F: FnOnce(Option<&CacheData>) -> Option<CacheData>,
    {
        let slot = self.slot_mut(key);
        let superseded = slot.in_flight.take();
        let current = Arc::clone(&slot.entry);
        let next = CacheEntry {
            key,
            data: updater(current.data.as_ref()),
            error: current.error.clone(),
            is_loading: false,
            is_stale: current.is_stale,
            generation: current.generation + 1,
        };
        trace!(%key, generation = next.generation, ?superseded, "patched");
        self.publish(key, next)
    }

    /// Mark `key` stale. If it has observers, issue a background refetch;
    /// displayed data is kept until the response lands.
    ///
    /// Returns `true` when a fetch was issued.
    pub fn invalidate(&mut self, key: CacheKey) -> bool {
        let Some(slot) = self.slots.get_mut(&key) else {
            return false;
        };

        if !slot.entry.is_stale {
            let mut stale = (*slot.entry).clone();
            stale.is_stale = true;
            slot.entry = Arc::new(stale);
        }

        if slot.observers.is_empty() {
            debug!(%key, "invalidated (unobserved)");
            return false;
        }

        let ticket = self.begin_fetch(key);
        debug!(%ticket, "invalidated");
        true
    }

    /// Invalidate every cached key matching `pred`. Returns how many fetches
    /// were issued.
    pub fn invalidate_matching(&mut self, pred: impl Fn(CacheKey) -> bool) -> usize {
        let keys: Vec<CacheKey> = self.slots.keys().copied().filter(|k| pred(*k)).collect();
        keys.into_iter().filter(|k| self.invalidate(*k)).count()
    }

    /// Apply the result of a fetch issued under `ticket`.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<CacheData, SyncError>,
    ) -> FetchOutcome {
        let Some(slot) = self.slots.get_mut(&ticket.key) else {
            return FetchOutcome::Superseded;
        };
        if slot.in_flight != Some(ticket.generation) {
            debug!(
                %ticket,
                current = slot.entry.generation,
                "discarding superseded fetch response"
            );
            return FetchOutcome::Superseded;
        }
        slot.in_flight = None;

        let current = Arc::clone(&slot.entry);
        let (next, outcome) = match result {
            Ok(data) => (
                CacheEntry {
                    key: ticket.key,
                    data: Some(data),
                    error: None,
                    is_loading: false,
                    is_stale: false,
                    generation: current.generation,
                },
                FetchOutcome::Applied,
            ),
            Err(err) => {
                warn!(%ticket, error = %err, "fetch failed, keeping previous data");
                (
                    CacheEntry {
                        key: ticket.key,
                        data: current.data.clone(),
                        error: Some(err),
                        is_loading: false,
                        is_stale: true,
                        generation: current.generation,
                    },
                    FetchOutcome::Failed,
                )
            }
        };
        self.publish(ticket.key, next);
        outcome
    }

    /// Take every queued ticket that is still the current in-flight fetch for
    /// its key. Superseded tickets are dropped here instead of hitting the
    /// network.
    pub fn drain_fetches(&mut self) -> Vec<FetchTicket> {
        let queued: Vec<FetchTicket> = self.outbox.drain(..).collect();
        queued
            .into_iter()
            .filter(|t| {
                self.slots
                    .get(&t.key)
                    .is_some_and(|s| s.in_flight == Some(t.generation))
            })
            .collect()
    }

    /// Issue fetches for observed entries that are stale with nothing in
    /// flight, e.g. after a patch overtook a refetch.
    pub fn revalidate_stale(&mut self) -> usize {
        let keys: Vec<CacheKey> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.needs_fetch() && !slot.observers.is_empty())
            .map(|(key, _)| *key)
            .collect();
        for key in &keys {
            self.begin_fetch(*key);
        }
        keys.len()
    }

    /// Find a task in any cached workspace task list.
    #[must_use]
    pub fn find_task(&self, id: TaskId) -> Option<Task> {
        self.slots
            .iter()
            .filter(|(key, _)| matches!(key, CacheKey::WorkspaceTasks(_)))
            .find_map(|(_, slot)| slot.entry.task(id).cloned())
    }

    #[must_use]
    pub fn observer_count(&self, key: CacheKey) -> usize {
        self.slots.get(&key).map_or(0, |slot| slot.observers.len())
    }

    #[must_use]
    pub fn is_in_flight(&self, key: CacheKey) -> bool {
        self.slots.get(&key).is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Cached keys, in key order.
    pub fn keys(&self) -> impl Iterator<Item = CacheKey> + '_ {
        self.slots.keys().copied()
    }

    /// Drop every entry, observer and queued fetch without refetching.
    pub fn clear(&mut self) {
        debug!(entries = self.slots.len(), "clearing cache");
        self.slots.clear();
        self.observers.clear();
        self.outbox.clear();
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn slot_mut(&mut self, key: CacheKey) -> &mut Slot {
        self.slots.entry(key).or_insert_with(|| Slot::new(key))
    }

    fn entry_arc(&mut self, key: CacheKey) -> Arc<CacheEntry> {
        Arc::clone(&self.slot_mut(key).entry)
    }

    fn attach(&mut self, key: CacheKey, id: SubscriptionId, listener: Listener) {
        self.slot_mut(key).observers.push(id);
        self.observers.insert(id, Observer { key, listener });
    }

    fn detach(&mut self, key: CacheKey, id: SubscriptionId) {
        let Some(slot) = self.slots.get_mut(&key) else {
            return;
        };
        slot.observers.retain(|o| *o != id);
        if !slot.observers.is_empty() {
            return;
        }
        if let Some(generation) = slot.in_flight.take() {
            let mut cancelled = (*slot.entry).clone();
            cancelled.is_loading = false;
            cancelled.generation += 1;
            slot.entry = Arc::new(cancelled);
            debug!(%key, generation, "cancelled in-flight fetch, no observers left");
        }
    }

    fn begin_fetch(&mut self, key: CacheKey) -> FetchTicket {
        let slot = self.slot_mut(key);
        let generation = slot.entry.generation + 1;
        slot.in_flight = Some(generation);
        let mut next = (*slot.entry).clone();
        next.generation = generation;
        next.is_loading = true;

        let ticket = FetchTicket { key, generation };
        self.outbox.push_back(ticket);
        trace!(%ticket, "fetch issued");
        self.publish(key, next);
        ticket
    }

    fn publish(&mut self, key: CacheKey, next: CacheEntry) -> Arc<CacheEntry> {
        let entry = Arc::new(next);
        let slot = self.slot_mut(key);
        slot.entry = Arc::clone(&entry);
        let ids = slot.observers.clone();
        for id in ids {
            if let Some(observer) = self.observers.get_mut(&id) {
                (observer.listener)(&entry);
            }
        }
        entry
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("keys", &self.slots.keys().collect::<Vec<_>>())
            .field("observers", &self.observers.len())
            .field("queued_fetches", &self.outbox.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
