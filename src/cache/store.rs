//! In-process cache store with an observer registry.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use tracing::debug;

use super::entry::{CacheEntry, CachedValue, EntryStatus};
use super::key::{KeyPattern, QueryKey};
use crate::tasks::{ApiError, Task, TaskListPage};

/// Callback invoked after every write that affects a subscribed key.
/// Receives `None` when the entry was evicted.
pub type Listener = Arc<dyn Fn(Option<&CacheEntry>) + Send + Sync>;

/// Surgical edit applied to cached list pages after a confirmed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListPatch {
  /// A record was created
  Prepend(Task),
  /// A record was updated
  Replace(Task),
  /// The record with this id was deleted
  Remove(u64),
}

#[derive(Debug, Clone)]
struct Slot {
  value: Option<CachedValue>,
  status: EntryStatus,
  last_updated_at: Option<DateTime<Utc>>,
  error: Option<ApiError>,
  /// Bumped by every invalidation and direct write. A fetch that started
  /// under an older generation may not store its result.
  generation: u64,
  /// Generation captured by the most recent fetch start
  fetching: Option<u64>,
}

impl Slot {
  fn empty(generation: u64) -> Self {
    Self {
      value: None,
      status: EntryStatus::Pending,
      last_updated_at: None,
      error: None,
      generation,
      fetching: None,
    }
  }

  fn is_expired(&self, stale_time: Duration, now: DateTime<Utc>) -> bool {
    self
      .last_updated_at
      .map(|at| now - at >= stale_time)
      .unwrap_or(true)
  }
}

struct Subscriber {
  id: u64,
  listener: Listener,
}

#[derive(Default)]
struct StoreState {
  slots: HashMap<QueryKey, Slot>,
  subscribers: HashMap<QueryKey, Vec<Subscriber>>,
  next_subscriber_id: u64,
  /// Store-wide, so a slot recreated after eviction never reuses a number
  last_generation: u64,
}

impl StoreState {
  fn next_generation(&mut self) -> u64 {
    self.last_generation += 1;
    self.last_generation
  }

  fn subscriber_count(&self, key: &QueryKey) -> usize {
    self.subscribers.get(key).map(Vec::len).unwrap_or(0)
  }

  fn entry(&self, key: &QueryKey, stale_time: Duration, now: DateTime<Utc>) -> Option<CacheEntry> {
    let slot = self.slots.get(key)?;
    let status = if slot.status == EntryStatus::Fresh && slot.is_expired(stale_time, now) {
      EntryStatus::Stale
    } else {
      slot.status
    };

    Some(CacheEntry {
      key: key.clone(),
      value: slot.value.clone(),
      status,
      last_updated_at: slot.last_updated_at,
      subscriber_count: self.subscriber_count(key),
      error: slot.error.clone(),
    })
  }

  fn notifications(
    &self,
    touched: &BTreeSet<QueryKey>,
    stale_time: Duration,
    now: DateTime<Utc>,
  ) -> Vec<(Listener, Option<CacheEntry>)> {
    let mut out = Vec::new();
    for key in touched {
      let Some(subscribers) = self.subscribers.get(key) else {
        continue;
      };
      let entry = self.entry(key, stale_time, now);
      for subscriber in subscribers {
        out.push((Arc::clone(&subscriber.listener), entry.clone()));
      }
    }
    out
  }
}

/// The sole in-process source of truth for fetched query results.
///
/// Every public operation runs under one short lock and never awaits.
/// Listeners are called after the lock is released, so they may read the
/// store again.
pub struct CacheStore {
  state: Mutex<StoreState>,
  /// How long a fresh entry stays fresh without invalidation
  stale_time: Duration,
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(StoreState::default()),
      stale_time: Duration::minutes(5),
    }
  }

  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Run several cache operations atomically.
  ///
  /// Readers never observe a half-applied group, and each touched key's
  /// subscribers are notified once, after the whole group is applied.
  pub fn transaction<R>(&self, f: impl FnOnce(&mut CacheTxn<'_>) -> R) -> R {
    let now = Utc::now();
    let (result, notifications) = {
      let mut state = self.state.lock();
      let mut txn = CacheTxn {
        state: &mut state,
        touched: BTreeSet::new(),
        stale_time: self.stale_time,
        now,
      };
      let result = f(&mut txn);
      let touched = std::mem::take(&mut txn.touched);
      (result, state.notifications(&touched, self.stale_time, now))
    };

    for (listener, entry) in notifications {
      listener(entry.as_ref());
    }
    result
  }

  /// Synchronous lookup, no network access.
  pub fn read(&self, key: &QueryKey) -> Option<CacheEntry> {
    self.state.lock().entry(key, self.stale_time, Utc::now())
  }

  /// Every entry, ordered by key.
  pub fn snapshot(&self) -> Vec<CacheEntry> {
    let state = self.state.lock();
    let now = Utc::now();
    let mut keys: Vec<&QueryKey> = state.slots.keys().collect();
    keys.sort();
    keys
      .into_iter()
      .filter_map(|key| state.entry(key, self.stale_time, now))
      .collect()
  }

  pub fn write(&self, key: QueryKey, value: CachedValue, status: EntryStatus) {
    self.transaction(|txn| txn.write(key, value, status));
  }

  pub fn set_pending(&self, key: &QueryKey) -> u64 {
    self.transaction(|txn| txn.set_pending(key))
  }

  /// Store the outcome of a fetch started under `generation`. Returns false
  /// when the entry was invalidated or overwritten in the meantime and the
  /// outcome was dropped.
  pub fn finish_fetch(
    &self,
    key: &QueryKey,
    generation: u64,
    result: &Result<CachedValue, ApiError>,
  ) -> bool {
    self.transaction(|txn| txn.finish_fetch(key, generation, result))
  }

  /// Mark matching entries stale. Returns the subscribed keys that need a
  /// background refresh.
  pub fn invalidate(&self, pattern: &KeyPattern) -> Vec<QueryKey> {
    self.transaction(|txn| txn.invalidate(pattern))
  }

  pub fn evict(&self, key: &QueryKey) -> bool {
    self.transaction(|txn| txn.evict(key))
  }

  pub fn patch_list_entries<P>(&self, predicate: P, patch: &ListPatch) -> usize
  where
    P: Fn(&QueryKey, &TaskListPage) -> bool,
  {
    self.transaction(|txn| txn.patch_list_entries(predicate, patch))
  }

  /// Move fresh entries past the staleness window to stale. Returns the
  /// subscribed keys that need a background refresh.
  pub fn expire(&self) -> Vec<QueryKey> {
    self.transaction(|txn| txn.expire())
  }

  /// Register `listener` for writes to `key`. Dropping the returned handle
  /// unsubscribes.
  pub fn subscribe(self: &Arc<Self>, key: QueryKey, listener: Listener) -> Subscription {
    let mut state = self.state.lock();
    let id = state.next_subscriber_id;
    state.next_subscriber_id += 1;
    state
      .subscribers
      .entry(key.clone())
      .or_default()
      .push(Subscriber { id, listener });
    debug!(key = %key, subscribers = state.subscriber_count(&key), "subscribed");

    Subscription {
      store: Arc::downgrade(self),
      key,
      id,
    }
  }

  fn unsubscribe(&self, key: &QueryKey, id: u64) {
    let mut state = self.state.lock();
    if let Some(subscribers) = state.subscribers.get_mut(key) {
      subscribers.retain(|s| s.id != id);
      if subscribers.is_empty() {
        state.subscribers.remove(key);
      }
    }
    debug!(key = %key, subscribers = state.subscriber_count(key), "unsubscribed");
  }
}

/// Handle returned by [`CacheStore::subscribe`].
pub struct Subscription {
  store: Weak<CacheStore>,
  key: QueryKey,
  id: u64,
}

impl Subscription {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn unsubscribe(self) {
    drop(self);
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(store) = self.store.upgrade() {
      store.unsubscribe(&self.key, self.id);
    }
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("id", &self.id)
      .finish()
  }
}

/// Mutable view of the store inside [`CacheStore::transaction`].
pub struct CacheTxn<'a> {
  state: &'a mut StoreState,
  touched: BTreeSet<QueryKey>,
  stale_time: Duration,
  now: DateTime<Utc>,
}

impl CacheTxn<'_> {
  pub fn read(&self, key: &QueryKey) -> Option<CacheEntry> {
    self.state.entry(key, self.stale_time, self.now)
  }

  /// Replace or create the entry for `key`.
  pub fn write(&mut self, key: QueryKey, value: CachedValue, status: EntryStatus) {
    let generation = self.state.next_generation();
    self.state.slots.insert(
      key.clone(),
      Slot {
        value: Some(value),
        status,
        last_updated_at: Some(self.now),
        error: None,
        generation,
        fetching: None,
      },
    );
    self.touched.insert(key);
  }

  /// Mark a fetch as started and return the generation it runs under.
  /// Keeps the previous value readable and clears the previous error.
  pub fn set_pending(&mut self, key: &QueryKey) -> u64 {
    let generation = self.state.next_generation();
    let slot = self
      .state
      .slots
      .entry(key.clone())
      .or_insert_with(|| Slot::empty(generation));
    slot.status = EntryStatus::Pending;
    slot.error = None;
    slot.fetching = Some(slot.generation);
    self.touched.insert(key.clone());
    slot.generation
  }

  pub fn finish_fetch(
    &mut self,
    key: &QueryKey,
    generation: u64,
    result: &Result<CachedValue, ApiError>,
  ) -> bool {
    let current = self.state.slots.get(key).map(|slot| slot.generation);
    if current != Some(generation) {
      // An outdated fetch with no newer one behind it leaves the entry
      // stale instead of pending forever.
      if let Some(slot) = self.state.slots.get_mut(key) {
        if slot.status == EntryStatus::Pending && slot.fetching == Some(generation) {
          slot.status = EntryStatus::Stale;
          slot.fetching = None;
          self.touched.insert(key.clone());
        }
      }
      debug!(key = %key, generation, "dropped outdated fetch result");
      return false;
    }

    match result {
      Ok(value) => {
        self.write(key.clone(), value.clone(), EntryStatus::Fresh);
        // A fetch result is not a new generation
        if let Some(slot) = self.state.slots.get_mut(key) {
          slot.generation = generation;
        }
      }
      Err(e) => {
        self.set_error(key, e.clone());
        if let Some(slot) = self.state.slots.get_mut(key) {
          slot.fetching = None;
        }
      }
    }
    true
  }

  /// Record a failed fetch. Keeps the last good value readable.
  fn set_error(&mut self, key: &QueryKey, error: ApiError) {
    let generation = self.state.next_generation();
    let slot = self
      .state
      .slots
      .entry(key.clone())
      .or_insert_with(|| Slot::empty(generation));
    slot.status = EntryStatus::Error;
    slot.error = Some(error);
    self.touched.insert(key.clone());
  }

  /// Mark matching entries stale. A fetch already running for a matching
  /// entry is outdated: its result will be dropped, and the entry stays
  /// pending until a newer fetch lands.
  pub fn invalidate(&mut self, pattern: &KeyPattern) -> Vec<QueryKey> {
    let state = &mut *self.state;
    let mut refresh = Vec::new();
    for (key, slot) in state.slots.iter_mut() {
      if !pattern.matches(key) {
        continue;
      }
      state.last_generation += 1;
      slot.generation = state.last_generation;
      if slot.status != EntryStatus::Pending {
        slot.status = EntryStatus::Stale;
        self.touched.insert(key.clone());
      }
      if state.subscribers.contains_key(key) {
        refresh.push(key.clone());
      }
    }
    debug!(?pattern, refresh = refresh.len(), "invalidated");
    refresh
  }

  /// Remove an entry nobody is watching. Detail entries may be removed at
  /// any time; their subscribers see the entry disappear.
  pub fn evict(&mut self, key: &QueryKey) -> bool {
    if !key.is_detail() && self.state.subscriber_count(key) > 0 {
      return false;
    }
    let removed = self.state.slots.remove(key).is_some();
    if removed {
      debug!(key = %key, "evicted");
      self.touched.insert(key.clone());
    }
    removed
  }

  /// Apply `patch` to every cached list page selected by `predicate`.
  /// Returns the number of pages that changed.
  pub fn patch_list_entries<P>(&mut self, predicate: P, patch: &ListPatch) -> usize
  where
    P: Fn(&QueryKey, &TaskListPage) -> bool,
  {
    let mut patched = 0;
    for (key, slot) in self.state.slots.iter_mut() {
      if !key.is_list() {
        continue;
      }
      let Some(CachedValue::Page(page)) = slot.value.as_mut() else {
        continue;
      };
      if !predicate(key, &*page) {
        continue;
      }
      if apply_patch(page, patch, matches!(key, QueryKey::List { .. })) {
        slot.last_updated_at = Some(self.now);
        self.touched.insert(key.clone());
        patched += 1;
      }
    }
    patched
  }

  pub fn expire(&mut self) -> Vec<QueryKey> {
    let state = &mut *self.state;
    let mut refresh = Vec::new();
    for (key, slot) in state.slots.iter_mut() {
      if slot.status != EntryStatus::Fresh || !slot.is_expired(self.stale_time, self.now) {
        continue;
      }
      slot.status = EntryStatus::Stale;
      self.touched.insert(key.clone());
      if state.subscribers.contains_key(key) {
        refresh.push(key.clone());
      }
    }
    refresh
  }
}

/// Edit one page in place. On a `paged` window `items.len() <= limit` holds
/// afterwards whenever it held before. Owner lists are unpaged and grow.
fn apply_patch(page: &mut TaskListPage, patch: &ListPatch, paged: bool) -> bool {
  match patch {
    ListPatch::Prepend(task) => {
      if let Some(pos) = page.position(task.id) {
        page.items[pos] = task.clone();
        return true;
      }
      page.total += 1;
      // Pages past the first would need the record that shifts in from the
      // previous page, which is not known here. They keep their items until
      // the refetch.
      if page.skip == 0 {
        page.items.insert(0, task.clone());
        if paged {
          page.items.truncate(page.limit as usize);
        } else {
          page.limit = page.limit.max(page.items.len() as u64);
        }
      }
      true
    }
    ListPatch::Replace(task) => match page.position(task.id) {
      Some(pos) if page.items[pos] != *task => {
        page.items[pos] = task.clone();
        true
      }
      _ => false,
    },
    ListPatch::Remove(id) => {
      page.items.retain(|t| t.id != *id);
      page.total = page.total.saturating_sub(1);
      true
    }
  }
}
