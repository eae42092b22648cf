//! Query coordinator: cache-first reads with request deduplication.
//!
//! Inspired by TanStack Query. A `QueryClient` issues reads for a
//! `QueryKey`, writes the results into the shared `CacheStore`, and makes
//! sure only one request per key is in flight at a time.
//!
//! # Example
//!
//! ```ignore
//! let queries = QueryClient::new(store, api, QueryOptions::default());
//!
//! // Views subscribe; a background fetch starts if the entry is missing
//! // or stale, and the listener hears about every write to the key.
//! let sub = queries.subscribe(QueryKey::list(30, 0), listener);
//!
//! // In render
//! match queries.store().read(sub.key()) {
//!     Some(entry) if entry.is_loading() => render_spinner(),
//!     Some(entry) => render_page(entry.page()),
//!     None => {}
//! }
//! ```

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{
  CacheStore, CachedValue, EntryStatus, KeyPattern, Listener, QueryKey, Subscription,
};
use crate::tasks::{ApiError, TaskApi};

/// A fetch that any number of callers can await
pub type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, ApiError>>>;

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
  /// Extra attempts for a read that failed with a retryable error
  pub retry: u32,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self { retry: 1 }
  }
}

struct InFlight {
  id: u64,
  fetch: SharedFetch,
}

struct Inner {
  store: Arc<CacheStore>,
  api: Arc<dyn TaskApi>,
  in_flight: Mutex<HashMap<QueryKey, InFlight>>,
  next_fetch_id: AtomicU64,
  options: QueryOptions,
}

/// Issues reads through the cache store.
///
/// Cheap to clone; clones share the store and the in-flight table.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl QueryClient {
  pub fn new(store: Arc<CacheStore>, api: Arc<dyn TaskApi>, options: QueryOptions) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        api,
        in_flight: Mutex::new(HashMap::new()),
        next_fetch_id: AtomicU64::new(0),
        options,
      }),
    }
  }

  pub fn store(&self) -> &Arc<CacheStore> {
    &self.inner.store
  }

  pub(crate) fn api(&self) -> &Arc<dyn TaskApi> {
    &self.inner.api
  }

  /// Fetch `key` from the network, joining an outstanding fetch for the
  /// same key if there is one.
  ///
  /// The request runs on its own task, so it completes and lands in the
  /// cache even if every caller stops awaiting.
  pub fn fetch(&self, key: QueryKey) -> SharedFetch {
    let mut in_flight = self.inner.in_flight.lock();
    if let Some(existing) = in_flight.get(&key) {
      debug!(key = %key, "joined in-flight fetch");
      return existing.fetch.clone();
    }
    self.start(&mut in_flight, key)
  }

  /// Fetch `key` with a new request even if one is outstanding. The older
  /// request still finishes, but its result no longer reaches the cache
  /// once the entry has been invalidated.
  pub fn refetch(&self, key: QueryKey) -> SharedFetch {
    let mut in_flight = self.inner.in_flight.lock();
    if in_flight.remove(&key).is_some() {
      debug!(key = %key, "replacing outdated in-flight fetch");
    }
    self.start(&mut in_flight, key)
  }

  fn start(&self, in_flight: &mut HashMap<QueryKey, InFlight>, key: QueryKey) -> SharedFetch {
    let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
    debug!(key = %key, id, "starting fetch");
    let inner = Arc::clone(&self.inner);
    let task_key = key.clone();
    let handle = tokio::spawn(async move { inner.run_fetch(task_key, id).await });

    let shared = async move {
      match handle.await {
        Ok(result) => result,
        Err(e) => Err(ApiError::Aborted(e.to_string())),
      }
    }
    .boxed()
    .shared();

    in_flight.insert(
      key,
      InFlight {
        id,
        fetch: shared.clone(),
      },
    );
    shared
  }

  /// Return the cached value if it is fresh, otherwise fetch.
  pub async fn ensure(&self, key: QueryKey) -> Result<CachedValue, ApiError> {
    if let Some(entry) = self.inner.store.read(&key) {
      if entry.status == EntryStatus::Fresh {
        if let Some(value) = entry.value {
          return Ok(value);
        }
      }
    }
    self.fetch(key).await
  }

  /// Watch `key`. Starts a background fetch when there is nothing fresh to
  /// show. Dropping the returned handle stops the notifications.
  pub fn subscribe(&self, key: QueryKey, listener: Listener) -> Subscription {
    let subscription = self.inner.store.subscribe(key.clone(), listener);
    let needs_fetch = match self.inner.store.read(&key) {
      None => true,
      Some(entry) => matches!(entry.status, EntryStatus::Stale | EntryStatus::Error),
    };
    if needs_fetch {
      self.refresh([key]);
    }
    subscription
  }

  /// Mark matching entries stale and refetch the ones being watched,
  /// replacing any request that started before the invalidation.
  /// Returns how many refreshes were scheduled.
  pub fn invalidate(&self, pattern: &KeyPattern) -> usize {
    let keys = self.inner.store.invalidate(pattern);
    self.revalidate(keys)
  }

  /// Age out entries past the staleness window and refetch the watched
  /// ones. Meant to be called from a periodic tick.
  pub fn refresh_expired(&self) -> usize {
    let keys = self.inner.store.expire();
    self.refresh(keys)
  }

  /// Start background fetches for `keys` without waiting on them.
  pub fn refresh(&self, keys: impl IntoIterator<Item = QueryKey>) -> usize {
    let mut count = 0;
    for key in keys {
      // The fetch task is already running; the handle is not needed here
      let _ = self.fetch(key);
      count += 1;
    }
    if count > 0 {
      debug!(count, "scheduled background refresh");
    }
    count
  }

  /// Start new background fetches for `keys`, replacing outstanding ones.
  /// Used after an invalidation, when a running request may predate it.
  pub fn revalidate(&self, keys: impl IntoIterator<Item = QueryKey>) -> usize {
    let mut count = 0;
    for key in keys {
      let _ = self.refetch(key);
      count += 1;
    }
    if count > 0 {
      debug!(count, "scheduled revalidation");
    }
    count
  }

  #[cfg(test)]
  pub(crate) fn in_flight_count(&self) -> usize {
    self.inner.in_flight.lock().len()
  }
}

impl Inner {
  async fn run_fetch(&self, key: QueryKey, id: u64) -> Result<CachedValue, ApiError> {
    let generation = self.store.set_pending(&key);

    let mut attempt = 0;
    let result = loop {
      match load(self.api.as_ref(), &key).await {
        Ok(value) => break Ok(value),
        Err(e) if attempt < self.options.retry && e.is_retryable() => {
          attempt += 1;
          warn!(key = %key, attempt, error = %e, "query failed, retrying");
        }
        Err(e) => break Err(e),
      }
    };

    match &result {
      Ok(value) => info!(key = %key, items = item_count(value), "query succeeded"),
      Err(e) => warn!(key = %key, error = %e, "query failed"),
    }
    self.store.finish_fetch(&key, generation, &result);

    let mut in_flight = self.in_flight.lock();
    if in_flight.get(&key).is_some_and(|f| f.id == id) {
      in_flight.remove(&key);
    }
    result
  }
}

async fn load(api: &dyn TaskApi, key: &QueryKey) -> Result<CachedValue, ApiError> {
  match key {
    QueryKey::List { limit, skip } => api.list(*limit, *skip).await.map(CachedValue::Page),
    QueryKey::Owner { owner_id } => api.list_by_owner(*owner_id).await.map(CachedValue::Page),
    QueryKey::Detail { id } => api.get(*id).await.map(CachedValue::Task),
    QueryKey::Random => api.random().await.map(CachedValue::Task),
  }
}

fn item_count(value: &CachedValue) -> usize {
  match value {
    CachedValue::Page(page) => page.items.len(),
    CachedValue::Task(_) => 1,
  }
}


#[cfg(test)]
mod tests {
  use super::testing::{page, task, FakeApi};
  use super::*;
  use crate::cache::CacheEntry;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn setup(tasks: Vec<crate::tasks::Task>) -> (QueryClient, Arc<FakeApi>) {
    let api = Arc::new(FakeApi::with_tasks(tasks));
    let store = Arc::new(CacheStore::new());
    let client = QueryClient::new(store, api.clone(), QueryOptions::default());
    (client, api)
  }

  fn noop() -> Listener {
    Arc::new(|_: Option<&CacheEntry>| {})
  }

  fn tasks(n: u64) -> Vec<crate::tasks::Task> {
    (1..=n).map(|id| task(id, 1)).collect()
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_one_request() {
    let (client, api) = setup(tasks(25));
    let key = QueryKey::list(10, 0);

    let first = client.fetch(key.clone());
    let second = client.fetch(key.clone());
    let third = client.fetch(key.clone());
    let (a, b, c) = futures::join!(first, second, third);

    assert_eq!(api.calls(), 1);
    assert_eq!(a.unwrap(), b.clone().unwrap());
    assert_eq!(b.unwrap(), c.unwrap());
    assert_eq!(client.in_flight_count(), 0);
  }

  #[tokio::test]
  async fn test_subscribe_while_fetching_attaches_to_request() {
    let (client, api) = setup(tasks(5));
    let key = QueryKey::list(10, 0);

    let pending = client.fetch(key.clone());
    let _sub = client.subscribe(key.clone(), noop());
    let _other = client.subscribe(key.clone(), noop());
    pending.await.unwrap();

    assert_eq!(api.calls(), 1);
    let entry = client.store().read(&key).unwrap();
    assert_eq!(entry.status, EntryStatus::Fresh);
    assert_eq!(entry.subscriber_count, 2);
    assert!(entry.last_updated_at.is_some());
  }

  #[tokio::test]
  async fn test_separate_keys_fetch_separately() {
    let (client, api) = setup(tasks(25));
    let (a, b) = futures::join!(
      client.fetch(QueryKey::list(10, 0)),
      client.fetch(QueryKey::list(10, 10))
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(api.calls(), 2);
  }

  #[tokio::test]
  async fn test_fresh_entry_is_served_without_network() {
    let (client, api) = setup(tasks(3));
    let key = QueryKey::detail(2);
    client.fetch(key.clone()).await.unwrap();
    let value = client.ensure(key).await.unwrap();

    assert_eq!(value.as_task().map(|t| t.id), Some(2));
    assert_eq!(api.calls(), 1);
  }

  #[tokio::test]
  async fn test_subscribe_to_fresh_entry_does_not_fetch() {
    let (client, api) = setup(tasks(3));
    let key = QueryKey::list(10, 0);
    client.fetch(key.clone()).await.unwrap();
    let _sub = client.subscribe(key, noop());
    assert_eq!(api.calls(), 1);
    assert_eq!(client.in_flight_count(), 0);
  }

  #[tokio::test]
  async fn test_retryable_read_is_retried_once() {
    let (client, api) = setup(tasks(3));
    api.fail_next(ApiError::Network("reset".into()));

    let value = client.fetch(QueryKey::list(10, 0)).await.unwrap();
    assert_eq!(value.as_page().map(|p| p.items.len()), Some(3));
    assert_eq!(api.calls(), 2);
  }

  #[tokio::test]
  async fn test_second_failure_is_surfaced_and_stored() {
    let (client, api) = setup(tasks(3));
    let key = QueryKey::list(10, 0);
    client.fetch(key.clone()).await.unwrap();

    let outage = ApiError::Status {
      status: 503,
      message: "Service Unavailable".into(),
    };
    api.fail_next(outage.clone());
    api.fail_next(outage.clone());
    let err = client.fetch(key.clone()).await.unwrap_err();
    assert_eq!(err, outage);
    assert_eq!(api.calls(), 3);

    let entry = client.store().read(&key).unwrap();
    assert_eq!(entry.status, EntryStatus::Error);
    assert_eq!(entry.error, Some(outage));
    // Last good value survives the failure
    assert_eq!(entry.page().map(|p| p.items.len()), Some(3));
  }

  #[tokio::test]
  async fn test_client_errors_are_not_retried() {
    let (client, api) = setup(tasks(3));
    let err = client.fetch(QueryKey::detail(42)).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(api.calls(), 1);
  }

  #[tokio::test]
  async fn test_invalidate_refetches_watched_keys() {
    let (client, api) = setup(tasks(3));
    let watched = QueryKey::list(10, 0);
    let unwatched = QueryKey::detail(1);

    let _sub = client.subscribe(watched.clone(), noop());
    client.fetch(watched.clone()).await.unwrap();
    client.fetch(unwatched.clone()).await.unwrap();
    assert_eq!(api.calls(), 2);

    assert_eq!(client.invalidate(&KeyPattern::All), 1);
    // Stale value is still readable while the refresh runs
    assert!(client.store().read(&watched).unwrap().value.is_some());
    client.fetch(watched.clone()).await.unwrap();

    assert_eq!(api.calls(), 3);
    assert_eq!(
      client.store().read(&watched).unwrap().status,
      EntryStatus::Fresh
    );
    assert_eq!(
      client.store().read(&unwatched).unwrap().status,
      EntryStatus::Stale
    );
  }

  #[tokio::test]
  async fn test_invalidate_during_fetch_starts_new_request() {
    let (client, api) = setup(tasks(3));
    let key = QueryKey::list(10, 0);
    let _sub = client.subscribe(key.clone(), noop());
    let first = client.fetch(key.clone());
    while client.store().read(&key).is_none() {
      tokio::task::yield_now().await;
    }

    assert_eq!(client.invalidate(&KeyPattern::Lists), 1);
    let second = client.fetch(key.clone());
    let (a, b) = futures::join!(first, second);
    assert!(a.is_ok() && b.is_ok());

    assert_eq!(api.calls(), 2);
    assert_eq!(client.in_flight_count(), 0);
    assert_eq!(
      client.store().read(&key).unwrap().status,
      EntryStatus::Fresh
    );
  }

  #[tokio::test]
  async fn test_refresh_joins_running_fetch() {
    let api = Arc::new(FakeApi::with_tasks(tasks(3)));
    let store = Arc::new(CacheStore::new().with_stale_time(chrono::Duration::zero()));
    let client = QueryClient::new(store, api.clone(), QueryOptions::default());
    let key = QueryKey::list(10, 0);

    let pending = client.fetch(key.clone());
    client.refresh([key.clone()]);
    pending.await.unwrap();
    assert_eq!(api.calls(), 1);
  }

  #[tokio::test]
  async fn test_elapsed_staleness_triggers_refresh() {
    let api = Arc::new(FakeApi::with_tasks(tasks(3)));
    let store = Arc::new(CacheStore::new().with_stale_time(chrono::Duration::zero()));
    let client = QueryClient::new(store, api.clone(), QueryOptions::default());
    let key = QueryKey::list(10, 0);

    let _sub = client.subscribe(key.clone(), noop());
    client.fetch(key.clone()).await.unwrap();
    assert_eq!(client.refresh_expired(), 1);
    client.fetch(key).await.unwrap();
    assert_eq!(api.calls(), 2);
  }

  #[tokio::test]
  async fn test_listener_sees_pending_then_fresh() {
    let (client, _api) = setup(tasks(3));
    let key = QueryKey::Owner { owner_id: 1 };
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    let _sub = client.subscribe(
      key.clone(),
      Arc::new(move |entry: Option<&CacheEntry>| {
        if let Some(entry) = entry {
          sink.lock().push(entry.status);
        }
      }),
    );
    client.fetch(key).await.unwrap();

    assert_eq!(
      *statuses.lock(),
      vec![EntryStatus::Pending, EntryStatus::Fresh]
    );
  }

  #[tokio::test]
  async fn test_abandoned_fetch_still_lands_in_cache() {
    let (client, _api) = setup(tasks(3));
    let key = QueryKey::list(10, 0);
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();

    let sub = client.subscribe(
      key.clone(),
      Arc::new(move |_: Option<&CacheEntry>| {
        counter.fetch_add(1, Ordering::SeqCst);
      }),
    );
    drop(sub);

    // Join the orphaned request to wait for it
    client.fetch(key.clone()).await.unwrap();
    let entry = client.store().read(&key).unwrap();
    assert_eq!(entry.status, EntryStatus::Fresh);
    assert_eq!(entry.subscriber_count, 0);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_page_boundaries_come_from_service() {
    let (client, _api) = setup(tasks(25));
    let value = client.fetch(QueryKey::list(10, 20)).await.unwrap();
    assert_eq!(value.as_page(), Some(&page(10, 20, 25, &[21, 22, 23, 24, 25])));
  }
}
