//! Cache entry types.

use chrono::{DateTime, Utc};

use super::key::QueryKey;
use crate::tasks::{ApiError, Task, TaskListPage};

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// A fetch is in flight. Any previous value is still served.
  Pending,
  Fresh,
  /// Servable but due for a background refresh
  Stale,
  /// The last fetch failed. The last good value, if any, is kept.
  Error,
}

/// Payload of a cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
  Page(TaskListPage),
  Task(Task),
}

impl CachedValue {
  pub fn as_page(&self) -> Option<&TaskListPage> {
    match self {
      Self::Page(page) => Some(page),
      Self::Task(_) => None,
    }
  }

  pub fn as_task(&self) -> Option<&Task> {
    match self {
      Self::Task(task) => Some(task),
      Self::Page(_) => None,
    }
  }
}

/// Snapshot of one cache slot as seen by readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub key: QueryKey,
  pub value: Option<CachedValue>,
  pub status: EntryStatus,
  /// When `value` was last written from a successful fetch or patch
  pub last_updated_at: Option<DateTime<Utc>>,
  pub subscriber_count: usize,
  /// Failure of the most recent fetch, cleared on success
  pub error: Option<ApiError>,
}

impl CacheEntry {
  pub fn page(&self) -> Option<&TaskListPage> {
    self.value.as_ref().and_then(CachedValue::as_page)
  }

  pub fn task(&self) -> Option<&Task> {
    self.value.as_ref().and_then(CachedValue::as_task)
  }

  /// Pending with nothing to show yet
  pub fn is_loading(&self) -> bool {
    self.status == EntryStatus::Pending && self.value.is_none()
  }

  /// Pending while an older value is on screen
  pub fn is_refreshing(&self) -> bool {
    self.status == EntryStatus::Pending && self.value.is_some()
  }
}
