//! Mutation coordinator: writes that patch the cache once confirmed.
//!
//! Commit protocol for every mutation:
//! 1. issue the transport call (never retried)
//! 2. on success, patch the affected cache entries in one transaction
//! 3. invalidate every list entry so watched pages refetch in the background.
//!    A list request already running predates the write and is replaced.
//!
//! On failure nothing in the cache changes.

use std::fmt;
use tracing::{info, warn};

use crate::cache::{CacheTxn, CachedValue, EntryStatus, KeyPattern, ListPatch, QueryKey};
use crate::query::QueryClient;
use crate::tasks::{ApiError, Task, TaskDraft, TaskPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  Create,
  Update,
  Delete,
}

impl fmt::Display for MutationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Create => "create",
      Self::Update => "update",
      Self::Delete => "delete",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
  Create(TaskDraft),
  Update { id: u64, patch: TaskPatch },
  Delete { id: u64 },
}

impl Mutation {
  pub fn kind(&self) -> MutationKind {
    match self {
      Self::Create(_) => MutationKind::Create,
      Self::Update { .. } => MutationKind::Update,
      Self::Delete { .. } => MutationKind::Delete,
    }
  }

  /// The existing task this mutation acts on
  pub fn target_id(&self) -> Option<u64> {
    match self {
      Self::Create(_) => None,
      Self::Update { id, .. } | Self::Delete { id } => Some(*id),
    }
  }
}

/// Issues writes and keeps the cache consistent with them.
#[derive(Clone)]
pub struct MutationClient {
  queries: QueryClient,
}

impl MutationClient {
  pub fn new(queries: QueryClient) -> Self {
    Self { queries }
  }

  pub async fn mutate(&self, mutation: Mutation) -> Result<Task, ApiError> {
    let kind = mutation.kind();
    let api = self.queries.api();
    let result = match &mutation {
      Mutation::Create(draft) => api.create(draft).await,
      Mutation::Update { id, patch } => api.update(*id, patch).await,
      Mutation::Delete { id } => api.delete(*id).await,
    };

    let task = match result {
      Ok(task) => task,
      Err(e) => {
        warn!(%kind, target = ?mutation.target_id(), error = %e, "mutation failed");
        return Err(e);
      }
    };

    let refresh = self.queries.store().transaction(|txn| {
      let patched = apply(txn, kind, &task);
      info!(%kind, id = task.id, patched, "mutation committed");
      txn.invalidate(&KeyPattern::Lists)
    });
    self.queries.revalidate(refresh);

    Ok(task)
  }
}

/// Whether a list entry can hold `task`: every full-list page, and the
/// owner list of the task's owner.
fn holds(key: &QueryKey, task: &Task) -> bool {
  match key {
    QueryKey::List { .. } => true,
    QueryKey::Owner { owner_id } => *owner_id == task.owner_id,
    QueryKey::Detail { .. } | QueryKey::Random => false,
  }
}

fn apply(txn: &mut CacheTxn<'_>, kind: MutationKind, task: &Task) -> usize {
  match kind {
    MutationKind::Create => {
      txn.patch_list_entries(|key, _| holds(key, task), &ListPatch::Prepend(task.clone()))
    }
    MutationKind::Update => {
      txn.write(
        QueryKey::detail(task.id),
        CachedValue::Task(task.clone()),
        EntryStatus::Fresh,
      );
      txn.patch_list_entries(|_, _| true, &ListPatch::Replace(task.clone()))
    }
    MutationKind::Delete => {
      txn.evict(&QueryKey::detail(task.id));
      txn.patch_list_entries(|key, _| holds(key, task), &ListPatch::Remove(task.id))
    }
  }
}
