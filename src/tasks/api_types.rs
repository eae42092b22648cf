//! Serde types matching the task service's JSON bodies.
//!
//! Kept apart from the domain types so the wire field names (and the
//! aliases older deployments use) never leak into the rest of the app.

use serde::{Deserialize, Serialize};

use super::types::{Task, TaskDraft, TaskListPage, TaskPatch};

#[derive(Debug, Deserialize)]
pub struct ApiTask {
  pub id: u64,
  #[serde(alias = "todo")]
  pub text: String,
  #[serde(default)]
  pub completed: bool,
  #[serde(rename = "ownerId", alias = "userId")]
  pub owner_id: u64,
}

impl From<ApiTask> for Task {
  fn from(api: ApiTask) -> Self {
    Task {
      id: api.id,
      text: api.text,
      completed: api.completed,
      owner_id: api.owner_id,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiTaskListPage {
  #[serde(alias = "todos", alias = "items")]
  pub tasks: Vec<ApiTask>,
  pub total: u64,
  #[serde(default)]
  pub skip: u64,
  #[serde(default)]
  pub limit: u64,
}

impl From<ApiTaskListPage> for TaskListPage {
  fn from(api: ApiTaskListPage) -> Self {
    let items: Vec<Task> = api.tasks.into_iter().map(Task::from).collect();
    // Owner lists come back without a usable limit
    let limit = api.limit.max(items.len() as u64);
    TaskListPage {
      items,
      total: api.total,
      skip: api.skip,
      limit,
    }
  }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiCreateTask<'a> {
  pub text: &'a str,
  pub completed: bool,
  #[serde(rename = "ownerId")]
  pub owner_id: u64,
}

impl<'a> From<&'a TaskDraft> for ApiCreateTask<'a> {
  fn from(draft: &'a TaskDraft) -> Self {
    Self {
      text: draft.text(),
      completed: draft.completed,
      owner_id: draft.owner_id,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ApiUpdateTask<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub completed: Option<bool>,
}

impl<'a> From<&'a TaskPatch> for ApiUpdateTask<'a> {
  fn from(patch: &'a TaskPatch) -> Self {
    Self {
      text: patch.text.as_deref(),
      completed: patch.completed,
    }
  }
}
