/// A to-do record as served by the task service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
  pub id: u64,
  pub text: String,
  pub completed: bool,
  pub owner_id: u64,
}

/// One page of the task list, keyed by `(limit, skip)`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskListPage {
  pub items: Vec<Task>,
  /// Size of the whole collection at query time, not just this page
  pub total: u64,
  pub skip: u64,
  pub limit: u64,
}

impl TaskListPage {
  pub fn contains(&self, id: u64) -> bool {
    self.items.iter().any(|t| t.id == id)
  }

  pub fn position(&self, id: u64) -> Option<usize> {
    self.items.iter().position(|t| t.id == id)
  }
}

/// Fields for a task that does not exist yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
  text: String,
  pub completed: bool,
  pub owner_id: u64,
}

impl TaskDraft {
  /// Build a draft from user input. Returns `None` when the text is blank.
  pub fn new(text: &str, owner_id: u64) -> Option<Self> {
    let text = text.trim();
    if text.is_empty() {
      return None;
    }
    Some(Self {
      text: text.to_string(),
      completed: false,
      owner_id,
    })
  }

  pub fn text(&self) -> &str {
    &self.text
  }
}

/// Partial update for an existing task
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskPatch {
  pub text: Option<String>,
  pub completed: Option<bool>,
}

impl TaskPatch {
  pub fn completed(completed: bool) -> Self {
    Self {
      completed: Some(completed),
      ..Self::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_draft_trims_text() {
    let draft = TaskDraft::new("  buy milk ", 3).unwrap();
    assert_eq!(draft.text(), "buy milk");
    assert_eq!(draft.owner_id, 3);
    assert!(!draft.completed);
  }

  #[test]
  fn test_blank_draft_is_rejected() {
    assert!(TaskDraft::new("   ", 1).is_none());
    assert!(TaskDraft::new("", 1).is_none());
  }

  #[test]
  fn test_page_lookup() {
    let page = TaskListPage {
      items: vec![
        Task {
          id: 4,
          text: "a".into(),
          completed: false,
          owner_id: 1,
        },
        Task {
          id: 9,
          text: "b".into(),
          completed: true,
          owner_id: 2,
        },
      ],
      total: 2,
      skip: 0,
      limit: 10,
    };
    assert!(page.contains(9));
    assert_eq!(page.position(9), Some(1));
    assert!(!page.contains(5));
  }
}
