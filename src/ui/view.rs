use crate::mutation::MutationKind;
use crate::tasks::{ApiError, Task};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
}

/// Trait for view behavior
///
/// Views handle their own input modes (forms, etc.) and return actions for
/// the App to execute: App → View → Components.
///
/// Views read their data from the cache at render time. A subscription held
/// by the view keeps its entry alive and wakes the event loop on change.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Owner this view is scoped to, for the header
  fn owner(&self) -> Option<u64> {
    None
  }

  /// True while a form or other text input owns the keyboard
  fn captures_input(&self) -> bool {
    false
  }

  /// A mutation issued anywhere in the app finished
  fn on_mutation(
    &mut self,
    _kind: MutationKind,
    _target: Option<u64>,
    _result: &Result<Task, ApiError>,
  ) {
  }

  /// Get keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
