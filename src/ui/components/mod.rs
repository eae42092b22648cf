mod command_bar;
mod input;
mod task_form;

pub use command_bar::{CommandBar, CommandEvent};
pub use task_form::{FormEvent, TaskForm};

/// Result of a component handling a key, for its parent view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Key was consumed, no event for parent to handle
  Handled,
  /// Key was consumed, here's an event for parent to process
  Event(T),
  /// Key was not consumed, parent should try next handler
  NotHandled,
}
