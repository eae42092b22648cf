use crate::app::Services;
use crate::cache::{CacheEntry, EntryStatus, KeyPattern, QueryKey, Subscription};
use crate::mutation::{Mutation, MutationKind};
use crate::tasks::{ApiError, Task, TaskPatch};
use crate::ui::renderfns::owner_color;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// View for one task, by id or picked at random
pub struct TaskDetailView {
  services: Services,
  subscription: Subscription,
  /// A toggle for this task is in flight
  pending: bool,
}

impl TaskDetailView {
  pub fn task(services: Services, id: u64) -> Self {
    let subscription = services.watch(QueryKey::detail(id));
    Self {
      services,
      subscription,
      pending: false,
    }
  }

  /// Each random view asks the service for a new pick
  pub fn random(services: Services) -> Self {
    let subscription = services.watch(QueryKey::Random);
    services
      .queries
      .invalidate(&KeyPattern::Exact(QueryKey::Random));
    Self {
      services,
      subscription,
      pending: false,
    }
  }

  fn is_random(&self) -> bool {
    *self.subscription.key() == QueryKey::Random
  }

  fn entry(&self) -> Option<CacheEntry> {
    self.services.read(self.subscription.key())
  }

  fn toggle(&mut self) {
    if self.pending || self.is_random() {
      return;
    }
    let Some(task) = self.entry().and_then(|e| e.task().cloned()) else {
      return;
    };
    self.pending = true;
    self.services.mutate(Mutation::Update {
      id: task.id,
      patch: TaskPatch::completed(!task.completed),
    });
  }

  fn label(&self) -> String {
    match self.subscription.key() {
      QueryKey::Detail { id } => format!("Task {}", id),
      _ => "Random task".to_string(),
    }
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let entry = self.entry();
    let state = match &entry {
      None => " (loading...)".to_string(),
      Some(e) if e.is_loading() => " (loading...)".to_string(),
      Some(e) if e.is_refreshing() => " (refreshing...)".to_string(),
      Some(e) if e.status == EntryStatus::Error => " (error)".to_string(),
      Some(_) if self.pending => " (saving...)".to_string(),
      Some(_) => String::new(),
    };

    let block = Block::default()
      .title(format!(" {}{} ", self.label(), state))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let task = match entry.as_ref().and_then(|e| e.task()) {
      Some(task) => task,
      None => {
        let (content, color) = match entry.as_ref().and_then(|e| e.error.as_ref()) {
          Some(error) => (
            format!("Error: {}\n\nPress 'r' to retry.", error),
            Color::Red,
          ),
          None => ("Loading task...".to_string(), Color::DarkGray),
        };
        let paragraph = Paragraph::new(content).style(Style::default().fg(color));
        frame.render_widget(paragraph, inner);
        return;
      }
    };

    let (status, status_color) = if task.completed {
      ("Completed", Color::Green)
    } else {
      ("Open", Color::Yellow)
    };

    let lines = vec![
      Line::from(vec![
        Span::styled("Id:     ", Style::default().fg(Color::DarkGray)),
        Span::raw(task.id.to_string()),
      ]),
      Line::from(vec![
        Span::styled("Status: ", Style::default().fg(Color::DarkGray)),
        Span::styled(status, Style::default().fg(status_color)),
      ]),
      Line::from(vec![
        Span::styled("Owner:  ", Style::default().fg(Color::DarkGray)),
        Span::styled(
          task.owner_id.to_string(),
          Style::default().fg(owner_color(task.owner_id)),
        ),
      ]),
      Line::default(),
      Line::from(task.text.clone()),
    ];

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, inner);
  }
}

impl View for TaskDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      // For the random view this asks for another pick
      KeyCode::Char('r') => self.services.refresh(self.subscription.key()),
      KeyCode::Char(' ') | KeyCode::Char('x') => self.toggle(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.label()
  }

  fn owner(&self) -> Option<u64> {
    self.entry().and_then(|e| e.task().map(|t| t.owner_id))
  }

  fn on_mutation(
    &mut self,
    kind: MutationKind,
    target: Option<u64>,
    _result: &Result<Task, ApiError>,
  ) {
    if kind == MutationKind::Update && target == self.subscription.key().detail_id() {
      self.pending = false;
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let refresh = if self.is_random() {
      ShortcutInfo::new("r", "another")
    } else {
      ShortcutInfo::new("r", "refresh")
    };
    let mut shortcuts = vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      refresh.with_priority(20),
      ShortcutInfo::new("q", "back").with_priority(90),
    ];
    if !self.is_random() {
      shortcuts.push(ShortcutInfo::new("x", "toggle").with_priority(30));
    }
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app::testing::services;
  use crate::cache::CachedValue;
  use crate::query::testing::task;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[tokio::test]
  async fn test_detail_loads_record() {
    let (services, _api, _rx) = services(&[4]);
    let view = TaskDetailView::task(services.clone(), 4);
    services.queries.fetch(QueryKey::detail(4)).await.unwrap();

    let entry = view.entry().unwrap();
    assert_eq!(entry.task().map(|t| t.id), Some(4));
    assert_eq!(entry.subscriber_count, 1);
    assert_eq!(view.breadcrumb_label(), "Task 4");
    assert_eq!(view.owner(), Some(1));
  }

  #[tokio::test]
  async fn test_random_view_cannot_toggle() {
    let (services, _api, _rx) = services(&[1]);
    services.queries.store().write(
      QueryKey::Random,
      CachedValue::Task(task(1, 1)),
      EntryStatus::Fresh,
    );
    let mut view = TaskDetailView::random(services);
    view.handle_key(key(KeyCode::Char('x')));
    assert!(!view.pending);
  }

  #[tokio::test]
  async fn test_toggle_pending_until_update_lands() {
    let (services, _api, _rx) = services(&[2]);
    services.queries.store().write(
      QueryKey::detail(2),
      CachedValue::Task(task(2, 1)),
      EntryStatus::Fresh,
    );
    let mut view = TaskDetailView::task(services, 2);
    view.handle_key(key(KeyCode::Char('x')));
    assert!(view.pending);

    view.on_mutation(MutationKind::Update, Some(3), &Ok(task(3, 1)));
    assert!(view.pending);
    view.on_mutation(MutationKind::Update, Some(2), &Ok(task(2, 1)));
    assert!(!view.pending);
  }

  #[tokio::test]
  async fn test_leaving_view_drops_subscription() {
    let (services, _api, _rx) = services(&[5]);
    let view = TaskDetailView::task(services.clone(), 5);
    services.queries.fetch(QueryKey::detail(5)).await.unwrap();
    drop(view);

    let entry = services.read(&QueryKey::detail(5)).unwrap();
    assert_eq!(entry.subscriber_count, 0);
  }
}
