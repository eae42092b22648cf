use crate::app::Services;
use crate::cache::{CacheEntry, EntryStatus, QueryKey, Subscription};
use crate::mutation::{Mutation, MutationKind};
use crate::pagination::{next_page_size, prev_page_size, Pager};
use crate::tasks::{ApiError, Task, TaskListPage, TaskPatch};
use crate::ui::components::{FormEvent, KeyResult, TaskForm};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{owner_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::TaskDetailView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::collections::HashSet;

/// Which list the view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSource {
  /// Paged list of every task
  All(Pager),
  /// Every task of one owner, unpaged
  Owner(u64),
}

impl ListSource {
  fn key(&self) -> QueryKey {
    match self {
      Self::All(pager) => pager.key(),
      Self::Owner(owner_id) => QueryKey::Owner {
        owner_id: *owner_id,
      },
    }
  }
}

/// View for a list of tasks with completion toggling, deletion and an
/// add form
pub struct TaskListView {
  services: Services,
  source: ListSource,
  default_owner: u64,
  subscription: Subscription,
  list_state: ListState,
  form: Option<TaskForm>,
  /// Tasks with a toggle or delete in flight
  pending: HashSet<u64>,
  creating: bool,
}

impl TaskListView {
  pub fn new(services: Services, source: ListSource, default_owner: u64) -> Self {
    let subscription = services.watch(source.key());
    Self {
      services,
      source,
      default_owner,
      subscription,
      list_state: ListState::default(),
      form: None,
      pending: HashSet::new(),
      creating: false,
    }
  }

  pub fn all(services: Services, page_size: u64, default_owner: u64) -> Self {
    Self::new(services, ListSource::All(Pager::new(page_size)), default_owner)
  }

  pub fn owner(services: Services, owner_id: u64) -> Self {
    Self::new(services, ListSource::Owner(owner_id), owner_id)
  }

  fn entry(&self) -> Option<CacheEntry> {
    self.services.read(self.subscription.key())
  }

  fn page(&self) -> Option<TaskListPage> {
    self.entry().and_then(|e| e.page().cloned())
  }

  fn selected_task(&self) -> Option<Task> {
    let idx = self.list_state.selected()?;
    self.page().and_then(|p| p.items.get(idx).cloned())
  }

  /// Point the subscription at the current window
  fn resubscribe(&mut self) {
    let key = self.source.key();
    if &key != self.subscription.key() {
      self.subscription = self.services.watch(key);
      self.list_state.select(Some(0));
    }
  }

  fn change_page(&mut self, forward: bool) {
    let total = self.page().map(|p| p.total).unwrap_or(0);
    if let ListSource::All(pager) = &mut self.source {
      let moved = if forward {
        pager.next(total)
      } else {
        pager.prev()
      };
      if moved {
        self.resubscribe();
      }
    }
  }

  fn change_page_size(&mut self, larger: bool) {
    if let ListSource::All(pager) = &mut self.source {
      let size = if larger {
        next_page_size(pager.limit())
      } else {
        prev_page_size(pager.limit())
      };
      pager.set_limit(size);
      self.resubscribe();
    }
  }

  fn toggle_selected(&mut self) {
    let Some(task) = self.selected_task() else {
      return;
    };
    // One write per task at a time
    if !self.pending.insert(task.id) {
      return;
    }
    self.services.mutate(Mutation::Update {
      id: task.id,
      patch: TaskPatch::completed(!task.completed),
    });
  }

  fn delete_selected(&mut self) {
    let Some(task) = self.selected_task() else {
      return;
    };
    if !self.pending.insert(task.id) {
      return;
    }
    self.services.mutate(Mutation::Delete { id: task.id });
  }

  fn handle_form_key(&mut self, key: KeyEvent) -> ViewAction {
    let Some(form) = self.form.as_mut() else {
      return ViewAction::None;
    };
    match form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted(draft)) => {
        self.form = None;
        self.creating = true;
        self.services.mutate(Mutation::Create(draft));
      }
      KeyResult::Event(FormEvent::Cancelled) => self.form = None,
      KeyResult::Handled | KeyResult::NotHandled => {}
    }
    ViewAction::None
  }

  fn title(&self, entry: Option<&CacheEntry>) -> String {
    let name = match self.source {
      ListSource::All(_) => "Tasks".to_string(),
      ListSource::Owner(owner_id) => format!("Tasks [owner {}]", owner_id),
    };
    let total = entry
      .and_then(|e| e.page())
      .map(|p| format!(" ({} total)", p.total))
      .unwrap_or_default();
    let state = match entry {
      None => " (loading...)".to_string(),
      Some(e) if e.is_loading() => " (loading...)".to_string(),
      Some(e) if e.is_refreshing() => " (refreshing...)".to_string(),
      Some(e) if e.status == EntryStatus::Error => match &e.error {
        Some(err) => format!(" (error: {})", truncate(&err.to_string(), 40)),
        None => " (error)".to_string(),
      },
      Some(_) if self.creating => " (adding...)".to_string(),
      Some(_) => String::new(),
    };
    format!(" {}{}{} ", name, total, state)
  }

  fn task_item(&self, task: &Task) -> ListItem<'static> {
    let pending = self.pending.contains(&task.id);
    let check = if task.completed { "[x]" } else { "[ ]" };
    let text_style = if task.completed {
      Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::CROSSED_OUT)
    } else {
      Style::default()
    };

    let mut spans = vec![
      Span::styled(
        format!("{:>5} ", task.id),
        Style::default().fg(Color::DarkGray),
      ),
      Span::styled(format!("{} ", check), Style::default().fg(Color::Green)),
      Span::styled(truncate(&task.text, 60), text_style),
      Span::raw(" "),
      Span::styled(
        format!("@{}", task.owner_id),
        Style::default().fg(owner_color(task.owner_id)),
      ),
    ];
    if pending {
      spans.push(Span::styled(" ...", Style::default().fg(Color::Yellow)));
    }
    ListItem::new(Line::from(spans))
  }

  fn pager_line(&self, page: &TaskListPage) -> Option<Line<'static>> {
    let ListSource::All(pager) = self.source else {
      return None;
    };
    if page.total <= pager.limit() {
      return None;
    }
    let (from, to) = pager.showing(page.total)?;
    Some(Line::from(vec![
      Span::styled(
        format!(" Showing {} to {} of {} results", from, to, page.total),
        Style::default().fg(Color::DarkGray),
      ),
      Span::raw("   "),
      Span::styled(
        format!(
          "Page {} of {}",
          pager.current_page(),
          pager.page_count(page.total)
        ),
        Style::default().fg(Color::Cyan),
      ),
    ]))
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let entry = self.entry();
    let page = entry.as_ref().and_then(|e| e.page().cloned());
    let len = page.as_ref().map(|p| p.items.len()).unwrap_or(0);
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(self.title(entry.as_ref()))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let page = match page {
      Some(page) if !page.items.is_empty() => page,
      _ => {
        let content = match &entry {
          None => "Loading tasks...".to_string(),
          Some(e) if e.is_loading() => "Loading tasks...".to_string(),
          Some(e) if e.status == EntryStatus::Error && e.value.is_none() => {
            let err = e.error.as_ref().map(|err| err.to_string()).unwrap_or_default();
            format!("Failed to load tasks: {}\n\nPress 'r' to retry.", err)
          }
          Some(_) => "No tasks yet. Press 'a' to add one.".to_string(),
        };
        let paragraph = Paragraph::new(content)
          .block(block)
          .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, area);
        return;
      }
    };

    let pager_line = self.pager_line(&page);
    let [list_area, pager_area] = Layout::vertical([
      Constraint::Min(1),
      Constraint::Length(u16::from(pager_line.is_some())),
    ])
    .areas(area);

    let items: Vec<ListItem> = page.items.iter().map(|t| self.task_item(t)).collect();
    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut self.list_state);

    if let Some(line) = pager_line {
      frame.render_widget(Paragraph::new(line), pager_area);
    }
  }
}

impl View for TaskListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.form.is_some() {
      return self.handle_form_key(key);
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.list_state.select_previous();
      }
      KeyCode::Char(' ') | KeyCode::Char('x') => self.toggle_selected(),
      KeyCode::Char('d') => self.delete_selected(),
      KeyCode::Char('a') => self.form = Some(TaskForm::new(self.default_owner)),
      KeyCode::Char('n') | KeyCode::Right => self.change_page(true),
      KeyCode::Char('p') | KeyCode::Left => self.change_page(false),
      KeyCode::Char('+') | KeyCode::Char('=') => self.change_page_size(true),
      KeyCode::Char('-') => self.change_page_size(false),
      KeyCode::Char('r') => self.services.refresh(self.subscription.key()),
      KeyCode::Enter => {
        if let Some(task) = self.selected_task() {
          return ViewAction::Push(Box::new(TaskDetailView::task(
            self.services.clone(),
            task.id,
          )));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    if let Some(form) = &self.form {
      form.render_overlay(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    match self.source {
      ListSource::All(pager) => format!("Tasks [page {}]", pager.current_page()),
      ListSource::Owner(owner_id) => format!("Owner {}", owner_id),
    }
  }

  fn owner(&self) -> Option<u64> {
    match self.source {
      ListSource::All(_) => None,
      ListSource::Owner(owner_id) => Some(owner_id),
    }
  }

  fn captures_input(&self) -> bool {
    self.form.is_some()
  }

  fn on_mutation(
    &mut self,
    kind: MutationKind,
    target: Option<u64>,
    result: &Result<Task, ApiError>,
  ) {
    if let Some(id) = target {
      self.pending.remove(&id);
    }
    match (kind, result) {
      (MutationKind::Create, _) => self.creating = false,
      (MutationKind::Delete, Ok(_)) => {
        let Some(page) = self.page() else {
          return;
        };
        if let ListSource::All(pager) = &mut self.source {
          if page.items.is_empty() && (pager.clamp_to(page.total) || pager.prev()) {
            self.resubscribe();
          }
        }
      }
      _ => {}
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.form.is_some() {
      return vec![
        ShortcutInfo::new("tab", "switch").with_priority(10),
        ShortcutInfo::new("enter", "add").with_priority(20),
        ShortcutInfo::new("esc", "cancel").with_priority(30),
      ];
    }
    let mut shortcuts = vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("a", "add").with_priority(20),
      ShortcutInfo::new("x", "toggle").with_priority(30),
      ShortcutInfo::new("d", "delete").with_priority(40),
      ShortcutInfo::new("r", "refresh").with_priority(60),
      ShortcutInfo::new("q", "back").with_priority(90),
    ];
    if matches!(self.source, ListSource::All(_)) {
      shortcuts.push(ShortcutInfo::new("n/p", "page").with_priority(50));
      shortcuts.push(ShortcutInfo::new("+/-", "size").with_priority(55));
    }
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app::testing::services;
  use crate::cache::CachedValue;
  use crate::event::Event;
  use crate::query::testing::{page, task};
  use crossterm::event::KeyModifiers;
  use std::time::Duration;
  use tokio::time::timeout;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn seed(view: &TaskListView, value: TaskListPage) {
    view.services.queries.store().write(
      view.subscription.key().clone(),
      CachedValue::Page(value),
      EntryStatus::Fresh,
    );
  }

  #[tokio::test]
  async fn test_paging_moves_subscription() {
    let (services, _api, _rx) = services(&[]);
    let mut view = TaskListView::all(services, 10, 1);
    seed(&view, page(10, 0, 25, &[1, 2, 3]));

    view.handle_key(key(KeyCode::Char('n')));
    assert_eq!(view.subscription.key(), &QueryKey::list(10, 10));

    view.handle_key(key(KeyCode::Char('p')));
    assert_eq!(view.subscription.key(), &QueryKey::list(10, 0));

    // Already on the first page
    view.handle_key(key(KeyCode::Left));
    assert_eq!(view.subscription.key(), &QueryKey::list(10, 0));
  }

  #[tokio::test]
  async fn test_page_size_resets_to_first_page() {
    let (services, _api, _rx) = services(&[]);
    let mut view = TaskListView::all(services, 10, 1);
    seed(&view, page(10, 0, 25, &[1]));
    view.handle_key(key(KeyCode::Char('n')));

    view.handle_key(key(KeyCode::Char('+')));
    assert_eq!(view.subscription.key(), &QueryKey::list(20, 0));
  }

  #[tokio::test]
  async fn test_toggle_waits_for_pending_write() {
    let (services, _api, mut rx) = services(&[1]);
    let mut view = TaskListView::all(services, 10, 1);
    seed(&view, page(10, 0, 1, &[1]));
    view.list_state.select(Some(0));

    view.handle_key(key(KeyCode::Char('x')));
    view.handle_key(key(KeyCode::Char('x')));
    assert!(view.pending.contains(&1));

    let mut mutated = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_millis(100), rx.recv()).await {
      if let Event::Mutated { kind, target, result } = event {
        mutated.push((kind, target, result));
      }
    }
    // The second press was ignored while the first was in flight
    assert_eq!(mutated.len(), 1);

    let (kind, target, result) = &mutated[0];
    assert!(result.as_ref().unwrap().completed);
    view.on_mutation(*kind, *target, result);
    assert!(view.pending.is_empty());
  }

  #[tokio::test]
  async fn test_delete_emptying_page_steps_back() {
    let (services, _api, _rx) = services(&[]);
    let mut view = TaskListView::all(services, 10, 1);
    seed(&view, page(10, 0, 21, &[1]));
    view.handle_key(key(KeyCode::Char('n')));
    seed(&view, page(10, 10, 21, &[11]));
    view.handle_key(key(KeyCode::Char('n')));
    assert_eq!(view.subscription.key(), &QueryKey::list(10, 20));

    // The committed delete left this window empty
    seed(&view, page(10, 20, 20, &[]));
    view.on_mutation(MutationKind::Delete, Some(21), &Ok(task(21, 1)));
    assert_eq!(view.subscription.key(), &QueryKey::list(10, 10));
  }

  #[tokio::test]
  async fn test_form_captures_keys() {
    let (services, _api, _rx) = services(&[]);
    let mut view = TaskListView::all(services, 10, 1);
    view.handle_key(key(KeyCode::Char('a')));
    assert!(view.captures_input());

    // 'q' types into the form instead of leaving the view
    assert!(matches!(
      view.handle_key(key(KeyCode::Char('q'))),
      ViewAction::None
    ));
    view.handle_key(key(KeyCode::Esc));
    assert!(!view.captures_input());
  }

  #[tokio::test]
  async fn test_pager_line_only_when_more_than_one_page() {
    let (services, _api, _rx) = services(&[]);
    let view = TaskListView::all(services, 10, 1);
    assert!(view.pager_line(&page(10, 0, 10, &[1])).is_none());

    let line = view.pager_line(&page(10, 0, 25, &[1])).unwrap();
    let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
    assert!(text.contains("Showing 1 to 10 of 25 results"));
    assert!(text.contains("Page 1 of 3"));
  }
}
