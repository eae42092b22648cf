use crate::cache::{CacheEntry, KeyPattern, Listener, QueryKey, Subscription};
use crate::commands::{self, AppCommand};
use crate::config::Config;
use crate::event::{Event, EventHandler, EventSender};
use crate::mutation::{Mutation, MutationClient, MutationKind};
use crate::query::QueryClient;
use crate::tasks::{ApiError, Task};
use crate::ui;
use crate::ui::components::{CommandBar, CommandEvent, KeyResult};
use crate::ui::renderfns::StatusMessage;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{TaskDetailView, TaskListView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Handles shared by every view: cache reads, queries, mutations, and the
/// event channel that wakes the UI.
#[derive(Clone)]
pub struct Services {
  pub queries: QueryClient,
  pub mutations: MutationClient,
  events: EventSender,
}

impl Services {
  pub fn new(queries: QueryClient, mutations: MutationClient, events: EventSender) -> Self {
    Self {
      queries,
      mutations,
      events,
    }
  }

  pub fn read(&self, key: &QueryKey) -> Option<CacheEntry> {
    self.queries.store().read(key)
  }

  /// Subscribe to `key`, redrawing the UI whenever it changes.
  pub fn watch(&self, key: QueryKey) -> Subscription {
    let tx = self.events.clone();
    let changed = key.clone();
    let listener: Listener = Arc::new(move |_: Option<&CacheEntry>| {
      let _ = tx.send(Event::CacheUpdated(changed.clone()));
    });
    self.queries.subscribe(key, listener)
  }

  /// Refetch `key` in the background
  pub fn refresh(&self, key: &QueryKey) {
    self.queries.invalidate(&KeyPattern::Exact(key.clone()));
  }

  /// Run `mutation` in the background; the outcome arrives as
  /// `Event::Mutated`.
  pub fn mutate(&self, mutation: Mutation) {
    let mutations = self.mutations.clone();
    let tx = self.events.clone();
    tokio::spawn(async move {
      let kind = mutation.kind();
      let target = mutation.target_id();
      let result = mutations.mutate(mutation).await;
      let _ = tx.send(Event::Mutated {
        kind,
        target,
        result,
      });
    });
  }
}

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  command_bar: CommandBar,

  /// Last outcome shown in the footer
  status: Option<StatusMessage>,

  config: Config,

  services: Services,

  events: Option<EventHandler>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config, queries: QueryClient, mutations: MutationClient) -> Self {
    let events = EventHandler::new(Duration::from_millis(250));
    let services = Services::new(queries, mutations, events.sender());
    Self::with_services(config, services, Some(events))
  }

  fn with_services(config: Config, services: Services, events: Option<EventHandler>) -> Self {
    let root = TaskListView::all(services.clone(), config.page_size, config.default_owner);
    Self {
      view_stack: vec![Box::new(root)],
      command_bar: CommandBar::new(),
      status: None,
      config,
      services,
      events,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    let Some(mut events) = self.events.take() else {
      return Ok(());
    };

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let result = self.event_loop(&mut events).await;

    // Cleanup terminal, even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(&mut self, events: &mut EventHandler) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    info!("t9s started");

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      if let Some(event) = events.next().await {
        self.handle_event(event);
      } else {
        break;
      }
    }

    info!("t9s exiting");
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {
        self.services.queries.refresh_expired();
      }
      // The next draw reads the new entry
      Event::CacheUpdated(key) => debug!(key = %key, "cache updated"),
      Event::Mutated {
        kind,
        target,
        result,
      } => self.handle_mutated(kind, target, result),
    }
  }

  fn handle_mutated(
    &mut self,
    kind: MutationKind,
    target: Option<u64>,
    result: Result<Task, ApiError>,
  ) {
    self.status = Some(mutation_status(kind, &result));
    for view in self.view_stack.iter_mut() {
      view.on_mutation(kind, target, &result);
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let captured = self
      .view_stack
      .last()
      .map(|v| v.captures_input())
      .unwrap_or(false);
    if !captured {
      match self.command_bar.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(line)) => {
          self.execute_command(&line);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        // The root view stays; leave with :quit or Ctrl-C
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        }
      }
    }
  }

  fn execute_command(&mut self, line: &str) {
    let command = match commands::parse(line) {
      Ok(command) => command,
      Err(e) => {
        self.status = Some(StatusMessage::Error(e));
        return;
      }
    };
    debug!(?command, "command");

    let services = self.services.clone();
    match command {
      AppCommand::Tasks => self.set_root(Box::new(TaskListView::all(
        services,
        self.config.page_size,
        self.config.default_owner,
      ))),
      AppCommand::Owner(owner_id) => {
        self.set_root(Box::new(TaskListView::owner(services, owner_id)))
      }
      AppCommand::Task(id) => {
        self
          .view_stack
          .push(Box::new(TaskDetailView::task(services, id)))
      }
      AppCommand::Random => {
        self
          .view_stack
          .push(Box::new(TaskDetailView::random(services)))
      }
      AppCommand::Quit => self.should_quit = true,
    }
  }

  fn set_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
  }

  // Accessors for UI rendering
  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn command_bar(&self) -> &CommandBar {
    &self.command_bar
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn status(&self) -> Option<&StatusMessage> {
    self.status.as_ref()
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }
}

fn mutation_status(kind: MutationKind, result: &Result<Task, ApiError>) -> StatusMessage {
  match (kind, result) {
    (MutationKind::Create, Ok(task)) => StatusMessage::Info(format!("Added task {}", task.id)),
    (MutationKind::Update, Ok(task)) if task.completed => {
      StatusMessage::Info(format!("Completed task {}", task.id))
    }
    (MutationKind::Update, Ok(task)) => {
      StatusMessage::Info(format!("Reopened task {}", task.id))
    }
    (MutationKind::Delete, Ok(task)) => StatusMessage::Info(format!("Deleted task {}", task.id)),
    (MutationKind::Create, Err(e)) => {
      StatusMessage::Error(format!("Failed to add task: {}", e))
    }
    (MutationKind::Update, Err(e)) => {
      StatusMessage::Error(format!("Failed to update task: {}", e))
    }
    (MutationKind::Delete, Err(e)) => {
      StatusMessage::Error(format!("Failed to delete task: {}", e))
    }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::Services;
  use crate::cache::CacheStore;
  use crate::event::Event;
  use crate::mutation::MutationClient;
  use crate::query::testing::{task, FakeApi};
  use crate::query::{QueryClient, QueryOptions};
  use std::sync::Arc;
  use tokio::sync::mpsc;

  /// Services over a fake API holding tasks `ids`, all owned by owner 1
  pub fn services(ids: &[u64]) -> (Services, Arc<FakeApi>, mpsc::UnboundedReceiver<Event>) {
    let api = Arc::new(FakeApi::with_tasks(ids.iter().map(|id| task(*id, 1)).collect()));
    let store = Arc::new(CacheStore::new());
    let queries = QueryClient::new(store, api.clone(), QueryOptions::default());
    let mutations = MutationClient::new(queries.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    (Services::new(queries, mutations, tx), api, rx)
  }
}
