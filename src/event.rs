use crate::cache::QueryKey;
use crate::mutation::MutationKind;
use crate::tasks::{ApiError, Task};
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh and query polling
  Tick,
  /// A watched cache entry changed
  CacheUpdated(QueryKey),
  /// A mutation finished
  Mutated {
    kind: MutationKind,
    target: Option<u64>,
    result: Result<Task, ApiError>,
  },
}

pub type EventSender = mpsc::UnboundedSender<Event>;

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: EventSender,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm polling blocks, keep it off the async workers
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      if event::poll(tick_rate).unwrap_or(false) {
        if let Ok(CrosstermEvent::Key(key)) = event::read() {
          if key.kind != KeyEventKind::Press {
            continue;
          }
          if input_tx.send(Event::Key(key)).is_err() {
            break;
          }
        }
      } else if input_tx.send(Event::Tick).is_err() {
        break;
      }
    });

    Self { tx, rx }
  }

  /// Sender for background tasks and cache listeners
  pub fn sender(&self) -> EventSender {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
