use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::tasks::TaskDraft;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use std::ops::RangeInclusive;

/// Owner ids the form accepts
pub const OWNER_RANGE: RangeInclusive<u64> = 1..=100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  Submitted(TaskDraft),
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Text,
  Owner,
}

/// Add-task form: description and owner id
#[derive(Debug, Clone)]
pub struct TaskForm {
  text: TextInput,
  owner: TextInput,
  focus: Field,
  error: Option<String>,
}

impl TaskForm {
  pub fn new(default_owner: u64) -> Self {
    Self {
      text: TextInput::new(),
      owner: TextInput::with_value(&default_owner.to_string()),
      focus: Field::Text,
      error: None,
    }
  }

  fn draft(&self) -> Result<TaskDraft, String> {
    let owner = self.owner.value();
    let owner_id = owner
      .trim()
      .parse::<u64>()
      .ok()
      .filter(|id| OWNER_RANGE.contains(id))
      .ok_or_else(|| {
        format!(
          "Owner must be a number from {} to {}",
          OWNER_RANGE.start(),
          OWNER_RANGE.end()
        )
      })?;
    TaskDraft::new(&self.text.value(), owner_id).ok_or_else(|| "Task text is required".to_string())
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    match key.code {
      KeyCode::Tab | KeyCode::BackTab => {
        self.focus = match self.focus {
          Field::Text => Field::Owner,
          Field::Owner => Field::Text,
        };
        return KeyResult::Handled;
      }
      KeyCode::Esc => return KeyResult::Event(FormEvent::Cancelled),
      KeyCode::Enter => {
        return match self.draft() {
          Ok(draft) => KeyResult::Event(FormEvent::Submitted(draft)),
          Err(e) => {
            self.error = Some(e);
            KeyResult::Handled
          }
        };
      }
      _ => {}
    }

    let field = match self.focus {
      Field::Text => &mut self.text,
      Field::Owner => &mut self.owner,
    };
    match field.handle_key(key) {
      InputResult::Consumed => {
        self.error = None;
        KeyResult::Handled
      }
      InputResult::NotHandled => KeyResult::NotHandled,
      InputResult::Submitted(_) | InputResult::Cancelled => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    let width = (area.width * 70 / 100).clamp(30, 70).min(area.width);
    let height = 6.min(area.height);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Add task ")
      .title_bottom(Line::from(" Tab: switch  Enter: add  Esc: cancel ").right_aligned());
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    let label = |name: &'static str, field: Field| {
      let style = if self.focus == field {
        Style::default().fg(Color::Cyan).bold()
      } else {
        Style::default().fg(Color::DarkGray)
      };
      Span::styled(name, style)
    };

    let mut text_line = self.text.line(self.focus == Field::Text);
    text_line.spans.insert(0, label("Task:  ", Field::Text));
    let mut owner_line = self.owner.line(self.focus == Field::Owner);
    owner_line.spans.insert(0, label("Owner: ", Field::Owner));

    let mut lines = vec![text_line, owner_line];
    if let Some(error) = &self.error {
      lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    }

    frame.render_widget(Paragraph::new(lines), inner);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_str(form: &mut TaskForm, s: &str) {
    for c in s.chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
  }

  #[test]
  fn test_submit_builds_draft() {
    let mut form = TaskForm::new(5);
    type_str(&mut form, "  water plants ");
    match form.handle_key(key(KeyCode::Enter)) {
      KeyResult::Event(FormEvent::Submitted(draft)) => {
        assert_eq!(draft.text(), "water plants");
        assert_eq!(draft.owner_id, 5);
        assert!(!draft.completed);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_blank_text_is_refused() {
    let mut form = TaskForm::new(1);
    type_str(&mut form, "   ");
    assert_eq!(form.handle_key(key(KeyCode::Enter)), KeyResult::Handled);
    assert!(form.error.is_some());
  }

  #[test]
  fn test_owner_out_of_range_is_refused() {
    let mut form = TaskForm::new(1);
    type_str(&mut form, "x");
    form.handle_key(key(KeyCode::Tab));
    type_str(&mut form, "01");
    // owner field now reads "101"
    assert_eq!(form.handle_key(key(KeyCode::Enter)), KeyResult::Handled);
    assert!(form.error.as_deref().unwrap().contains("Owner"));

    form.handle_key(key(KeyCode::Backspace));
    assert!(form.error.is_none());
    assert!(matches!(
      form.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(FormEvent::Submitted(d)) if d.owner_id == 10
    ));
  }

  #[test]
  fn test_escape_cancels() {
    let mut form = TaskForm::new(1);
    assert_eq!(
      form.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(FormEvent::Cancelled)
    );
  }
}
