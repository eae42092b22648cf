use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// A message shown at the right of the footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
  Info(String),
  Error(String),
}

/// Draw the footer bar with view breadcrumb and the last status message
pub fn draw_footer(
  frame: &mut Frame,
  area: Rect,
  breadcrumb: &[String],
  status: Option<&StatusMessage>,
) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i + 1 == breadcrumb.len() {
      // Current view - highlighted
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };

    spans.push(Span::styled(part.clone(), style));
  }

  let [left, right] =
    Layout::horizontal([Constraint::Min(0), Constraint::Percentage(60)]).areas(area);

  frame.render_widget(
    Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black)),
    left,
  );

  let status_line = match status {
    Some(StatusMessage::Info(msg)) => {
      Line::styled(format!("{} ", msg), Style::default().fg(Color::Green))
    }
    Some(StatusMessage::Error(msg)) => {
      Line::styled(format!("{} ", msg), Style::default().fg(Color::Red))
    }
    None => Line::default(),
  };
  frame.render_widget(
    Paragraph::new(status_line.right_aligned()).style(Style::default().bg(Color::Black)),
    right,
  );
}
