use ratatui::prelude::Color;

/// Truncate a string to at most `max_len` chars, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

const OWNER_COLORS: [Color; 6] = [
  Color::Cyan,
  Color::Magenta,
  Color::Yellow,
  Color::Green,
  Color::Blue,
  Color::LightRed,
];

/// Stable badge color for an owner id
pub fn owner_color(owner_id: u64) -> Color {
  OWNER_COLORS[(owner_id % OWNER_COLORS.len() as u64) as usize]
}
