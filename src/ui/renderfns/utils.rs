use chrono::{DateTime, Utc};
use ratatui::prelude::Color;

use crate::gateway::PostType;

/// Cut `s` to at most `max_chars` characters, ending in "..." when shortened.
pub fn truncate(s: &str, max_chars: usize) -> String {
  if s.chars().count() <= max_chars {
    return s.to_string();
  }
  let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
  format!("{}...", kept)
}

/// "just now", "5m ago", "3h ago", "2d ago"
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let elapsed = now - at;
  if elapsed.num_minutes() < 1 {
    "just now".to_string()
  } else if elapsed.num_hours() < 1 {
    format!("{}m ago", elapsed.num_minutes())
  } else if elapsed.num_days() < 1 {
    format!("{}h ago", elapsed.num_hours())
  } else {
    format!("{}d ago", elapsed.num_days())
  }
}

pub fn post_type_color(post_type: PostType) -> Color {
  match post_type {
    PostType::Question => Color::Yellow,
    PostType::Story => Color::Magenta,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_counts_characters() {
    assert_eq!(truncate("hello world", 8), "hello...");
    assert_eq!(truncate("überraschung", 6), "übe...");
  }

  #[test]
  fn test_relative_time() {
    let now = Utc::now();
    assert_eq!(relative_time(now, now), "just now");
    assert_eq!(relative_time(now - chrono::Duration::minutes(5), now), "5m ago");
    assert_eq!(relative_time(now - chrono::Duration::hours(3), now), "3h ago");
    assert_eq!(relative_time(now - chrono::Duration::days(2), now), "2d ago");
  }
}
