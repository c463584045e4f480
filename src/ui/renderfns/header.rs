use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::ui::view::ShortcutInfo;

/// Who and where the client is talking to
pub struct HeaderContext<'a> {
  pub service: &'a str,
  pub principal: Option<&'a str>,
  pub connected: bool,
}

/// Draw the header bar with logo, connection and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, context: &HeaderContext, shortcuts: &[ShortcutInfo]) {
  let separator = || Span::styled("│", Style::default().fg(Color::DarkGray));
  let (state, state_color) = if context.connected {
    ("online", Color::Green)
  } else {
    ("offline", Color::Red)
  };

  let mut spans = vec![
    Span::styled(" threadline ", Style::default().fg(Color::Cyan).bold()),
    separator(),
    Span::styled(format!(" {} ", context.service), Style::default().fg(Color::White)),
    Span::styled(format!("{} ", state), Style::default().fg(state_color)),
    separator(),
    Span::styled(
      format!(" {} ", context.principal.unwrap_or("anonymous")),
      Style::default().fg(Color::Yellow).bold(),
    ),
    Span::raw(" "),
  ];

  let mut ordered: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  ordered.sort_by_key(|s| s.priority);
  for shortcut in ordered {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host part of the service URL
pub fn service_host(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
