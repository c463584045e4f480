use crate::cache::CacheKey;
use crate::handles::{QueryState, Subscription};
use crate::sync::SyncClient;
use crate::ui::view::{View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

pub struct GuidelinesView {
  text: Subscription<String>,
  scroll: u16,
}

impl GuidelinesView {
  pub fn new(client: &SyncClient) -> Self {
    Self {
      text: client.subscribe(CacheKey::Guidelines),
      scroll: 0,
    }
  }
}

impl View for GuidelinesView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('r') => self.text.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(" Community guidelines ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let paragraph = match self.text.state() {
      QueryState::Error { message, previous: None } => {
        Paragraph::new(format!("Error: {}\n\nPress 'r' to retry.", message))
          .style(Style::default().fg(Color::Red))
      }
      state => match state.data() {
        Some(text) => Paragraph::new(text.clone()),
        None => Paragraph::new("Loading...").style(Style::default().fg(Color::DarkGray)),
      },
    };

    frame.render_widget(
      paragraph
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((self.scroll, 0)),
      area,
    );
  }

  fn breadcrumb_label(&self) -> String {
    "Guidelines".to_string()
  }

  fn tick(&mut self) {
    self.text.poll();
  }
}
