use super::line_editor::{EditOutcome, LineEditor};
use super::KeyResult;
use crate::commands::{self, Command};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};

const MAX_SUGGESTIONS: usize = 8;

/// Events a prompt hands to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
  Submitted(String),
  Cancelled,
}

/// A one-line overlay prompt opened by a trigger key.
///
/// With `suggest_commands` set it completes `:` commands; Tab cycles the
/// suggestions and Enter submits the selected command's name.
#[derive(Debug, Clone)]
pub struct Prompt {
  trigger: char,
  title: &'static str,
  editor: LineEditor,
  active: bool,
  suggest_commands: bool,
  selected: usize,
}

impl Prompt {
  pub fn new(trigger: char, title: &'static str) -> Self {
    Self {
      trigger,
      title,
      editor: LineEditor::new(),
      active: false,
      suggest_commands: false,
      selected: 0,
    }
  }

  pub fn command() -> Self {
    Self {
      suggest_commands: true,
      ..Self::new(':', " Command ")
    }
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn activate(&mut self) {
    self.active = true;
    self.editor.clear();
    self.selected = 0;
  }

  fn suggestions(&self) -> Vec<&'static Command> {
    if self.suggest_commands {
      commands::get_suggestions(&self.editor.value())
    } else {
      Vec::new()
    }
  }

  /// Call for every key; an inactive prompt only reacts to its trigger.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<PromptEvent> {
    if !self.active {
      if key.code == KeyCode::Char(self.trigger) {
        self.activate();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Tab | KeyCode::Down if self.suggest_commands => {
        let count = self.suggestions().len().min(MAX_SUGGESTIONS);
        if count > 0 {
          self.selected = (self.selected + 1) % count;
        }
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up if self.suggest_commands => {
        let count = self.suggestions().len().min(MAX_SUGGESTIONS);
        if count > 0 {
          self.selected = (self.selected + count - 1) % count;
        }
        return KeyResult::Handled;
      }
      _ => {}
    }

    match self.editor.handle_key(key) {
      EditOutcome::Edited => {
        self.selected = 0;
        KeyResult::Handled
      }
      EditOutcome::Submitted(text) => {
        self.active = false;
        let submitted = match self.suggestions().get(self.selected) {
          Some(cmd) => cmd.name.to_string(),
          None => text,
        };
        self.editor.clear();
        KeyResult::Event(PromptEvent::Submitted(submitted))
      }
      EditOutcome::Cancelled => {
        self.active = false;
        self.editor.clear();
        KeyResult::Event(PromptEvent::Cancelled)
      }
      // Swallow everything else while open
      EditOutcome::NotHandled => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let suggestions = self.suggestions();
    let shown = suggestions.len().min(MAX_SUGGESTIONS) as u16;
    let width = (area.width * 60 / 100)
      .clamp(30, 72)
      .min(area.width.saturating_sub(2));
    let height = (3 + shown).min(area.height.saturating_sub(1));
    let overlay = Rect::new(area.x + 1, area.y + 1, width, height);

    frame.render_widget(Clear, overlay);
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(self.title);
    let inner = block.inner(overlay);
    frame.render_widget(block, overlay);
    if inner.height == 0 {
      return;
    }

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(1), Constraint::Min(0)])
      .split(inner);

    let (before, after) = self.editor.split_at_cursor();
    let line = Line::from(vec![
      Span::styled(self.trigger.to_string(), Style::default().fg(Color::Yellow)),
      Span::raw(before),
      Span::styled("_", Style::default().fg(Color::Yellow)),
      Span::raw(after),
    ]);
    frame.render_widget(Paragraph::new(line), chunks[0]);

    if shown > 0 && chunks[1].height > 0 {
      let items: Vec<ListItem> = suggestions
        .iter()
        .take(MAX_SUGGESTIONS)
        .map(|cmd| {
          ListItem::new(Line::from(vec![
            Span::styled(format!("{:<12}", cmd.name), Style::default().fg(Color::Cyan)),
            Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
          ]))
        })
        .collect();
      let list =
        List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));
      let mut state = ListState::default();
      state.select(Some(self.selected));
      frame.render_stateful_widget(list, chunks[1], &mut state);
    }
  }
}
