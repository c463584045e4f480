use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What a key did to a [`LineEditor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
  /// Text or cursor changed
  Edited,
  Submitted(String),
  Cancelled,
  NotHandled,
}

/// Single-line text editor. The cursor counts characters, not bytes.
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
  chars: Vec<char>,
  cursor: usize,
}

impl LineEditor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn value(&self) -> String {
    self.chars.iter().collect()
  }

  pub fn is_empty(&self) -> bool {
    self.chars.is_empty()
  }

  pub fn clear(&mut self) {
    self.chars.clear();
    self.cursor = 0;
  }

  /// Text before and after the cursor, for rendering.
  pub fn split_at_cursor(&self) -> (String, String) {
    (
      self.chars[..self.cursor].iter().collect(),
      self.chars[self.cursor..].iter().collect(),
    )
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> EditOutcome {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
      KeyCode::Esc => return EditOutcome::Cancelled,
      KeyCode::Enter => return EditOutcome::Submitted(self.value()),
      KeyCode::Backspace if self.cursor > 0 => {
        self.cursor -= 1;
        self.chars.remove(self.cursor);
      }
      KeyCode::Delete if self.cursor < self.chars.len() => {
        self.chars.remove(self.cursor);
      }
      KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
      KeyCode::Right => self.cursor = (self.cursor + 1).min(self.chars.len()),
      KeyCode::Home => self.cursor = 0,
      KeyCode::End => self.cursor = self.chars.len(),
      KeyCode::Char('a') if ctrl => self.cursor = 0,
      KeyCode::Char('e') if ctrl => self.cursor = self.chars.len(),
      KeyCode::Char('u') if ctrl => {
        self.chars.drain(..self.cursor);
        self.cursor = 0;
      }
      KeyCode::Char('w') if ctrl => {
        let end = self.cursor;
        let mut start = end;
        while start > 0 && self.chars[start - 1] == ' ' {
          start -= 1;
        }
        while start > 0 && self.chars[start - 1] != ' ' {
          start -= 1;
        }
        self.chars.drain(start..end);
        self.cursor = start;
      }
      KeyCode::Char(_) if ctrl => return EditOutcome::NotHandled,
      KeyCode::Char(c) => {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
      }
      KeyCode::Backspace | KeyCode::Delete => {}
      _ => return EditOutcome::NotHandled,
    }
    EditOutcome::Edited
  }
}
