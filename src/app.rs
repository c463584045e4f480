use crate::commands::{self, CommandAction};
use crate::event::{Event, EventHandler};
use crate::sync::SyncClient;
use crate::ui;
use crate::ui::components::{KeyResult, Prompt, PromptEvent};
use crate::ui::renderfns::{service_host, HeaderContext};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{FeedView, GuidelinesView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const TICK_RATE: Duration = Duration::from_millis(200);
const GC_INTERVAL: Duration = Duration::from_secs(30);

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,
  command: Prompt,
  client: SyncClient,
  service: String,
  gc_after: chrono::Duration,
  last_gc: Instant,
  should_quit: bool,
}

impl App {
  pub fn new(client: SyncClient, service_url: &str, gc_after: chrono::Duration) -> Self {
    let feed = FeedView::new(client.clone(), None);
    Self {
      view_stack: vec![Box::new(feed)],
      command: Prompt::command(),
      client,
      service: service_host(service_url).to_string(),
      gc_after,
      last_gc: Instant::now(),
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let outcome = self.event_loop().await;

    // Restore the terminal even if the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    outcome
  }

  async fn event_loop(&mut self) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(TICK_RATE);

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        Some(Event::Resize) => {}
        None => break,
      }
    }
    Ok(())
  }

  fn tick(&mut self) {
    for view in &mut self.view_stack {
      view.tick();
    }

    if self.last_gc.elapsed() >= GC_INTERVAL {
      self.last_gc = Instant::now();
      self.client.collect_garbage(self.gc_after);
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let capturing = self
      .view_stack
      .last()
      .is_some_and(|view| view.is_capturing_input());
    if !capturing {
      match self.command.handle_key(key) {
        KeyResult::Event(PromptEvent::Submitted(name)) => {
          self.execute_command(&name);
          return;
        }
        KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => {
        debug!(view = %view.breadcrumb_label(), "push view");
        self.view_stack.push(view);
      }
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn execute_command(&mut self, name: &str) {
    let Some(action) = commands::resolve(name) else {
      debug!(command = name, "unknown command");
      return;
    };
    info!(command = name, "command");

    match action {
      CommandAction::Feed(post_type) => {
        self.view_stack.clear();
        self
          .view_stack
          .push(Box::new(FeedView::new(self.client.clone(), post_type)));
      }
      CommandAction::Guidelines => {
        self
          .view_stack
          .push(Box::new(GuidelinesView::new(&self.client)));
      }
      CommandAction::Quit => self.should_quit = true,
    }
  }

  // Accessors for UI rendering
  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn command(&self) -> &Prompt {
    &self.command
  }

  pub fn header_context(&self) -> HeaderContext<'_> {
    HeaderContext {
      service: &self.service,
      principal: self.client.principal().map(|p| p.as_str()),
      connected: self.client.is_connected(),
    }
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .view_stack
      .last()
      .map(|view| view.shortcuts())
      .unwrap_or_default()
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|view| view.breadcrumb_label())
      .collect()
  }

  pub fn status(&self) -> Option<String> {
    self.view_stack.last().and_then(|view| view.status())
  }
}
