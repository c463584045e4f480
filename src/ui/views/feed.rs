use crate::cache::{CacheKey, PostQuery};
use crate::gateway::{Post, PostType};
use crate::handles::{QueryState, Subscription};
use crate::sync::SyncClient;
use crate::ui::components::{KeyResult, Prompt, PromptEvent};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{post_type_color, relative_time, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::PostView;
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// List of posts for one filter or search
pub struct FeedView {
  client: SyncClient,
  query: PostQuery,
  posts: Subscription<Vec<Post>>,
  list_state: ListState,
  search: Prompt,
}

impl FeedView {
  pub fn new(client: SyncClient, post_type: Option<PostType>) -> Self {
    let query = PostQuery::new(post_type, "");
    Self {
      posts: client.subscribe(CacheKey::PostsByFilter(query.clone())),
      client,
      query,
      list_state: ListState::default(),
      search: Prompt::new('/', " Search "),
    }
  }

  fn set_query(&mut self, query: PostQuery) {
    if query == self.query {
      return;
    }
    self.posts = self
      .client
      .subscribe(CacheKey::PostsByFilter(query.clone()));
    self.query = query;
    self.list_state.select(None);
  }

  fn posts(&self) -> &[Post] {
    self.posts.data().map(Vec::as_slice).unwrap_or(&[])
  }

  fn title(&self) -> String {
    let mut title = match self.query.post_type() {
      None => "All posts".to_string(),
      Some(PostType::Question) => "Questions".to_string(),
      Some(PostType::Story) => "Stories".to_string(),
    };
    if let Some(keyword) = self.query.keyword() {
      title.push_str(&format!(" [{}]", keyword));
    }
    if self.query.is_oldest_first() {
      title.push_str(" (oldest first)");
    }
    title
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.posts().len();
    ensure_valid_selection(&mut self.list_state, len);

    let suffix = match self.posts.state() {
      QueryState::Loading { .. } => "loading...".to_string(),
      QueryState::Error { message, .. } => format!("error: {}", message),
      QueryState::Success { stale: true, .. } => format!("{}, refreshing", len),
      _ => len.to_string(),
    };
    let block = Block::default()
      .title(format!(" {} ({}) ", self.title(), suffix))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = match self.posts.state() {
        QueryState::Loading { .. } | QueryState::Idle => "Loading posts...",
        QueryState::Error { .. } => "Failed to load posts. Press 'r' to retry.",
        QueryState::Success { .. } => "No posts found.",
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let now = Utc::now();
    let title_width = (area.width as usize).saturating_sub(36).max(10);
    let items: Vec<ListItem> = self
      .posts()
      .iter()
      .map(|post| {
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<9}", post.post_type.as_str()),
            Style::default().fg(post_type_color(post.post_type)),
          ),
          Span::raw(format!("{:<w$}", truncate(&post.title, title_width), w = title_width)),
          Span::styled(
            format!(" {:>9}", relative_time(post.created_at, now)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::styled(
            format!("  {}", truncate(post.author.as_str(), 12)),
            Style::default().fg(Color::Cyan),
          ),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for FeedView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted(keyword)) => {
        let query = PostQuery::new(self.query.post_type(), &keyword)
          .oldest_first(self.query.is_oldest_first());
        self.set_query(query);
        return ViewAction::None;
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.posts.refetch(),
      KeyCode::Char('o') => {
        let query = self.query.clone().oldest_first(!self.query.is_oldest_first());
        self.set_query(query);
      }
      KeyCode::Esc if self.query.keyword().is_some() => {
        let query = PostQuery::new(self.query.post_type(), "");
        self.set_query(query);
      }
      KeyCode::Enter => {
        let selected = self
          .list_state
          .selected()
          .and_then(|idx| self.posts().get(idx))
          .map(|post| post.id);
        if let Some(post_id) = selected {
          return ViewAction::Push(Box::new(PostView::new(self.client.clone(), post_id)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.title()
  }

  fn is_capturing_input(&self) -> bool {
    self.search.is_active()
  }

  fn tick(&mut self) {
    self.posts.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("o", "order").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
