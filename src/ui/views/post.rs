use std::collections::HashMap;

use crate::cache::{CacheKey, ReactionSet};
use crate::gateway::{Comment, CommentId, Post, PostId, ReactionType};
use crate::handles::{MutationState, PendingMutation, QueryState, Subscription};
use crate::sync::thread::{flatten_known, top_level};
use crate::sync::SyncClient;
use crate::ui::components::{KeyResult, Prompt, PromptEvent};
use crate::ui::renderfns::{post_type_color, relative_time};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// One post with live reaction counts and its comment thread
pub struct PostView {
  client: SyncClient,
  post_id: PostId,
  post: Subscription<Option<Post>>,
  counts: Vec<(ReactionType, Subscription<u64>)>,
  mine: Option<Subscription<ReactionSet>>,
  comments: Subscription<Vec<Comment>>,
  /// Reply lists, subscribed as the thread reveals them
  replies: HashMap<CommentId, Subscription<Vec<Comment>>>,
  toggles: Vec<PendingMutation<ReactionSet>>,
  comment_write: PendingMutation<CommentId>,
  composer: Prompt,
  reply_to: Option<CommentId>,
  selected: usize,
  scroll: u16,
  status: Option<String>,
}

impl PostView {
  pub fn new(client: SyncClient, post_id: PostId) -> Self {
    let counts = ReactionType::ALL
      .iter()
      .map(|&reaction| {
        (
          reaction,
          client.subscribe(CacheKey::ReactionCount(post_id, reaction)),
        )
      })
      .collect();
    let mine = client
      .principal()
      .cloned()
      .map(|principal| client.subscribe(CacheKey::UserReactions(post_id, principal)));

    Self {
      post: client.subscribe(CacheKey::Post(post_id)),
      comments: client.subscribe(CacheKey::Comments(post_id)),
      client,
      post_id,
      counts,
      mine,
      replies: HashMap::new(),
      toggles: Vec::new(),
      comment_write: PendingMutation::new(),
      composer: Prompt::new('c', " Comment "),
      reply_to: None,
      selected: 0,
      scroll: 0,
      status: None,
    }
  }

  fn top_level(&self) -> Vec<&Comment> {
    self
      .comments
      .data()
      .map(|comments| top_level(comments))
      .unwrap_or_default()
  }

  fn replies_of(&self, id: CommentId) -> Option<&[Comment]> {
    self
      .replies
      .get(&id)
      .and_then(|subscription| subscription.data())
      .map(Vec::as_slice)
  }

  /// Subscribe to the replies of every comment the thread has revealed so far.
  fn follow_thread(&mut self) {
    let mut wanted: Vec<CommentId> = self.top_level().iter().map(|c| c.id).collect();
    for subscription in self.replies.values() {
      if let Some(replies) = subscription.data() {
        wanted.extend(replies.iter().map(|c| c.id));
      }
    }
    for id in wanted {
      if !self.replies.contains_key(&id) {
        let subscription = self.client.subscribe(CacheKey::Replies(id));
        self.replies.insert(id, subscription);
      }
    }
  }

  fn toggle(&mut self, reaction: ReactionType) {
    let mut pending = PendingMutation::new();
    pending.start(self.client.toggle_reaction(self.post_id, reaction));
    self.toggles.push(pending);
  }

  fn submit_comment(&mut self, body: String) {
    let body = body.trim().to_string();
    if body.is_empty() {
      return;
    }
    let client = self.client.clone();
    let post_id = self.post_id;
    let parent = self.reply_to.take();
    self
      .comment_write
      .start(async move { client.create_comment(post_id, parent, body).await });
  }

  fn reaction_line(&self) -> Line<'static> {
    let mine = self.mine.as_ref().and_then(|m| m.data());
    let mut spans = Vec::new();
    for (i, (reaction, count)) in self.counts.iter().enumerate() {
      let marked = mine.is_some_and(|set| set.contains(reaction));
      let count = match count.state() {
        QueryState::Success { data, stale: false } => data.to_string(),
        QueryState::Success { data, stale: true } => format!("{}~", data),
        QueryState::Error { .. } => "?".to_string(),
        _ => "…".to_string(),
      };
      let style = if marked {
        Style::default().fg(Color::Green).bold()
      } else {
        Style::default().fg(Color::White)
      };
      spans.push(Span::styled(format!("[{}] ", i + 1), Style::default().fg(Color::Cyan)));
      spans.push(Span::styled(
        format!("{}{} {}   ", if marked { "● " } else { "" }, reaction.as_str(), count),
        style,
      ));
    }
    Line::from(spans)
  }

  fn thread_lines(&self) -> Vec<Line<'static>> {
    let now = Utc::now();
    let roots = self.top_level();
    if roots.is_empty() {
      let text = match self.comments.state() {
        QueryState::Error { message, .. } => format!("Comments failed to load: {}", message),
        QueryState::Success { .. } => "No comments yet. Press 'c' to start one.".to_string(),
        _ => "Loading comments...".to_string(),
      };
      return vec![Line::styled(text, Style::default().fg(Color::DarkGray))];
    }

    let mut lines = Vec::new();
    for (i, root) in roots.iter().enumerate() {
      let marker = if i == self.selected { "> " } else { "  " };
      lines.push(Line::from(vec![
        Span::styled(marker, Style::default().fg(Color::Yellow)),
        Span::styled(root.author.to_string(), Style::default().fg(Color::Cyan)),
        Span::styled(
          format!(" {}", relative_time(root.created_at, now)),
          Style::default().fg(Color::DarkGray),
        ),
      ]));
      lines.push(Line::raw(format!("  {}", root.body)));

      let replies = flatten_known(self.post_id, root.id, |id| self.replies_of(id));
      for reply in replies {
        lines.push(Line::from(vec![
          Span::styled("    ↳ ", Style::default().fg(Color::DarkGray)),
          Span::styled(reply.author.to_string(), Style::default().fg(Color::Cyan)),
          Span::raw(format!(": {}", reply.body)),
        ]));
      }
      if let Some(QueryState::Error { message, .. }) =
        self.replies.get(&root.id).map(|s| s.state())
      {
        lines.push(Line::styled(
          format!("    replies failed: {}", message),
          Style::default().fg(Color::Red),
        ));
      }
    }
    lines
  }

  fn render_detail(&mut self, frame: &mut Frame, area: Rect) {
    let title = match self.post.state() {
      QueryState::Loading { previous: None } | QueryState::Idle => " loading... ".to_string(),
      QueryState::Error { message, .. } => format!(" error: {} ", message),
      _ => format!(" Post #{} ", self.post_id),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let post = match self.post.data() {
      Some(Some(post)) => post.clone(),
      Some(None) => {
        let missing = Paragraph::new("This post does not exist.")
          .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(missing, inner);
        return;
      }
      None => return,
    };

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(2), // Title and metadata
        Constraint::Length(1), // Reactions
        Constraint::Min(1),    // Body and thread
      ])
      .split(inner);

    let header = vec![
      Line::from(vec![
        Span::styled(
          format!("{} ", post.post_type.as_str()),
          Style::default().fg(post_type_color(post.post_type)),
        ),
        Span::styled(post.title.clone(), Style::default().bold()),
      ]),
      Line::from(vec![
        Span::styled(
          format!("by {} · {}", post.author, relative_time(post.created_at, Utc::now())),
          Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
          post
            .tags
            .iter()
            .map(|t| format!("  #{}", t))
            .collect::<String>(),
          Style::default().fg(Color::Magenta),
        ),
      ]),
    ];
    frame.render_widget(Paragraph::new(header), chunks[0]);
    frame.render_widget(Paragraph::new(self.reaction_line()), chunks[1]);

    let mut lines = vec![Line::raw("")];
    lines.extend(post.body.lines().map(|l| Line::raw(l.to_string())));
    lines.push(Line::raw(""));
    lines.push(Line::styled(
      "── Comments ──",
      Style::default().fg(Color::DarkGray),
    ));
    lines.extend(self.thread_lines());

    let body = Paragraph::new(lines)
      .wrap(Wrap { trim: false })
      .scroll((self.scroll, 0));
    frame.render_widget(body, chunks[2]);
  }
}

impl View for PostView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.composer.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted(body)) => {
        self.submit_comment(body);
        return ViewAction::None;
      }
      KeyResult::Event(PromptEvent::Cancelled) => {
        self.reply_to = None;
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('1') => self.toggle(ReactionType::Support),
      KeyCode::Char('2') => self.toggle(ReactionType::Helpful),
      KeyCode::Char('j') | KeyCode::Down => {
        let count = self.top_level().len();
        if self.selected + 1 < count {
          self.selected += 1;
        }
      }
      KeyCode::Char('k') | KeyCode::Up => self.selected = self.selected.saturating_sub(1),
      KeyCode::PageDown => self.scroll = self.scroll.saturating_add(10),
      KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(10),
      KeyCode::Char('R') => {
        let target = self.top_level().get(self.selected).map(|c| c.id);
        if let Some(id) = target {
          self.reply_to = Some(id);
          self.composer.activate();
        }
      }
      KeyCode::Char('r') => {
        self.post.refetch();
        self.comments.refetch();
        for (_, count) in &mut self.counts {
          count.refetch();
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
    self.composer.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match self.post.data() {
      Some(Some(post)) => crate::ui::renderfns::truncate(&post.title, 30),
      _ => format!("#{}", self.post_id),
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.composer.is_active()
  }

  fn tick(&mut self) {
    self.post.poll();
    self.comments.poll();
    for (_, count) in &mut self.counts {
      count.poll();
    }
    if let Some(mine) = &mut self.mine {
      mine.poll();
    }
    for subscription in self.replies.values_mut() {
      subscription.poll();
    }
    self.follow_thread();

    for toggle in &mut self.toggles {
      if toggle.poll() {
        if let MutationState::Failed(message) = toggle.state() {
          self.status = Some(message.clone());
        }
      }
    }
    self.toggles.retain(PendingMutation::is_pending);

    if self.comment_write.poll() {
      match self.comment_write.state() {
        MutationState::Failed(message) => self.status = Some(message.clone()),
        MutationState::Success(_) => self.status = None,
        _ => {}
      }
    }
  }

  fn status(&self) -> Option<String> {
    self.status.clone()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("1/2", "react").with_priority(10),
      ShortcutInfo::new("c", "comment").with_priority(20),
      ShortcutInfo::new("R", "reply").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
