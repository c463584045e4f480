//! One-shot subcommands that print to stdout instead of opening the terminal UI.

use chrono::Utc;
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};

use crate::cache::PostQuery;
use crate::gateway::{
  CommentId, NewPost, Post, PostId, PostType, Principal, ReactionType, ReportReason, UserProfile,
};
use crate::sync::SyncClient;
use crate::ui::renderfns::relative_time;

#[derive(Subcommand, Debug)]
pub enum Cmd {
  /// Open the terminal UI (default)
  Browse,

  /// List posts
  Feed {
    /// Only posts of this type
    #[arg(short = 't', long = "type", value_enum)]
    post_type: Option<PostType>,

    /// Keyword to search titles and bodies for
    #[arg(short, long)]
    search: Option<String>,

    #[arg(long)]
    oldest_first: bool,
  },

  /// Show a post with its reactions and comment thread
  Show { post_id: PostId },

  /// Create a post
  Post {
    #[arg(short = 't', long = "type", value_enum)]
    post_type: PostType,

    #[arg(long)]
    title: String,

    #[arg(long)]
    body: String,

    /// Tag to attach; repeat for more than one
    #[arg(long = "tag")]
    tags: Vec<String>,
  },

  /// Comment on a post, or reply to one of its comments
  Comment {
    post_id: PostId,

    #[arg(long)]
    reply_to: Option<CommentId>,

    body: String,
  },

  /// Add a reaction to a post (a one-shot run has no record of earlier reactions)
  React {
    post_id: PostId,

    #[arg(value_enum)]
    reaction: ReactionType,
  },

  /// Report a post or comment
  Report {
    content_id: u64,

    /// The id names a comment rather than a post
    #[arg(long)]
    comment: bool,

    #[arg(long, value_enum)]
    reason: ReportReason,
  },

  /// Show a member profile (yours when no principal is given)
  Profile { principal: Option<Principal> },

  /// Set your display name
  SetName { name: String },

  /// Print the community guidelines
  Guidelines,
}

/// Run a subcommand other than `browse` to completion.
pub async fn run(client: &SyncClient, cmd: Cmd) -> Result<()> {
  match cmd {
    Cmd::Browse => Err(eyre!("browse runs the terminal UI")),
    Cmd::Feed {
      post_type,
      search,
      oldest_first,
    } => {
      let query =
        PostQuery::new(post_type, search.as_deref().unwrap_or_default()).oldest_first(oldest_first);
      let posts = client.posts(query).await?;
      if posts.is_empty() {
        println!("No posts.");
      }
      for post in &posts {
        print_summary(post);
      }
      Ok(())
    }
    Cmd::Show { post_id } => show(client, post_id).await,
    Cmd::Post {
      post_type,
      title,
      body,
      tags,
    } => {
      let id = client
        .create_post(NewPost {
          post_type,
          title,
          body,
          tags,
        })
        .await?;
      println!("Created post #{}", id);
      Ok(())
    }
    Cmd::Comment {
      post_id,
      reply_to,
      body,
    } => {
      let id = client.create_comment(post_id, reply_to, body).await?;
      println!("Created comment #{} on post #{}", id, post_id);
      Ok(())
    }
    Cmd::React { post_id, reaction } => {
      let mine = client.toggle_reaction(post_id, reaction).await?;
      let state = if mine.contains(&reaction) { "on" } else { "off" };
      let count = client.reaction_count(post_id, reaction).await?;
      println!("{} is {} for post #{} ({} total)", reaction.as_str(), state, post_id, count);
      Ok(())
    }
    Cmd::Report {
      content_id,
      comment,
      reason,
    } => {
      client.report_content(content_id, comment, reason).await?;
      let what = if comment { "comment" } else { "post" };
      println!("Reported {} #{}", what, content_id);
      Ok(())
    }
    Cmd::Profile { principal } => {
      let principal = principal
        .or_else(|| client.principal().cloned())
        .ok_or_else(|| eyre!("No principal given and none configured"))?;
      match client.profile(&principal).await? {
        Some(profile) => println!("{}: {}", principal, profile.name),
        None => println!("{} has no profile", principal),
      }
      Ok(())
    }
    Cmd::SetName { name } => {
      client.save_profile(UserProfile { name: name.clone() }).await?;
      println!("Display name set to {}", name);
      Ok(())
    }
    Cmd::Guidelines => {
      println!("{}", client.guidelines().await?);
      Ok(())
    }
  }
}

async fn show(client: &SyncClient, post_id: PostId) -> Result<()> {
  let post = client
    .post(post_id)
    .await?
    .ok_or_else(|| eyre!("Post #{} does not exist", post_id))?;
  let now = Utc::now();

  println!("[{}] {}", post.post_type.as_str(), post.title);
  println!("by {} · {}", post.author, relative_time(post.created_at, now));
  if !post.tags.is_empty() {
    println!("tags: {}", post.tags.join(", "));
  }
  println!();
  println!("{}", post.body);
  println!();

  let mut counts = Vec::new();
  for reaction in ReactionType::ALL {
    let count = client.reaction_count(post_id, reaction).await?;
    counts.push(format!("{} {}", reaction.as_str(), count));
  }
  println!("{}", counts.join("  "));

  let thread = client.thread(post_id).await?;
  println!();
  println!("{} comments", thread.len());
  for item in thread {
    println!(
      "- #{} {} ({}): {}",
      item.comment.id,
      item.comment.author,
      relative_time(item.comment.created_at, now),
      item.comment.body
    );
    match item.replies {
      Ok(replies) => {
        for reply in replies {
          println!("    ↳ #{} {}: {}", reply.id, reply.author, reply.body);
        }
      }
      Err(e) => println!("    (replies unavailable: {})", e),
    }
  }
  Ok(())
}

fn print_summary(post: &Post) {
  let tags: String = post.tags.iter().map(|t| format!(" #{}", t)).collect();
  println!(
    "#{:<5} {:<8} {}  by {}{}",
    post.id,
    post.post_type.as_str(),
    post.title,
    post.author,
    tags
  );
}
