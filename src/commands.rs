//! `:` commands of the terminal front end and their autocomplete.

use crate::gateway::PostType;

/// What a command does once submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
  /// Show the feed, optionally narrowed to one post type
  Feed(Option<PostType>),
  Guidelines,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub action: CommandAction,
}

pub const COMMANDS: &[Command] = &[
  Command {
    name: "all",
    aliases: &["a", "feed", "posts"],
    description: "Every post, newest first",
    action: CommandAction::Feed(None),
  },
  Command {
    name: "questions",
    aliases: &["question", "ask"],
    description: "Only questions",
    action: CommandAction::Feed(Some(PostType::Question)),
  },
  Command {
    name: "stories",
    aliases: &["s", "story"],
    description: "Only stories",
    action: CommandAction::Feed(Some(PostType::Story)),
  },
  Command {
    name: "guidelines",
    aliases: &["g", "rules"],
    description: "Community guidelines",
    action: CommandAction::Guidelines,
  },
  Command {
    name: "quit",
    aliases: &["exit"],
    description: "Exit threadline",
    action: CommandAction::Quit,
  },
];

/// How well `input` names `cmd`; lower is better, `None` is no match.
fn rank(cmd: &Command, input: &str) -> Option<u8> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Commands matching `input`, best match first.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut ranked: Vec<(u8, &'static Command)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input).map(|r| (r, cmd)))
    .collect();
  // Stable, so equal ranks keep declaration order
  ranked.sort_by_key(|(r, _)| *r);
  ranked.into_iter().map(|(_, cmd)| cmd).collect()
}

/// The command `name` refers to, by name or alias.
pub fn resolve(name: &str) -> Option<CommandAction> {
  let name = name.trim().to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == name || cmd.aliases.contains(&name.as_str()))
    .map(|cmd| cmd.action)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_name_wins_over_alias_prefix() {
    let suggestions = get_suggestions("stories");
    assert_eq!(suggestions[0].name, "stories");
  }

  #[test]
  fn test_alias_match() {
    assert_eq!(get_suggestions("ask")[0].name, "questions");
    assert_eq!(get_suggestions("exit")[0].name, "quit");
  }

  #[test]
  fn test_substring_match() {
    assert_eq!(get_suggestions("line")[0].name, "guidelines");
  }

  #[test]
  fn test_resolve_by_alias() {
    assert_eq!(resolve(" Story "), Some(CommandAction::Feed(Some(PostType::Story))));
    assert_eq!(resolve("nope"), None);
  }
}
