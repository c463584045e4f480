mod line_editor;
mod prompt;

pub use prompt::{Prompt, PromptEvent};

/// Outcome of offering a key to a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Consumed, nothing for the owner to do
  Handled,
  /// Consumed, and the owner has an event to act on
  Event(T),
  /// Not consumed; try the next handler
  NotHandled,
}
