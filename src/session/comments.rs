//! Session Comments
//!
//! Bounded queue of free-text comments the two players may exchange during
//! a game. Only the most recent [`MAX_COMMENTS`] per player are kept.

use std::collections::VecDeque;

/// Comments kept per player.
pub const MAX_COMMENTS: usize = 5;

/// Bounded, ordered comment log for one session.
#[derive(Debug, Default)]
pub struct CommentQueue {
    entries: VecDeque<(usize, String)>,
}

impl CommentQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a comment from player `author` (0 or 1), evicting that
    /// player's oldest comment beyond the cap.
    pub fn push(&mut self, author: usize, text: impl Into<String>) {
        self.entries.push_back((author, text.into()));

        let count = self.entries.iter().filter(|(a, _)| *a == author).count();
        if count > MAX_COMMENTS {
            if let Some(pos) = self.entries.iter().position(|(a, _)| *a == author) {
                self.entries.remove(pos);
            }
        }
    }

    /// Render the log for one viewer, oldest first.
    pub fn render(&self, viewer: usize, names: [&str; 2]) -> String {
        self.entries
            .iter()
            .map(|(author, text)| {
                let who = if *author == viewer { "you" } else { names[*author] };
                format!("[{who}] {text}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
