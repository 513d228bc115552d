//! In-memory accumulation of a streamed reply.

use crate::{Delta, Message};

/// Accumulates token deltas into the assistant reply of one exchange.
#[derive(Debug, Default)]
pub struct ReplyAccumulator {
    /// Reply text received so far
    content: String,
    /// Token deltas received, empty ones included.
    tokens: usize,
    /// Decode errors since the last token.
    consecutive_errors: u32,
    /// Decode errors over the whole exchange.
    total_errors: u32,
}

impl ReplyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a delta and return the consecutive decode error count afterwards.
    pub fn process_delta(&mut self, delta: &Delta) -> u32 {
        match delta {
            Delta::Token { text } => {
                self.content.push_str(text);
                self.tokens += 1;
                self.consecutive_errors = 0;
            }
            Delta::Error { .. } => {
                self.consecutive_errors += 1;
                self.total_errors += 1;
            }
            Delta::End => {}
        }

        self.consecutive_errors
    }

    /// Get the current accumulated content.
    pub fn current_content(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens
    }

    pub fn total_errors(&self) -> u32 {
        self.total_errors
    }

    /// Finalize into the assistant message to commit. Empty replies produce none.
    pub fn finalize(self) -> Option<Message> {
        if self.content.is_empty() {
            None
        } else {
            Some(Message::assistant(self.content))
        }
    }
}
