use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{Message, Role};

/// Longest title derived from the opening prompt, in characters.
const TITLE_CHARS: usize = 50;

/// A persisted conversation with one backend model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new, empty conversation for a model.
    pub fn new(model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.into(),
            title: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message at the end of the conversation.
    ///
    /// The first user message also names an untitled conversation.
    pub fn append_message(&mut self, message: Message) {
        if self.title.is_none() && message.role == Role::User {
            let title: String = message.content.chars().take(TITLE_CHARS).collect();
            if !title.trim().is_empty() {
                self.title = Some(title);
            }
        }
        self.updated_at = message.timestamp.max(self.updated_at);
        self.messages.push(message);
    }

    /// Get the messages in conversation order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the most recent message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
