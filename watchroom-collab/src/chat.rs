use chrono::{DateTime, Utc};
use serde::Serialize;

/// A message in the room chat. Messages live only as long as the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub author: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    /// System messages are written by the session, never by a participant.
    pub is_system: bool,
}

impl ChatMessage {
    pub fn user(author: impl Into<String>, text: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            sent_at,
            is_system: false,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            author: "System".to_string(),
            text: text.into(),
            sent_at: Utc::now(),
            is_system: true,
        }
    }

    pub fn joined(display_name: &str) -> Self {
        Self::system(format!("{} has joined the room", display_name))
    }

    pub fn left(display_name: &str) -> Self {
        Self::system(format!("{} has left the room", display_name))
    }
}

/// The append-only chat of a room.
#[derive(Debug, Default, Clone)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
