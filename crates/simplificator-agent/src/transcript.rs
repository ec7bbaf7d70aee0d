use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::provider::{Message, Role};
use crate::stream::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Assistant reply still receiving deltas.
    Streaming,
    Complete,
    /// The stream failed; content is whatever arrived before the failure.
    Incomplete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

/// Caller-owned conversation; assistant replies grow as deltas arrive.
#[derive(Debug, Clone, Default)]
pub struct ChatTranscript {
    messages: Vec<ChatMessage>,
}

impl ChatTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Uuid {
        self.push(Role::User, content.into(), MessageStatus::Complete)
    }

    /// Start an empty assistant reply and return its id.
    pub fn begin_assistant(&mut self) -> Uuid {
        self.push(Role::Assistant, String::new(), MessageStatus::Streaming)
    }

    fn push(&mut self, role: Role, content: String, status: MessageStatus) -> Uuid {
        let id = Uuid::now_v7();
        self.messages.push(ChatMessage {
            id,
            role,
            content,
            timestamp: Utc::now(),
            status,
        });
        id
    }

    /// Apply a stream event to the reply `id`.
    ///
    /// Returns false when the message is unknown or no longer streaming.
    pub fn apply(&mut self, id: Uuid, event: &StreamEvent) -> bool {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if msg.status != MessageStatus::Streaming {
            debug!(%id, "event for finished message ignored");
            return false;
        }
        match event {
            StreamEvent::TextDelta { text } => msg.content.push_str(text),
            StreamEvent::Done => msg.status = MessageStatus::Complete,
            StreamEvent::Error { kind, .. } => {
                debug!(%id, %kind, chars = msg.content.chars().count(), "reply marked incomplete");
                msg.status = MessageStatus::Incomplete;
            }
        }
        true
    }

    pub fn get(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// History to send upstream: failed or still-streaming replies are left out.
    pub fn history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.status == MessageStatus::Complete)
            .map(|m| Message {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }
}
