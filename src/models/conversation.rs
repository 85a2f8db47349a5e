use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attachment::AttachedDocument;
use crate::repositories::{ConversationData, RepositoryResult};

/// Maximum number of characters taken from the first user message when a
/// conversation is auto-named after its first exchange.
pub const MAX_DERIVED_NAME_CHARS: usize = 30;

pub const DEFAULT_CONVERSATION_NAME: &str = "New Conversation";

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Whether a message was typed by the user or generated by a workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Prompt,
    Automation,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<AttachedDocument>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            message_type: Some(MessageType::Prompt),
            documents: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            message_type: None,
            documents: None,
        }
    }

    pub fn automation(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            message_type: Some(MessageType::Automation),
            documents: None,
        }
    }

    pub fn with_documents(mut self, documents: Vec<AttachedDocument>) -> Self {
        self.documents = Some(documents);
        self
    }
}

/// A named, ordered sequence of chat messages plus generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub messages: Vec<Message>,
    pub model_id: String,
    pub temperature: f32,
    pub prompt: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Conversation {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            name: DEFAULT_CONVERSATION_NAME.to_string(),
            messages: Vec::new(),
            model_id: model_id.into(),
            temperature,
            prompt: prompt.into(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Drop `delete_count` trailing messages, then append `message`.
    /// Supports "edit and resend": the edited turn replaces the discarded tail.
    pub fn truncate_and_append(&mut self, delete_count: usize, message: Message) {
        let keep = self.messages.len().saturating_sub(delete_count);
        self.messages.truncate(keep);
        self.messages.push(message);
        self.updated_at = Utc::now().timestamp();
    }

    /// Append a fresh assistant message seeded with `content`
    /// (the first decoded chunk of a streaming response).
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
        self.updated_at = Utc::now().timestamp();
    }

    /// Wholesale-replace the trailing assistant message content with the full
    /// accumulated text so far. The decoder may yield cumulative or
    /// partial-multibyte boundaries, so this is a replace, never an append.
    pub fn replace_last_assistant_content(&mut self, content: impl Into<String>) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Assistant {
                last.content = content.into();
                self.updated_at = Utc::now().timestamp();
            }
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Serializable form for the persistence collaborator
    pub fn to_data(&self) -> RepositoryResult<ConversationData> {
        Ok(ConversationData {
            id: self.id.clone(),
            name: self.name.clone(),
            model_id: self.model_id.clone(),
            temperature: self.temperature,
            prompt: self.prompt.clone(),
            tags: serde_json::to_string(&self.tags)?,
            message_history: serde_json::to_string(&self.messages)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    /// Restore a conversation from persisted data
    pub fn from_data(data: ConversationData) -> RepositoryResult<Self> {
        Ok(Self {
            id: data.id,
            name: data.name,
            messages: serde_json::from_str(&data.message_history)?,
            model_id: data.model_id,
            temperature: data.temperature,
            prompt: data.prompt,
            tags: serde_json::from_str(&data.tags)?,
            created_at: data.created_at,
            updated_at: data.updated_at,
        })
    }
}

/// Derive a conversation name from the first user message.
/// Truncated to [`MAX_DERIVED_NAME_CHARS`] characters plus an ellipsis.
pub fn derived_name(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() > MAX_DERIVED_NAME_CHARS {
        let cut: String = trimmed.chars().take(MAX_DERIVED_NAME_CHARS).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}
