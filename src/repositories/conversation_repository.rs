use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::error::RepositoryResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default empty tag list for data saved before tags existed
fn default_empty_tags() -> String {
    "[]".to_string()
}

/// Serializable conversation data for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationData {
    pub id: String,
    pub name: String,
    pub model_id: String,
    pub temperature: f32,
    pub prompt: String,
    #[serde(default = "default_empty_tags")]
    pub tags: String, // JSON-serialized Vec<String>
    pub message_history: String, // JSON-serialized Vec<Message>
    pub created_at: i64,         // Unix timestamp
    pub updated_at: i64,         // Unix timestamp
}

/// Repository trait for conversation persistence.
///
/// Saves are fire-and-forget from the controller's point of view: failures
/// are logged, never surfaced to the user mid-exchange.
pub trait ConversationRepository: Send + Sync + 'static {
    /// Load all conversations from storage, most recently updated first
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<ConversationData>>>;

    /// Load a single conversation by ID
    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<ConversationData>>>;

    /// Save a conversation to storage
    fn save(&self, id: &str, data: ConversationData) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Save the full conversation list
    fn save_all(&self, data: Vec<ConversationData>) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Delete a conversation from storage
    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>>;
}
