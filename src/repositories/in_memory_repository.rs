use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::conversation_repository::{BoxFuture, ConversationData, ConversationRepository};
use super::error::RepositoryResult;

/// In-memory repository for conversations.
/// Useful for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryConversationRepository {
    conversations: Arc<Mutex<HashMap<String, ConversationData>>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations (test convenience).
    pub fn count(&self) -> usize {
        self.conversations.lock().len()
    }
}

impl ConversationRepository for InMemoryConversationRepository {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<ConversationData>>> {
        let conversations = self.conversations.clone();

        Box::pin(async move {
            let mut result: Vec<ConversationData> =
                conversations.lock().values().cloned().collect();

            // Sort by updated_at descending
            result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

            Ok(result)
        })
    }

    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<ConversationData>>> {
        let conversations = self.conversations.clone();
        let id = id.to_string();

        Box::pin(async move { Ok(conversations.lock().get(&id).cloned()) })
    }

    fn save(&self, id: &str, data: ConversationData) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations = self.conversations.clone();
        let id = id.to_string();

        Box::pin(async move {
            conversations.lock().insert(id, data);
            Ok(())
        })
    }

    fn save_all(&self, data: Vec<ConversationData>) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations = self.conversations.clone();

        Box::pin(async move {
            let mut store = conversations.lock();
            for item in data {
                store.insert(item.id.clone(), item);
            }
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations = self.conversations.clone();
        let id = id.to_string();

        Box::pin(async move {
            conversations.lock().remove(&id);
            Ok(())
        })
    }
}
