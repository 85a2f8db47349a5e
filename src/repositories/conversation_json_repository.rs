use std::path::PathBuf;

use super::conversation_repository::{BoxFuture, ConversationData, ConversationRepository};
use super::error::{RepositoryError, RepositoryResult};

/// JSON file-based repository for conversations.
/// Stores each conversation as a separate file in `<config_dir>/amplify/conversations/`.
pub struct ConversationJsonRepository {
    conversations_dir: PathBuf,
}

impl ConversationJsonRepository {
    pub fn new() -> RepositoryResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RepositoryError::InitializationError {
                message: "Could not determine config directory".to_string(),
            })?
            .join("amplify")
            .join("conversations");

        Ok(Self {
            conversations_dir: config_dir,
        })
    }

    /// Use an explicit directory instead of the platform config dir.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            conversations_dir: dir.into(),
        }
    }

    fn conversation_path(&self, id: &str) -> PathBuf {
        self.conversations_dir.join(format!("{}.json", id))
    }

    fn write_one(dir: &PathBuf, path: &PathBuf, data: &ConversationData) -> RepositoryResult<()> {
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(data)?;

        // Write atomically: temp file, then rename
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    fn join_err(e: tokio::task::JoinError) -> RepositoryError {
        RepositoryError::TaskError {
            message: e.to_string(),
        }
    }
}

impl ConversationRepository for ConversationJsonRepository {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<ConversationData>>> {
        let conversations_dir = self.conversations_dir.clone();

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                std::fs::create_dir_all(&conversations_dir)?;

                let mut conversations = Vec::new();

                for entry in std::fs::read_dir(&conversations_dir)? {
                    let entry = entry?;
                    let path = entry.path();

                    if path.extension().and_then(|s| s.to_str()) == Some("json") {
                        let content = std::fs::read_to_string(&path)?;
                        let data: ConversationData = serde_json::from_str(&content)?;
                        conversations.push(data);
                    }
                }

                // Sort by updated_at descending
                conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

                Ok(conversations)
            })
            .await
            .map_err(Self::join_err)?
        })
    }

    fn load_one(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<ConversationData>>> {
        let path = self.conversation_path(id);

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                if !path.exists() {
                    return Ok(None);
                }
                let content = std::fs::read_to_string(&path)?;
                let data: ConversationData = serde_json::from_str(&content)?;
                Ok(Some(data))
            })
            .await
            .map_err(Self::join_err)?
        })
    }

    fn save(&self, id: &str, data: ConversationData) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.conversation_path(id);
        let conversations_dir = self.conversations_dir.clone();

        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::write_one(&conversations_dir, &path, &data))
                .await
                .map_err(Self::join_err)?
        })
    }

    fn save_all(&self, data: Vec<ConversationData>) -> BoxFuture<'static, RepositoryResult<()>> {
        let conversations_dir = self.conversations_dir.clone();
        let paths: Vec<PathBuf> = data
            .iter()
            .map(|d| self.conversation_path(&d.id))
            .collect();

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                for (path, item) in paths.iter().zip(data.iter()) {
                    Self::write_one(&conversations_dir, path, item)?;
                }
                Ok(())
            })
            .await
            .map_err(Self::join_err)?
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.conversation_path(id);

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(())
            })
            .await
            .map_err(Self::join_err)?
        })
    }
}
