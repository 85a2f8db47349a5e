//! Application configuration
//!
//! Loaded from `<config_dir>/amplify/config.json`. Missing file or
//! unreadable contents fall back to defaults so a fresh install starts
//! without setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::attachment_service::DEFAULT_MAX_POLL_ATTEMPTS;

fn default_chat_endpoint() -> String {
    "http://localhost:8080/api/chat".to_string()
}

fn default_file_store_endpoint() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_temperature() -> f32 {
    0.5
}

fn default_model_id() -> String {
    "gpt-4".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_poll_attempts() -> u32 {
    DEFAULT_MAX_POLL_ATTEMPTS
}

fn default_cleanup_grace_secs() -> u64 {
    45
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmplifyConfig {
    #[serde(default = "default_chat_endpoint")]
    pub chat_endpoint: String,

    /// Optional request-kill side channel; absent means aborts are
    /// client-side only.
    #[serde(default)]
    pub kill_endpoint: Option<String>,

    #[serde(default = "default_file_store_endpoint")]
    pub file_store_endpoint: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    #[serde(default = "default_model_id")]
    pub default_model_id: String,

    #[serde(default)]
    pub default_prompt: String,

    /// When false, attachments keep their raw text locally instead of
    /// uploading to the file store.
    #[serde(default = "default_true")]
    pub upload_documents: bool,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    #[serde(default = "default_cleanup_grace_secs")]
    pub cleanup_grace_secs: u64,
}

impl Default for AmplifyConfig {
    fn default() -> Self {
        Self {
            chat_endpoint: default_chat_endpoint(),
            kill_endpoint: None,
            file_store_endpoint: default_file_store_endpoint(),
            api_key: String::new(),
            default_temperature: default_temperature(),
            default_model_id: default_model_id(),
            default_prompt: String::new(),
            upload_documents: true,
            max_poll_attempts: default_max_poll_attempts(),
            cleanup_grace_secs: default_cleanup_grace_secs(),
        }
    }
}

impl AmplifyConfig {
    pub fn config_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("amplify").join("config.json"))
    }

    /// Load from the platform config dir, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            warn!("Could not determine config directory, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &PathBuf) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AmplifyConfig::default();
        assert!(config.upload_documents);
        assert_eq!(config.max_poll_attempts, 120);
        assert_eq!(config.cleanup_grace_secs, 45);
        assert!(config.kill_endpoint.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AmplifyConfig =
            serde_json::from_str(r#"{"api_key": "sk-test", "upload_documents": false}"#).unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert!(!config.upload_documents);
        assert_eq!(config.default_model_id, "gpt-4");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AmplifyConfig::load_from(&dir.path().join("config.json"));
        assert_eq!(config.default_temperature, 0.5);
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let config = AmplifyConfig::load_from(&path);
        assert_eq!(config.chat_endpoint, "http://localhost:8080/api/chat");
    }
}
