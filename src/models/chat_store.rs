use std::sync::Arc;

use parking_lot::Mutex;

use super::conversation::Conversation;

/// Shared application state for the chat session.
///
/// Replaces ambient context lookup with an explicit struct passed by
/// reference; each field has a single writer (the active send operation,
/// serialized by the message queue).
pub struct ChatStore {
    conversations: Vec<Conversation>,
    selected_id: Option<String>,
    pub loading: bool,
    pub message_is_streaming: bool,
    pub last_error: Option<String>,
}

/// Handle shared between the controller, the queue dispatcher and the UI.
pub type SharedChatStore = Arc<Mutex<ChatStore>>;

impl ChatStore {
    pub fn new() -> Self {
        Self {
            conversations: Vec::new(),
            selected_id: None,
            loading: false,
            message_is_streaming: false,
            last_error: None,
        }
    }

    pub fn shared() -> SharedChatStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Add a conversation and select it.
    pub fn add_conversation(&mut self, conversation: Conversation) {
        self.selected_id = Some(conversation.id.clone());
        self.conversations.push(conversation);
    }

    pub fn select(&mut self, id: &str) -> bool {
        if self.conversations.iter().any(|c| c.id == id) {
            self.selected_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    pub fn selected(&self) -> Option<&Conversation> {
        let id = self.selected_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn selected_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.selected_id.clone()?;
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn delete_conversation(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.selected_id.as_deref() == Some(id) {
            self.selected_id = self.conversations.first().map(|c| c.id.clone());
        }
        self.conversations.len() != before
    }

    pub fn count(&self) -> usize {
        self.conversations.len()
    }

    /// Take and clear the last user-visible error.
    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_selects_conversation() {
        let mut store = ChatStore::new();
        let conv = Conversation::new("gpt-4", "", 0.5);
        let id = conv.id.clone();
        store.add_conversation(conv);

        assert_eq!(store.selected_id(), Some(id.as_str()));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_select_unknown_id_fails() {
        let mut store = ChatStore::new();
        assert!(!store.select("missing"));
        assert!(store.selected().is_none());
    }

    #[test]
    fn test_delete_switches_selection() {
        let mut store = ChatStore::new();
        let first = Conversation::new("gpt-4", "", 0.5);
        let second = Conversation::new("gpt-4", "", 0.5);
        let first_id = first.id.clone();
        let second_id = second.id.clone();
        store.add_conversation(first);
        store.add_conversation(second);

        assert!(store.delete_conversation(&second_id));
        assert_eq!(store.selected_id(), Some(first_id.as_str()));
    }

    #[test]
    fn test_take_error_clears_it() {
        let mut store = ChatStore::new();
        store.last_error = Some("Bad Gateway".to_string());
        assert_eq!(store.take_error(), Some("Bad Gateway".to_string()));
        assert!(store.last_error.is_none());
    }
}
