pub mod attachment;
pub mod chat_store;
pub mod conversation;

pub use attachment::{
    AttachedDocument, DocumentMetadata, normalize_mime_type, sanitize_file_name,
};
pub use chat_store::{ChatStore, SharedChatStore};
pub use conversation::{
    Conversation, DEFAULT_CONVERSATION_NAME, MAX_DERIVED_NAME_CHARS, Message, MessageType, Role,
    derived_name,
};
