pub mod attachment_service;
pub mod cancellation;
pub mod chat_controller;
pub mod chat_transport;
pub mod message_queue;

pub use attachment_service::{AttachmentEvent, AttachmentPipeline, FileStore, HttpFileStore};
pub use cancellation::CancellationToken;
pub use chat_controller::{ChatController, ChatEvent, SendOutcome};
pub use chat_transport::{ChatTransport, HttpChatTransport, Plugin};
pub use message_queue::{MessageQueue, MessageSink};
