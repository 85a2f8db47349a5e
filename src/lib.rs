//! Amplify chat core
//!
//! Conversation send/stream handling, sequential message dispatch and the
//! document attachment pipeline behind the Amplify chat client. The UI layer
//! subscribes to the event channels exposed here; everything network-facing
//! sits behind the [`ChatTransport`](services::ChatTransport) and
//! [`FileStore`](services::FileStore) seams.

pub mod config;
pub mod models;
pub mod repositories;
pub mod services;
pub mod telemetry;

pub use config::AmplifyConfig;
pub use models::{AttachedDocument, ChatStore, Conversation, Message};
pub use services::{
    AttachmentPipeline, CancellationToken, ChatController, HttpChatTransport, HttpFileStore,
    MessageQueue,
};
