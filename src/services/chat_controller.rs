//! Conversation send/stream controller
//!
//! Accepts a user-authored or workflow-generated message, appends it to the
//! selected conversation, issues the chat request and incrementally decodes
//! the streamed response into the conversation's message list. The in-flight
//! assistant message is the only one mutated in place: each decoded chunk
//! wholesale-replaces its content with the full accumulated text so far,
//! since chunk boundaries may split multibyte sequences.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Message, SharedChatStore, derived_name};
use crate::repositories::{ConversationData, ConversationRepository};

use super::cancellation::CancellationToken;
use super::chat_transport::{
    ByteStream, ChatError, ChatRequestBody, ChatResult, ChatTransport, Plugin, PluginEnvelope,
};
use super::message_queue::{MessageSink, PendingMessages};

/// Upper bound on outgoing message content, checked before any network call.
pub const MAX_MESSAGE_CHARS: usize = 120_000;

/// Client-side checks that block a message before it reaches the transport.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message content is empty")]
    EmptyMessage,

    #[error("Message content is too large ({chars} characters, max {max})")]
    ContentTooLarge { chars: usize, max: usize },

    #[error("Document '{name}' has not finished uploading")]
    UploadInProgress { name: String },
}

/// Terminal state of a single send invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Completed { text: String },
    Aborted,
    Failed { message: String },
}

/// Events emitted during a send, tagged with the conversation id so
/// subscribers can filter.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    StreamStarted {
        conversation_id: String,
        request_id: String,
    },
    AssistantUpdated {
        conversation_id: String,
        content: String,
    },
    Completed {
        conversation_id: String,
        text: String,
    },
    Aborted {
        conversation_id: String,
    },
    Failed {
        conversation_id: String,
        message: String,
    },
}

/// Callback invoked after a successful exchange with the plugin selection,
/// the request body that was sent and the final response text.
pub type PostSendHook = Box<dyn Fn(Option<&Plugin>, &ChatRequestBody, &str) + Send + Sync>;

/// Validate an outgoing message before any network interaction.
pub fn validate_outgoing(message: &Message) -> Result<(), ValidationError> {
    if message.content.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }

    let chars = message.content.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(ValidationError::ContentTooLarge {
            chars,
            max: MAX_MESSAGE_CHARS,
        });
    }

    if let Some(documents) = &message.documents {
        if let Some(pending) = documents.iter().find(|d| !d.is_ready()) {
            return Err(ValidationError::UploadInProgress {
                name: pending.name.clone(),
            });
        }
    }

    Ok(())
}

pub struct ChatController {
    store: SharedChatStore,
    transport: Arc<dyn ChatTransport>,
    repository: Arc<dyn ConversationRepository>,
    pending: PendingMessages,
    hooks: Mutex<Vec<PostSendHook>>,
    events: Option<UnboundedSender<ChatEvent>>,
    api_key: String,
    active_cancel: Mutex<Option<Arc<CancellationToken>>>,
}

impl ChatController {
    pub fn new(
        store: SharedChatStore,
        transport: Arc<dyn ChatTransport>,
        repository: Arc<dyn ConversationRepository>,
        pending: PendingMessages,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            repository,
            pending,
            hooks: Mutex::new(Vec::new()),
            events: None,
            api_key: api_key.into(),
            active_cancel: Mutex::new(None),
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<ChatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Register a post-processing callback invoked after each successful
    /// exchange.
    pub fn add_post_hook(&self, hook: PostSendHook) {
        self.hooks.lock().push(hook);
    }

    /// Cancel the in-flight send, if any. The stream loop observes the flag
    /// before its next chunk read.
    pub fn stop_streaming(&self) {
        if let Some(token) = self.active_cancel.lock().as_ref() {
            token.cancel();
        }
    }

    /// Send a message through the selected conversation.
    ///
    /// `delete_count` trailing messages are discarded before the new message
    /// is appended (supports "edit and resend"). With a plugin selected the
    /// response is parsed as one JSON envelope; otherwise the body is decoded
    /// incrementally. All failures are handled here: the returned outcome is
    /// terminal and nothing propagates.
    pub async fn send(
        &self,
        message: Message,
        delete_count: usize,
        plugin: Option<Plugin>,
        cancel: Arc<CancellationToken>,
    ) -> SendOutcome {
        if let Err(e) = validate_outgoing(&message) {
            let text = e.to_string();
            warn!(error = %text, "Rejected outgoing message");
            self.store.lock().last_error = Some(text.clone());
            return SendOutcome::Failed { message: text };
        }

        *self.active_cancel.lock() = Some(cancel.clone());
        let outcome = self.send_inner(message, delete_count, plugin, cancel).await;
        *self.active_cancel.lock() = None;
        outcome
    }

    async fn send_inner(
        &self,
        message: Message,
        delete_count: usize,
        plugin: Option<Plugin>,
        cancel: Arc<CancellationToken>,
    ) -> SendOutcome {
        let first_user_content = message.content.clone();

        let (conversation_id, should_rename, body) = {
            let mut store = self.store.lock();
            let Some(conversation) = store.selected_mut() else {
                return SendOutcome::Failed {
                    message: "No conversation selected".to_string(),
                };
            };

            conversation.truncate_and_append(delete_count, message);
            let should_rename = conversation.message_count() == 1;
            let conversation_id = conversation.id.clone();
            let body = ChatRequestBody {
                model: conversation.model_id.clone(),
                messages: conversation.messages.clone(),
                key: self.api_key.clone(),
                prompt: conversation.prompt.clone(),
                temperature: conversation.temperature,
            };

            store.loading = true;
            store.message_is_streaming = true;
            store.last_error = None;

            (conversation_id, should_rename, body)
        };

        let request_id = Uuid::new_v4().to_string();
        self.emit(ChatEvent::StreamStarted {
            conversation_id: conversation_id.clone(),
            request_id: request_id.clone(),
        });

        let stream = match self.transport.send(&request_id, &body).await {
            Ok(stream) => stream,
            Err(ChatError::Api { status, message }) => {
                warn!(status, message = %message, "Chat endpoint returned an error");
                {
                    let mut store = self.store.lock();
                    store.loading = false;
                    store.message_is_streaming = false;
                    store.last_error = Some(message.clone());
                }
                self.emit(ChatEvent::Failed {
                    conversation_id,
                    message: message.clone(),
                });
                return SendOutcome::Failed { message };
            }
            Err(e) => {
                warn!(error = %e, "Chat request could not be issued");
                let mut store = self.store.lock();
                store.loading = false;
                store.message_is_streaming = false;
                drop(store);
                return SendOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        if plugin.is_some() {
            return match self.read_plugin_answer(stream, &cancel).await {
                Ok(Some(answer)) => {
                    {
                        let mut store = self.store.lock();
                        store.loading = false;
                        if let Some(conversation) = store.get_mut(&conversation_id) {
                            conversation.push_assistant(answer.clone());
                        }
                    }
                    self.finish_success(
                        conversation_id,
                        should_rename,
                        &first_user_content,
                        plugin,
                        body,
                        answer,
                    )
                    .await
                }
                Ok(None) => self.handle_abort(&conversation_id, &request_id).await,
                Err(e) => {
                    warn!(error = %e, "Plugin response processing failed");
                    let mut store = self.store.lock();
                    store.loading = false;
                    store.message_is_streaming = false;
                    drop(store);
                    SendOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            };
        }

        self.stream_response(
            stream,
            conversation_id,
            request_id,
            should_rename,
            first_user_content,
            body,
            cancel,
        )
        .await
    }

    /// Incremental streaming path: accumulate raw bytes and re-decode the
    /// whole buffer after every chunk.
    #[allow(clippy::too_many_arguments)]
    async fn stream_response(
        &self,
        mut stream: ByteStream,
        conversation_id: String,
        request_id: String,
        should_rename: bool,
        first_user_content: String,
        body: ChatRequestBody,
        cancel: Arc<CancellationToken>,
    ) -> SendOutcome {
        let mut buffer: Vec<u8> = Vec::new();
        let mut first_chunk = true;

        loop {
            if cancel.is_cancelled() {
                return self.handle_abort(&conversation_id, &request_id).await;
            }

            match stream.next().await {
                None => break,
                Some(Ok(chunk)) => {
                    buffer.extend_from_slice(&chunk);
                    let text = String::from_utf8_lossy(&buffer).into_owned();
                    {
                        let mut store = self.store.lock();
                        if first_chunk {
                            store.loading = false;
                        }
                        if let Some(conversation) = store.get_mut(&conversation_id) {
                            if first_chunk {
                                conversation.push_assistant(text.clone());
                            } else {
                                conversation.replace_last_assistant_content(text.clone());
                            }
                        }
                    }
                    first_chunk = false;
                    self.emit(ChatEvent::AssistantUpdated {
                        conversation_id: conversation_id.clone(),
                        content: text,
                    });
                }
                Some(Err(e)) => {
                    // Partial content already applied stays visible; the
                    // interruption is logged but never alerted.
                    warn!(error = %e, "Stream interrupted, keeping partial response");
                    let mut store = self.store.lock();
                    store.loading = false;
                    store.message_is_streaming = false;
                    drop(store);
                    return SendOutcome::Failed {
                        message: e.to_string(),
                    };
                }
            }
        }

        let final_text = String::from_utf8_lossy(&buffer).into_owned();
        self.finish_success(
            conversation_id,
            should_rename,
            &first_user_content,
            None,
            body,
            final_text,
        )
        .await
    }

    /// Buffer the whole plugin-mode body and parse one `{answer}` envelope.
    /// Returns `Ok(None)` when the cancellation flag was observed first.
    async fn read_plugin_answer(
        &self,
        mut stream: ByteStream,
        cancel: &CancellationToken,
    ) -> ChatResult<Option<String>> {
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            match stream.next().await {
                None => break,
                Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
            }
        }

        let envelope: PluginEnvelope = serde_json::from_slice(&buffer)?;
        Ok(Some(envelope.answer))
    }

    /// User-initiated stop: kill server-side work, clear the pending queue
    /// (downstream workflow steps may assume context this turn never
    /// established) and leave partial content in place.
    async fn handle_abort(&self, conversation_id: &str, request_id: &str) -> SendOutcome {
        self.transport.kill(request_id).await;
        self.pending.lock().clear();

        {
            let mut store = self.store.lock();
            store.loading = false;
            store.message_is_streaming = false;
        }

        debug!(conversation_id, request_id, "Send aborted");
        self.emit(ChatEvent::Aborted {
            conversation_id: conversation_id.to_string(),
        });
        SendOutcome::Aborted
    }

    async fn finish_success(
        &self,
        conversation_id: String,
        should_rename: bool,
        first_user_content: &str,
        plugin: Option<Plugin>,
        body: ChatRequestBody,
        final_text: String,
    ) -> SendOutcome {
        {
            let mut store = self.store.lock();
            if should_rename {
                if let Some(conversation) = store.get_mut(&conversation_id) {
                    conversation.name = derived_name(first_user_content);
                }
            }
            store.loading = false;
            store.message_is_streaming = false;
        }

        {
            let hooks = self.hooks.lock();
            for hook in hooks.iter() {
                hook(plugin.as_ref(), &body, &final_text);
            }
        }

        self.persist(&conversation_id).await;

        self.emit(ChatEvent::Completed {
            conversation_id,
            text: final_text.clone(),
        });
        SendOutcome::Completed { text: final_text }
    }

    /// Fire-and-forget persistence of the updated conversation and the full
    /// list. Failures are logged, never surfaced mid-exchange.
    async fn persist(&self, conversation_id: &str) {
        let (one, all) = {
            let store = self.store.lock();
            let one = store.get(conversation_id).map(|c| c.to_data());
            let all: Vec<_> = store.conversations().iter().map(|c| c.to_data()).collect();
            (one, all)
        };

        match one {
            Some(Ok(data)) => {
                if let Err(e) = self.repository.save(conversation_id, data).await {
                    warn!(conversation_id, error = %e, "Failed to save conversation");
                }
            }
            Some(Err(e)) => warn!(conversation_id, error = %e, "Failed to serialize conversation"),
            None => {}
        }

        let list: Vec<ConversationData> = all.into_iter().filter_map(|r| r.ok()).collect();
        if let Err(e) = self.repository.save_all(list).await {
            warn!(error = %e, "Failed to save conversation list");
        }
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[async_trait::async_trait]
impl MessageSink for ChatController {
    async fn deliver(&self, message: Message) -> SendOutcome {
        self.send(message, 0, None, CancellationToken::new()).await
    }
}
