//! Document attachment pipeline
//!
//! Handles file attachment end to end: name/MIME hygiene, upload with
//! progress, server-side readiness polling and abort/cleanup. Produces an
//! [`AttachedDocument`] handle the controller folds into outgoing messages.
//! Independent uploads run fully in parallel, each with its own
//! cancellation token; chat and upload cancellation domains never interact.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::models::attachment::{
    AttachedDocument, DocumentMetadata, normalize_mime_type, sanitize_file_name,
};

use super::cancellation::CancellationToken;

/// Reported upload progress never exceeds this before server-side
/// processing confirms readiness; the final 5% is reserved for the
/// readiness-confirmation step.
pub const UPLOAD_PROGRESS_CAP: u8 = 95;

/// Bounded readiness-poll attempt count (no wall-clock timeout).
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

/// Grace window before best-effort server-side cleanup of a failed upload,
/// long enough for a late-arriving completion signal to win the latch.
pub const DEFAULT_CLEANUP_GRACE: Duration = Duration::from_secs(45);

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Document processing did not complete after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("Upload aborted")]
    Aborted,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

/// Events emitted by the pipeline, tagged with the document id.
/// `Failed` is the UI's blocking alert; `Warning` is advisory.
#[derive(Debug, Clone)]
pub enum AttachmentEvent {
    /// Placeholder document emitted before the upload starts so the UI can
    /// render the pending attachment.
    Attached(AttachedDocument),
    KeySet {
        document_id: String,
        key: String,
    },
    MetadataSet {
        document_id: String,
        metadata: DocumentMetadata,
    },
    ProgressUpdated {
        document_id: String,
        progress: u8,
    },
    Warning {
        document_id: String,
        message: String,
    },
    Failed {
        document_id: String,
        message: String,
    },
}

/// Handle returned by the storage backend once an upload is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTicket {
    pub key: String,
    pub status_url: String,
    pub metadata_url: String,
}

#[derive(Debug, Deserialize)]
struct ReadyResponse {
    ready: bool,
    metadata: Option<DocumentMetadata>,
}

pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Storage backend seam: upload, readiness polling, deletion.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Upload the document body, reporting progress per chunk and observing
    /// `cancel` between chunks so an abort stops the transfer mid-flight.
    async fn add_file(
        &self,
        document: &AttachedDocument,
        contents: Vec<u8>,
        on_progress: ProgressFn,
        cancel: Arc<CancellationToken>,
    ) -> AttachmentResult<UploadTicket>;

    /// Poll the metadata endpoint until extraction completes, up to
    /// `max_attempts` times, observing `cancel` between attempts.
    async fn check_content_ready(
        &self,
        metadata_url: &str,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> AttachmentResult<DocumentMetadata>;

    async fn delete_file(&self, key: &str) -> AttachmentResult<()>;
}

/// reqwest-backed file storage client.
pub struct HttpFileStore {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpFileStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl FileStore for HttpFileStore {
    async fn add_file(
        &self,
        document: &AttachedDocument,
        contents: Vec<u8>,
        on_progress: ProgressFn,
        cancel: Arc<CancellationToken>,
    ) -> AttachmentResult<UploadTicket> {
        if cancel.is_cancelled() {
            return Err(AttachmentError::Aborted);
        }

        let total = contents.len();
        let divisor = total.max(1);
        let sent = Arc::new(AtomicUsize::new(0));

        let chunks: Vec<Vec<u8>> = contents
            .chunks(UPLOAD_CHUNK_BYTES)
            .map(|c| c.to_vec())
            .collect();

        let counter = sent.clone();
        let progress = on_progress.clone();
        let token = cancel.clone();
        let body_stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            if token.is_cancelled() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "upload aborted",
                ));
            }
            let done = counter.fetch_add(chunk.len(), Ordering::Relaxed) + chunk.len();
            progress(((done * 100) / divisor) as u8);
            Ok(chunk)
        }));

        let part =
            reqwest::multipart::Part::stream_with_length(
                reqwest::Body::wrap_stream(body_stream),
                total as u64,
            )
            .file_name(document.name.clone())
            .mime_str(&document.mime_type)?;

        let form = reqwest::multipart::Form::new()
            .text("document", serde_json::to_string(document)?)
            .part("file", part);

        let response = match self
            .client
            .post(format!("{}/files", self.base_url))
            .multipart(form)
            .send()
            .await
        {
            Ok(response) => response,
            // A chunk-level abort surfaces as a body error on send
            Err(_) if cancel.is_cancelled() => return Err(AttachmentError::Aborted),
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AttachmentError::Api {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Upload failed")
                    .to_string(),
            });
        }

        Ok(response.json::<UploadTicket>().await?)
    }

    async fn check_content_ready(
        &self,
        metadata_url: &str,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> AttachmentResult<DocumentMetadata> {
        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(AttachmentError::Aborted);
            }

            let response = self.client.get(metadata_url).send().await?;
            if response.status().is_success() {
                let body: ReadyResponse = response.json().await?;
                if body.ready {
                    if let Some(metadata) = body.metadata {
                        return Ok(metadata);
                    }
                }
            } else {
                debug!(status = %response.status(), attempt, "Document not ready yet");
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(AttachmentError::NotReady {
            attempts: max_attempts,
        })
    }

    async fn delete_file(&self, key: &str) -> AttachmentResult<()> {
        let response = self
            .client
            .delete(format!("{}/files/{}", self.base_url, key))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttachmentError::Api {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Delete failed")
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Orchestrates the attach flow described in the module docs.
pub struct AttachmentPipeline {
    store: Arc<dyn FileStore>,
    events: UnboundedSender<AttachmentEvent>,
    uploads_enabled: bool,
    max_poll_attempts: u32,
    cleanup_grace: Duration,
}

impl AttachmentPipeline {
    pub fn new(
        store: Arc<dyn FileStore>,
        events: UnboundedSender<AttachmentEvent>,
        uploads_enabled: bool,
    ) -> Self {
        Self {
            store,
            events,
            uploads_enabled,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            cleanup_grace: DEFAULT_CLEANUP_GRACE,
        }
    }

    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    pub fn with_cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace = grace;
        self
    }

    /// Attach a selected file: normalize, upload, poll until the document is
    /// usable. On failure the user is alerted (unless aborted) and the
    /// partially uploaded object is cleaned up after the grace window.
    pub async fn attach(
        &self,
        file_name: &str,
        reported_mime: &str,
        contents: Vec<u8>,
        cancel: Arc<CancellationToken>,
    ) -> AttachmentResult<AttachedDocument> {
        let name = sanitize_file_name(file_name);
        let mime_type = normalize_mime_type(file_name, reported_mime);
        let mut document = AttachedDocument::new(name, mime_type);

        // Placeholder first, so the pending attachment renders immediately
        self.emit(AttachmentEvent::Attached(document.clone()));

        if !self.uploads_enabled {
            document.raw_content = Some(String::from_utf8_lossy(&contents).into_owned());
            document.progress = 100;
            self.emit(AttachmentEvent::ProgressUpdated {
                document_id: document.id.clone(),
                progress: 100,
            });
            return Ok(document);
        }

        let on_progress = self.capped_progress(&document.id);

        let ticket = match self
            .store
            .add_file(&document, contents, on_progress, cancel.clone())
            .await
        {
            Ok(ticket) => ticket,
            Err(e) => {
                let aborted =
                    matches!(e, AttachmentError::Aborted) || cancel.is_cancelled();
                if !aborted {
                    self.emit(AttachmentEvent::Failed {
                        document_id: document.id.clone(),
                        message: e.to_string(),
                    });
                }
                warn!(document = %document.name, error = %e, aborted, "Upload failed");
                return Err(e);
            }
        };

        document.key = Some(ticket.key.clone());
        self.emit(AttachmentEvent::KeySet {
            document_id: document.id.clone(),
            key: ticket.key.clone(),
        });

        match self
            .store
            .check_content_ready(&ticket.metadata_url, self.max_poll_attempts, cancel.as_ref())
            .await
        {
            Ok(metadata) => {
                if !metadata.is_image && metadata.total_items == 0 {
                    self.emit(AttachmentEvent::Warning {
                        document_id: document.id.clone(),
                        message: format!(
                            "No text could be extracted from '{}'; it may be scanned or unreadable",
                            document.name
                        ),
                    });
                }

                document.metadata = Some(metadata.clone());
                self.emit(AttachmentEvent::MetadataSet {
                    document_id: document.id.clone(),
                    metadata,
                });

                document.progress = 100;
                self.emit(AttachmentEvent::ProgressUpdated {
                    document_id: document.id.clone(),
                    progress: 100,
                });

                // Consume the latch: a cleanup scheduled by a racing failure
                // path must not delete a document that completed.
                cancel.try_release();
                Ok(document)
            }
            Err(e) => {
                let aborted =
                    matches!(e, AttachmentError::Aborted) || cancel.is_cancelled();
                if !aborted {
                    self.emit(AttachmentEvent::Failed {
                        document_id: document.id.clone(),
                        message: e.to_string(),
                    });
                }
                warn!(document = %document.name, error = %e, aborted, "Readiness check failed");
                self.schedule_cleanup(ticket.key, cancel);
                Err(e)
            }
        }
    }

    /// Progress callback that caps reported values at
    /// [`UPLOAD_PROGRESS_CAP`] and keeps them monotonically non-decreasing.
    fn capped_progress(&self, document_id: &str) -> ProgressFn {
        let last = Arc::new(AtomicU8::new(0));
        let events = self.events.clone();
        let document_id = document_id.to_string();

        Arc::new(move |raw: u8| {
            let capped = raw.min(UPLOAD_PROGRESS_CAP);
            if capped > last.load(Ordering::Relaxed) {
                last.store(capped, Ordering::Relaxed);
                let _ = events.send(AttachmentEvent::ProgressUpdated {
                    document_id: document_id.clone(),
                    progress: capped,
                });
            }
        })
    }

    /// Best-effort server-side cleanup after the grace window. The token's
    /// one-shot release latch prevents a double delete.
    fn schedule_cleanup(&self, key: String, cancel: Arc<CancellationToken>) {
        let store = self.store.clone();
        let grace = self.cleanup_grace;

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if !cancel.try_release() {
                return;
            }
            match store.delete_file(&key).await {
                Ok(()) => debug!(key = %key, "Cleaned up orphaned attachment"),
                Err(e) => warn!(key = %key, error = %e, "Deferred attachment cleanup failed"),
            }
        });
    }

    fn emit(&self, event: AttachmentEvent) {
        let _ = self.events.send(event);
    }
}
