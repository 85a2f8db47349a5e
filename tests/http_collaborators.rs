//! HTTP collaborator tests: the chat transport and the file store against a
//! local mock server.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use amplify_chat::models::AttachedDocument;
use amplify_chat::services::attachment_service::{AttachmentError, FileStore, HttpFileStore};
use amplify_chat::services::chat_transport::{ChatError, ChatRequestBody, ChatTransport};
use amplify_chat::{CancellationToken, HttpChatTransport, Message};

fn request_body() -> ChatRequestBody {
    ChatRequestBody {
        model: "gpt-4".to_string(),
        messages: vec![Message::user("Hello")],
        key: "sk-test".to_string(),
        prompt: "You are helpful.".to_string(),
        temperature: 0.5,
    }
}

#[tokio::test]
async fn chat_transport_streams_response_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(header("x-request-id", "req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello from the model"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpChatTransport::new(format!("{}/chat", server.uri()), None);
    let mut stream = transport.send("req-1", &request_body()).await?;

    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    assert_eq!(String::from_utf8(buffer)?, "Hello from the model");
    Ok(())
}

#[tokio::test]
async fn chat_transport_surfaces_status_text_on_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let transport = HttpChatTransport::new(format!("{}/chat", server.uri()), None);
    let result = transport.send("req-1", &request_body()).await;

    match result {
        Err(ChatError::Api { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "Service Unavailable");
        }
        other => panic!("expected Api error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn chat_transport_kill_posts_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kill"))
        .and(body_json(serde_json::json!({ "request_id": "req-9" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport =
        HttpChatTransport::new("http://unused", Some(format!("{}/kill", server.uri())));
    transport.kill("req-9").await;
}

#[tokio::test]
async fn chat_transport_kill_without_endpoint_is_noop() {
    let transport = HttpChatTransport::new("http://unused", None);
    // Nothing to assert beyond not panicking and not hanging
    transport.kill("req-9").await;
}

#[tokio::test]
async fn file_store_upload_returns_ticket_and_reports_progress() -> Result<()> {
    let server = MockServer::start().await;
    let ticket = serde_json::json!({
        "key": "files/abc123",
        "status_url": format!("{}/status/abc123", server.uri()),
        "metadata_url": format!("{}/metadata/abc123", server.uri()),
    });
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpFileStore::new(server.uri());
    let document = AttachedDocument::new("report.pdf", "application/pdf");
    let last_progress = Arc::new(AtomicU8::new(0));
    let observer = last_progress.clone();

    let ticket = store
        .add_file(
            &document,
            vec![0u8; 1024],
            Arc::new(move |p| observer.store(p, Ordering::SeqCst)),
            CancellationToken::new(),
        )
        .await?;

    assert_eq!(ticket.key, "files/abc123");
    assert!(ticket.metadata_url.ends_with("/metadata/abc123"));
    assert_eq!(last_progress.load(Ordering::SeqCst), 100);
    Ok(())
}

#[tokio::test]
async fn file_store_upload_failure_carries_status_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(507))
        .mount(&server)
        .await;

    let store = HttpFileStore::new(server.uri());
    let document = AttachedDocument::new("report.pdf", "application/pdf");
    let result = store
        .add_file(
            &document,
            vec![1, 2, 3],
            Arc::new(|_| {}),
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(AttachmentError::Api { status, message }) => {
            assert_eq!(status, 507);
            assert_eq!(message, "Insufficient Storage");
        }
        other => panic!("expected Api error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn file_store_upload_aborts_without_sending_when_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = HttpFileStore::new(server.uri());
    let document = AttachedDocument::new("report.pdf", "application/pdf");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = store
        .add_file(&document, vec![0u8; 10_000], Arc::new(|_| {}), cancel)
        .await;

    assert!(matches!(result, Err(AttachmentError::Aborted)));
}

#[tokio::test]
async fn file_store_polls_until_ready() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/abc123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ready": false })),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/metadata/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ready": true,
            "metadata": { "total_items": 12, "page_count": 3, "is_image": false }
        })))
        .mount(&server)
        .await;

    let store = HttpFileStore::new(server.uri()).with_poll_interval(Duration::from_millis(5));
    let metadata = store
        .check_content_ready(
            &format!("{}/metadata/abc123", server.uri()),
            10,
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(metadata.total_items, 12);
    assert_eq!(metadata.page_count, Some(3));
    Ok(())
}

#[tokio::test]
async fn file_store_poll_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/abc123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ready": false })),
        )
        .expect(3)
        .mount(&server)
        .await;

    let store = HttpFileStore::new(server.uri()).with_poll_interval(Duration::from_millis(2));
    let result = store
        .check_content_ready(
            &format!("{}/metadata/abc123", server.uri()),
            3,
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(AttachmentError::NotReady { attempts: 3 })
    ));
}

#[tokio::test]
async fn file_store_poll_returns_promptly_after_last_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/abc123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ready": false })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpFileStore::new(server.uri()).with_poll_interval(Duration::from_secs(2));
    let started = std::time::Instant::now();
    let result = store
        .check_content_ready(
            &format!("{}/metadata/abc123", server.uri()),
            1,
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(AttachmentError::NotReady { attempts: 1 })
    ));
    // No sleep after the final attempt
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn file_store_poll_stops_when_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/abc123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ready": false })),
        )
        .expect(0)
        .mount(&server)
        .await;

    let store = HttpFileStore::new(server.uri());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = store
        .check_content_ready(&format!("{}/metadata/abc123", server.uri()), 10, &cancel)
        .await;

    assert!(matches!(result, Err(AttachmentError::Aborted)));
}

#[tokio::test]
async fn file_store_delete_targets_key() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/files/files-abc123"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpFileStore::new(server.uri());
    store.delete_file("files-abc123").await?;
    Ok(())
}
