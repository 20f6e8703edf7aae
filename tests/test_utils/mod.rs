//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, RwLock};

use axum::{Router, body::Body};
use tokio_rusqlite::Connection;

use ragchat::api::AppState;
use ragchat::api::app;
use ragchat::chat::{NdjsonDecoder, StreamEvent};
use ragchat::core::db::async_db_in_memory;
use ragchat::core::{AppConfig, HistoryBackend};
use ragchat::history::open_history_store;

pub const AUTH_HEADER: &str = "x-ms-client-principal-id";

/// Config for a test app that sends every model and embedding request
/// to `llm_url`.
pub fn test_config(llm_url: &str) -> AppConfig {
    AppConfig {
        storage_path: String::from("."),
        db_path: String::from("./db"),
        history_backend: HistoryBackend::Sqlite,
        history_path: String::from("./history"),
        openai_api_hostname: llm_url.to_string(),
        openai_api_key: String::from("test-api-key"),
        openai_model: String::from("gpt-4o"),
        embedding_model: String::from("text-embedding-3-small"),
        system_message: String::from("You are a helpful assistant."),
        retrieval_top_k: 3,
        max_history_messages: 20,
        require_auth: false,
        auth_header: String::from(AUTH_HEADER),
    }
}

pub async fn test_app_with_db(config: AppConfig, db: Connection) -> Router {
    let history = open_history_store(&config, &db)
        .await
        .expect("Failed to open history store");
    let app_state = AppState::new(db, config, history);
    app(Arc::new(RwLock::new(app_state)))
}

pub async fn test_app_with_config(config: AppConfig) -> Router {
    let db = async_db_in_memory()
        .await
        .expect("Failed to connect to async db");
    test_app_with_db(config, db).await
}

/// Creates a test application router backed by an in-memory database.
pub async fn test_app(llm_url: &str) -> Router {
    test_app_with_config(test_config(llm_url)).await
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not utf8")
}

pub fn parse_ndjson(body: &str) -> Vec<StreamEvent> {
    let mut decoder = NdjsonDecoder::new();
    let mut events = decoder.push(body.as_bytes()).expect("Invalid NDJSON");
    events.extend(decoder.finish().expect("Invalid NDJSON"));
    events
}

/// A chat completions SSE body that streams `fragments` in order.
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::from(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":null},\"finish_reason\":null}]}\n\n",
    );
    for fragment in fragments {
        let chunk = serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": fragment}, "finish_reason": null}]
        });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

pub async fn mock_completion_stream(
    server: &mut mockito::ServerGuard,
    fragments: &[&str],
) -> mockito::Mock {
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(fragments))
        .create_async()
        .await
}
