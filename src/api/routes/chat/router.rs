//! Router for the chat API

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post},
};
use axum_extra::extract::Query;
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::public;
use crate::api::auth::AuthUser;
use crate::api::public::ApiError;
use crate::api::state::SharedState;
use crate::chat::{
    NDJSON_CONTENT_TYPE, StreamEvent, prepare_turn, run_blocking_turn, spawn_streaming_turn,
};
use crate::history::service;
use crate::retrieval::OpenAiEmbedder;

const DEFAULT_PAGE_LIMIT: usize = 20;
const MAX_PAGE_LIMIT: usize = 100;

/// Get the transcript of a single chat session
async fn chat_session(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<axum::Json<public::ChatTranscriptResponse>, ApiError> {
    let history = Arc::clone(&state.read().expect("Unable to read share state").history);
    let transcript = service::transcript(history.as_ref(), &session_id, user.as_deref()).await?;
    let session = history.session(&session_id).await?;

    Ok(axum::Json(public::ChatTranscriptResponse {
        session_id,
        session,
        transcript,
    }))
}

/// Get a page of the chat sessions visible to the caller
async fn chat_list(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Query(params): Query<public::ChatSessionsQuery>,
) -> Result<axum::Json<public::ChatSessionsResponse>, ApiError> {
    let history = Arc::clone(&state.read().expect("Unable to read share state").history);
    let page = params.page.unwrap_or(1).max(1);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let (sessions, total_sessions) =
        service::list_sessions(history.as_ref(), user.as_deref(), page, limit).await?;
    let total_pages = (total_sessions as f64 / limit as f64).ceil() as i64;

    Ok(axum::Json(public::ChatSessionsResponse {
        sessions,
        page,
        limit,
        total_sessions,
        total_pages,
    }))
}

/// Delete a chat session and all of its messages
async fn chat_session_delete(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let history = Arc::clone(&state.read().expect("Unable to read share state").history);
    service::delete_session(history.as_ref(), &session_id, user.as_deref()).await?;
    tracing::info!("Deleted session {}", session_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a single message from a chat session
async fn chat_message_delete(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path((session_id, message_id)): Path<(String, String)>,
) -> Result<axum::Json<public::DeleteMessageResponse>, ApiError> {
    let history = Arc::clone(&state.read().expect("Unable to read share state").history);
    let deleted =
        service::delete_message(history.as_ref(), &session_id, &message_id, user.as_deref())
            .await?;

    Ok(axum::Json(public::DeleteMessageResponse {
        session_id,
        deleted,
    }))
}

/// Ask a question in a session. The answer is streamed as NDJSON
/// unless the request opts out with `"stream": false`.
async fn chat_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    axum::Json(payload): axum::Json<public::ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (db, config, history) = {
        let shared_state = state.read().expect("Unable to read share state");
        (
            shared_state.db.clone(),
            shared_state.config.clone(),
            Arc::clone(&shared_state.history),
        )
    };
    let embedder = OpenAiEmbedder::from_config(&config);

    let turn = prepare_turn(
        history.as_ref(),
        &db,
        &embedder,
        &config,
        &payload,
        user.as_deref(),
    )
    .await?;
    tracing::debug!(
        "Chat turn for session {} with {} source(s)",
        turn.session_id,
        turn.data_points.len()
    );

    if !payload.stream {
        let resp = run_blocking_turn(history.as_ref(), &config, turn).await?;
        return Ok(axum::Json(resp).into_response());
    }

    let (tx, rx) = mpsc::unbounded_channel::<StreamEvent>();
    spawn_streaming_turn(history, config, turn, tx);

    let ndjson_stream = UnboundedReceiverStream::new(rx)
        .map(|event| Ok::<String, Infallible>(event.to_ndjson_line()));

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(ndjson_stream),
    )
        .into_response())
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(chat_handler))
        .route("/sessions", get(chat_list))
        .route("/{session_id}", get(chat_session).delete(chat_session_delete))
        .route("/{session_id}/messages/{message_id}", delete(chat_message_delete))
}
