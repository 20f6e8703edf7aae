//! Router for inspecting the document index

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use axum_extra::extract::Query;

use super::public;
use crate::api::public::ApiError;
use crate::api::state::SharedState;
use crate::retrieval::{OpenAiEmbedder, document_count, search_documents};

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 50;

/// Run a retrieval query the same way a chat turn does
async fn search(
    State(state): State<SharedState>,
    Query(params): Query<public::SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if params.query.trim().is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Query must not be empty").into_response());
    }

    let (db, embedder) = {
        let shared_state = state.read().expect("Unable to read share state");
        (
            shared_state.db.clone(),
            OpenAiEmbedder::from_config(&shared_state.config),
        )
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let documents = search_documents(&db, &embedder, &params.query, limit).await?;

    Ok(axum::Json(public::SearchResponse {
        query: params.query,
        documents,
    })
    .into_response())
}

async fn count(
    State(state): State<SharedState>,
) -> Result<axum::Json<public::CountResponse>, ApiError> {
    let db = state.read().expect("Unable to read share state").db.clone();
    let count = document_count(&db).await?;
    Ok(axum::Json(public::CountResponse { count }))
}

/// Create the documents router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/search", get(search))
        .route("/count", get(count))
}
