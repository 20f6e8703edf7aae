//! API routes module

pub mod chat;
pub mod documents;

use axum::Router;

use crate::api::state::SharedState;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Chat and history routes
        .nest("/chat", chat::router())
        // Retrieval routes
        .nest("/documents", documents::router())
}
