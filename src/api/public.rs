//! Public API types

use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crate::core::ChatError;

// Errors

pub struct ApiError(anyhow::Error);

/// Convert `ApiError` into an Axum compatible response. Domain errors
/// keep their status code, anything else is a 500.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0.downcast_ref::<ChatError>() {
            Some(err) => {
                tracing::warn!("{}", err);
                (err.status_code(), err.to_string()).into_response()
            }
            None => {
                // Always log the error
                tracing::error!("{}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Something went wrong: {}", self.0),
                )
                    .into_response()
            }
        }
    }
}

/// Enables using `?` on functions that return `Result<_,
/// anyhow::Error>` to turn them into `Result<_, ApiError>`
impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

// Re-export public types from each route

pub mod chat {
    pub use crate::api::routes::chat::public::*;
}

pub mod documents {
    pub use crate::api::routes::documents::public::*;
}
