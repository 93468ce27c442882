//! HTTP-layer error mapping (`spec.md §7`: "HTTP handlers convert only
//! engine-level fatal conditions (bootstrap failure, malformed body) into HTTP
//! errors"). Everything a node can recover from stays inside
//! [`hearth_workflow::RetrievalState`] and never reaches this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors the HTTP layer itself can raise.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request body was malformed or missing a required field.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// No `USER:` turn could be found in a meta-task-wrapped payload.
    #[error("could not extract a user message: {0}")]
    UnparsableConversation(String),

    /// Startup/bootstrap failed (e.g. embedding dimension mismatch).
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) | Self::UnparsableConversation(_) => StatusCode::BAD_REQUEST,
            Self::Bootstrap(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
