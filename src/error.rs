//! Request-level errors and their HTTP mapping
//!
//! Only configuration and generation failures reach the user. Cache and
//! persistence failures are absorbed where they happen.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::GenerationError;

#[derive(Debug, Error)]
pub enum ChatError {
    /// A required credential is missing
    #[error("Server Configuration Error")]
    Configuration(String),

    /// Empty or malformed submission; nothing was touched
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Generation(#[from] GenerationError),

    #[error("Request body too large")]
    PayloadTooLarge,
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

/// `{ "error": "..." }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        if let ChatError::Configuration(detail) = &self {
            tracing::error!(%detail, "configuration error");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
