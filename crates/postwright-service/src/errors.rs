use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::jobs::SchedulingError;
use crate::validation::ValidationError;

/// Failure to turn a URL into article text.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ValidationError),

    #[error("Failed to fetch URL: {0}")]
    Request(String),

    #[error("Failed to fetch URL: HTTP {0}")]
    Status(u16),

    #[error("No readable content found on the page")]
    EmptyContent,
}

/// Failure of a text, prompt or image generation call.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation service returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Generated content is not in the expected format: {0}")]
    Malformed(String),

    #[error("No image was generated")]
    NoImage,
}

/// Failure to persist image bytes in the blob store.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to upload image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to upload image: {0}")]
    Request(String),

    #[error("Blob store returned HTTP {0}")]
    Status(u16),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("{0}")]
    FetchError(#[from] FetchError),

    #[error("Failed to generate content: {0}")]
    GenerationError(#[from] GenerationError),

    #[error("{0}")]
    UploadError(#[from] UploadError),

    #[error("Could not schedule image generation: {0}")]
    SchedulingError(#[from] SchedulingError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),

    #[error("Not found")]
    NotFound,

    #[error("Internal server error")]
    InternalError,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::FetchError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::GenerationError(_) | ApiError::UploadError(_) => StatusCode::BAD_GATEWAY,
            ApiError::SchedulingError(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DatabaseError(_) | ApiError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the submitting user.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::DatabaseError(err) => {
                // Log the detailed error but don't expose it to the client
                error!(error = %err, "Database error occurred");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.public_message()
        }));

        (status, body).into_response()
    }
}
