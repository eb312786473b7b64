use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session store error: {0}")]
    SessionStore(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Database(_) | AppError::SessionStore(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Failures of a single call to the generation service
///
/// These never reach HTTP clients: the recommender degrades to fallback content
/// instead.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// No credentials configured; checked before any attempt is made
    #[error("Generation service is not configured")]
    NotConfigured,

    /// Network failure, timeout, non-2xx status or an unusable response body
    #[error("Generation transport error: {0}")]
    Transport(String),

    /// The originating request went away
    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Only transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::Transport(_))
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Transport(format!("request timed out: {}", e))
        } else {
            GenerationError::Transport(e.to_string())
        }
    }
}

/// Model text could not be recovered as a JSON array
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("No JSON array found in model response")]
    MissingArray,

    #[error("Malformed JSON array in model response: {0}")]
    InvalidJson(String),
}
