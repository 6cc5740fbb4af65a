use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

pub const DUPLICATE_MESSAGE: &str = "Email or username already exists";
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong.";

/// Every failure a request can end in. The `IntoResponse` impl is the single
/// place that turns these into status codes and client-facing messages.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", DUPLICATE_MESSAGE)]
    Duplicate,

    #[error("User not found.")]
    NotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Access denied.")]
    TokenMissing,

    #[error("Invalid token.")]
    TokenInvalid,

    /// `public` is what the client sees; `detail` only reaches the log.
    #[error("{public}: {detail:#}")]
    Unexpected {
        public: &'static str,
        detail: anyhow::Error,
    },
}

impl AppError {
    pub fn unexpected(public: &'static str, detail: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected {
            public,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Duplicate | AppError::TokenInvalid => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials | AppError::TokenMissing => StatusCode::UNAUTHORIZED,
            AppError::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            AppError::Unexpected { public, .. } => (*public).to_string(),
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::unexpected(GENERIC_FAILURE_MESSAGE, e)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        } else {
            warn!(error = %self, %status, "request rejected");
        }
        (
            status,
            Json(ErrorBody {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}

/// Handler for `CatchPanicLayer`: a panicking handler ends as a generic 500.
pub fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    AppError::unexpected(GENERIC_FAILURE_MESSAGE, anyhow::anyhow!("panic: {detail}"))
        .into_response()
}

pub type AppResult<T> = Result<T, AppError>;
