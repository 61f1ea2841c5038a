use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;

/// Whether 5xx responses carry the underlying error detail. Set once at
/// startup from configuration; defaults to hiding detail.
static EXPOSE_ERROR_DETAILS: OnceCell<bool> = OnceCell::new();

pub fn set_expose_error_details(expose: bool) {
    let _ = EXPOSE_ERROR_DETAILS.set(expose);
}

fn expose_error_details() -> bool {
    EXPOSE_ERROR_DETAILS.get().copied().unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Expired: {0}")]
    Expired(anyhow::Error),

    #[error("Authentication error: {0}")]
    AuthError(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Insufficient role: have {current}, need one of {required:?}")]
    InsufficientRole {
        required: Vec<String>,
        current: String,
    },

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::ValidationError(err) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    message: "Validation error".to_string(),
                    details: Some(err.to_string()),
                    required: None,
                    current: None,
                },
            ),
            AppError::BadRequest(err) | AppError::Expired(err) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    message: err.to_string(),
                    details: None,
                    required: None,
                    current: None,
                },
            ),
            AppError::AuthError(err) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    message: err.to_string(),
                    details: None,
                    required: None,
                    current: None,
                },
            ),
            AppError::Forbidden(err) => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    message: err.to_string(),
                    details: None,
                    required: None,
                    current: None,
                },
            ),
            AppError::InsufficientRole { required, current } => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    message: "Access denied. Insufficient permissions.".to_string(),
                    details: None,
                    required: Some(required),
                    current: Some(current),
                },
            ),
            AppError::NotFound(err) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    message: err.to_string(),
                    details: None,
                    required: None,
                    current: None,
                },
            ),
            AppError::Conflict(err) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    message: err.to_string(),
                    details: None,
                    required: None,
                    current: None,
                },
            ),
            AppError::DatabaseError(err)
            | AppError::InternalError(err)
            | AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        message: "Server error".to_string(),
                        details: expose_error_details().then(|| err.to_string()),
                        required: None,
                        current: None,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
