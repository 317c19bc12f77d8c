use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::dashboard::controller::ControllerError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by the auth gateway. Each maps to a short message shown inline
/// on the login and signup forms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,

    #[error("wrong password")]
    WrongPassword,

    #[error("email already in use")]
    EmailInUse,

    #[error("invalid email")]
    InvalidEmail,

    #[error("password shorter than {min_length} characters")]
    WeakPassword { min_length: usize },

    #[error("email and password are required")]
    MissingCredentials,

    #[error("invalid or expired session")]
    InvalidSession,

    #[error("auth backend error: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Message for the end user. `fallback` is used for errors the user can do nothing about.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            AuthError::UserNotFound => "User not found.".to_string(),
            AuthError::WrongPassword => "Incorrect password.".to_string(),
            AuthError::EmailInUse => "Email already in use.".to_string(),
            AuthError::InvalidEmail => "Invalid email format.".to_string(),
            AuthError::WeakPassword { min_length } => {
                format!("Password should be at least {} characters.", min_length)
            }
            AuthError::MissingCredentials => "Please enter both email and password.".to_string(),
            AuthError::InvalidSession => "Session expired. Please sign in again.".to_string(),
            AuthError::Unknown(_) => fallback.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::UserNotFound
            | AuthError::WrongPassword
            | AuthError::InvalidSession => StatusCode::UNAUTHORIZED,
            AuthError::EmailInUse => StatusCode::CONFLICT,
            AuthError::InvalidEmail
            | AuthError::WeakPassword { .. }
            | AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
            AuthError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("write to {path} failed: {reason}")]
    Write { path: String, reason: String },

    #[error("read of {path} failed: {reason}")]
    Read { path: String, reason: String },

    #[error("subscription delivery failed: {0}")]
    Subscription(String),

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn write(path: impl ToString, reason: impl ToString) -> Self {
        StoreError::Write {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn read(path: impl ToString, reason: impl ToString) -> Self {
        StoreError::Read {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Rejections of free-text form input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be a number, got {input:?}")]
    InvalidNumber { field: &'static str, input: String },

    #[error("status must be 'active' or 'standby', got {0:?}")]
    InvalidStatus(String),

    #[error("unknown device field {0:?}")]
    UnknownField(String),
}

impl From<ControllerError> for AppError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::Validation(e) => AppError::Validation(e),
            ControllerError::Store(e) => AppError::Store(e),
            e @ ControllerError::IndexOutOfRange { .. } => AppError::NotFound(e.to_string()),
            e @ (ControllerError::NotEditing | ControllerError::WriteInFlight) => {
                AppError::Conflict(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Auth(ref e) => {
                if let AuthError::Unknown(ref reason) = e {
                    tracing::error!("Auth backend error: {}", reason);
                }
                (
                    e.status_code(),
                    e.user_message("Authentication failed. Please try again."),
                )
            }
            AppError::Store(StoreError::Write { ref path, ref reason }) => {
                tracing::error!(%path, %reason, "Document write failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "Failed to save loads. Try again.".to_string(),
                )
            }
            AppError::Store(ref e) => {
                tracing::error!("Document store error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Document store unavailable".to_string(),
                )
            }
            AppError::Validation(ref e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Json(ref e) => {
                tracing::warn!("Serialization error: {:?}", e);
                (StatusCode::BAD_REQUEST, "Invalid data format".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Config(ref msg) | AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Io(ref e) => {
                tracing::error!("IO error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Yaml(ref e) => {
                tracing::error!("YAML error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
