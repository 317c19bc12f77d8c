use axum::{
    extract::{Extension, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use super::AppState;
use crate::api::middleware::{clear_session_cookie, session_cookie, session_token};
use crate::api::models::auth::{CredentialsRequest, SessionResponse};
use crate::auth::{Session, UserIdentity};
use crate::error::AuthError;

pub const LOGIN_FAILED: &str = "Login failed. Please try again.";
pub const SIGNUP_FAILED: &str = "Signup failed. Please try again.";
pub const LOGIN_SUCCEEDED: &str = "Welcome to PowerPal Dashboard!";
pub const SIGNUP_SUCCEEDED: &str = "Account created successfully! Redirecting...";

/// Auth failure rendered with the message of the form it came from.
#[derive(Debug)]
pub struct AuthRejection {
    pub error: AuthError,
    pub fallback: &'static str,
}

impl AuthRejection {
    pub fn login(error: AuthError) -> Self {
        Self {
            error,
            fallback: LOGIN_FAILED,
        }
    }

    pub fn signup(error: AuthError) -> Self {
        Self {
            error,
            fallback: SIGNUP_FAILED,
        }
    }

    pub fn message(&self) -> String {
        self.error.user_message(self.fallback)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        if let AuthError::Unknown(ref reason) = self.error {
            tracing::error!("Auth backend error: {}", reason);
        }
        (
            self.error.status_code(),
            Json(json!({ "error": self.message() })),
        )
            .into_response()
    }
}

fn session_response(status: StatusCode, session: Session, message: &str) -> Response {
    let cookie = session_cookie(&session.token, session.expires_in);
    (
        status,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse {
            token: session.token,
            uid: session.identity.uid,
            email: session.identity.email,
            expires_in: session.expires_in,
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// POST /api/v1/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, AuthRejection> {
    let session = state
        .auth
        .sign_up(&payload.email, &payload.password)
        .await
        .map_err(AuthRejection::signup)?;

    Ok(session_response(StatusCode::CREATED, session, SIGNUP_SUCCEEDED))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, AuthRejection> {
    let session = state
        .auth
        .sign_in(&payload.email, &payload.password)
        .await
        .map_err(AuthRejection::login)?;

    Ok(session_response(StatusCode::OK, session, LOGIN_SUCCEEDED))
}

/// POST /api/v1/auth/logout
///
/// Always succeeds and clears the session cookie.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        if let Err(e) = state.auth.sign_out(&token).await {
            tracing::warn!("Sign-out failed: {}", e);
        }
    }
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie())],
    )
        .into_response()
}

/// GET /api/v1/auth/me
pub async fn me(Extension(identity): Extension<UserIdentity>) -> Json<UserIdentity> {
    Json(identity)
}
