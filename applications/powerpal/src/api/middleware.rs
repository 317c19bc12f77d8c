use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::api::handlers::AppState;
use crate::error::{AppError, AuthError};

pub const SESSION_COOKIE: &str = "powerpal_session";

/// Raw session token of an authenticated request.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Extract Bearer token from Authorization header
fn extract_bearer_token(auth_header: Option<&str>) -> Option<&str> {
    match auth_header {
        Some(header) if header.starts_with("Bearer ") => Some(&header[7..]),
        _ => None,
    }
}

fn extract_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Session token from a Bearer header, falling back to the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    if let Some(token) = extract_bearer_token(bearer) {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .find_map(|cookies| extract_cookie(cookies, SESSION_COOKIE))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

pub fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

pub fn clear_session_cookie() -> String {
    format!("{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = match session_token(request.headers()) {
        Some(token) => token,
        None => {
            warn!("Missing session token");
            return Err(AppError::Unauthorized("Missing session token".to_string()));
        }
    };

    let identity = state.auth.current_user(&token).await.map_err(|e| {
        warn!("Session rejected: {}", e);
        match e {
            AuthError::Unknown(_) => AppError::Auth(e),
            _ => AppError::Auth(AuthError::InvalidSession),
        }
    })?;

    debug!(uid = %identity.uid, "session accepted");
    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(SessionToken(token));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token_valid() {
        assert_eq!(extract_bearer_token(Some("Bearer abc123xyz")), Some("abc123xyz"));
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        assert_eq!(extract_bearer_token(Some("Basic dXNlcjpwYXNz")), None);
        assert_eq!(extract_bearer_token(Some("bearer abc123")), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn test_extract_cookie() {
        let header = "theme=dark; powerpal_session=tok.en.value; other=1";
        assert_eq!(extract_cookie(header, SESSION_COOKIE), Some("tok.en.value"));
        assert_eq!(extract_cookie(header, "missing"), None);
    }

    #[test]
    fn test_session_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("powerpal_session=from-cookie"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_cleared_cookie_is_not_a_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("powerpal_session="));
        assert_eq!(session_token(&headers), None);
    }
}
