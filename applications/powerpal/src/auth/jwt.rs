use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // uid
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String, // token id, used for revocation on sign-out
}

pub fn create_token(
    uid: &str,
    email: &str,
    secret: &str,
    expiry_hours: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = i64::try_from(expiry_hours)
        .ok()
        .and_then(Duration::try_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            AuthError::Unknown(format!("Token expiry of {} hours is out of range", expiry_hours))
        })?;

    let claims = Claims {
        sub: uid.to_string(),
        email: email.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Unknown(format!("Failed to create token: {}", e)))
}

/// Validate a JWT token and return the claims if valid
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let validation = Validation::default();
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!("Invalid token: {}", e);
        AuthError::InvalidSession
    })?;

    Ok(token_data.claims)
}
