//! One-time tokens embedded in the add forms. A form posted twice only applies once.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Hidden form field carrying the token.
pub const FORM_TOKEN_FIELD: &str = "form_token";

const FORM_TOKEN_TTL_SECS: i64 = 3600;

struct IssuedToken {
    uid: String,
    expires_at: i64,
}

#[derive(Clone, Default)]
pub struct FormTokens {
    issued: Arc<Mutex<HashMap<String, IssuedToken>>>,
}

impl FormTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a token that only `uid` can redeem, once, within the hour.
    pub async fn issue(&self, uid: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now().timestamp();

        let mut issued = self.issued.lock().await;
        issued.retain(|_, t| t.expires_at > now);
        issued.insert(
            token.clone(),
            IssuedToken {
                uid: uid.to_string(),
                expires_at: now + FORM_TOKEN_TTL_SECS,
            },
        );
        token
    }

    /// Consumes `token`. False when it is unknown, expired, already used or was issued
    /// to another user.
    pub async fn redeem(&self, uid: &str, token: &str) -> bool {
        let now = Utc::now().timestamp();
        let mut issued = self.issued.lock().await;

        match issued.get(token) {
            Some(t) if t.uid == uid && t.expires_at > now => {
                issued.remove(token);
                true
            }
            _ => {
                debug!(uid, "form token rejected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_redeems_once() {
        let tokens = FormTokens::new();
        let token = tokens.issue("uid-1").await;

        assert!(tokens.redeem("uid-1", &token).await);
        assert!(!tokens.redeem("uid-1", &token).await);
    }

    #[tokio::test]
    async fn test_token_bound_to_user() {
        let tokens = FormTokens::new();
        let token = tokens.issue("uid-1").await;

        assert!(!tokens.redeem("uid-2", &token).await);
        assert!(!tokens.redeem("uid-1", "").await);
        assert!(tokens.redeem("uid-1", &token).await);
    }
}
