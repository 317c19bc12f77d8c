//! Email/password accounts backed by the document store.
//!
//! Sessions are HS256 tokens. Signing out revokes the token id and notifies every
//! [`AuthStateListener`] holding that session.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::jwt::{create_token, validate_token, Claims};
use super::password::{hash_password, verify_password};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::UserProfile;
use crate::store::{to_document, DocPath, DocumentStore, CREDENTIALS_COLLECTION};

const AUTH_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub uid: String,
    pub email: String,
}

impl From<&Claims> for UserIdentity {
    fn from(claims: &Claims) -> Self {
        Self {
            uid: claims.sub.clone(),
            email: claims.email.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub identity: UserIdentity,
    pub token: String,
    /// Seconds
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedOut { jti: String },
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Create an account and sign it in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    async fn current_user(&self, token: &str) -> Result<UserIdentity, AuthError>;

    /// Listener for the session behind `token`. A missing or unusable token yields a
    /// listener that reports no user.
    async fn on_auth_state_change(&self, token: Option<&str>) -> AuthStateListener;
}

/// Auth state as seen by one view. Dropping it unregisters from the gateway.
pub struct AuthStateListener {
    identity: Option<UserIdentity>,
    session: Option<(String, DateTime<Utc>)>,
    events: broadcast::Receiver<AuthEvent>,
}

impl AuthStateListener {
    fn new(
        identity: Option<UserIdentity>,
        session: Option<(String, DateTime<Utc>)>,
        events: broadcast::Receiver<AuthEvent>,
    ) -> Self {
        Self {
            identity,
            session,
            events,
        }
    }

    pub fn current(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    /// Resolves once the session is signed out or its token expires. Resolves at once
    /// when there is no session.
    pub async fn session_ended(&mut self) {
        let Some((jti, expires_at)) = self.session.clone() else {
            return;
        };

        let remaining = (expires_at - Utc::now()).to_std().unwrap_or_default();
        let expiry = tokio::time::sleep(remaining);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                _ = &mut expiry => {
                    debug!("session token expired");
                    break;
                }
                event = self.events.recv() => match event {
                    Ok(AuthEvent::SignedOut { jti: signed_out }) if signed_out == jti => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth listener lagged behind sign-out events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.identity = None;
        self.session = None;
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credential {
    uid: String,
    email: String,
    password_hash: String,
}

pub struct StoreAuthGateway {
    store: Arc<dyn DocumentStore>,
    config: AuthConfig,
    revoked: RwLock<HashMap<String, i64>>,
    events: broadcast::Sender<AuthEvent>,
    sign_up_lock: Mutex<()>,
}

impl StoreAuthGateway {
    pub fn new(store: Arc<dyn DocumentStore>, config: AuthConfig) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            store,
            config,
            revoked: RwLock::new(HashMap::new()),
            events,
            sign_up_lock: Mutex::new(()),
        }
    }

    fn issue(&self, identity: UserIdentity) -> Result<Session, AuthError> {
        let token = create_token(
            &identity.uid,
            &identity.email,
            &self.config.jwt_secret,
            self.config.jwt_expiry_hours,
        )?;
        Ok(Session {
            identity,
            token,
            expires_in: self.config.jwt_expiry_hours.saturating_mul(3600),
        })
    }

    async fn load_credential(&self, email: &str) -> Result<Option<Credential>, AuthError> {
        let doc = self
            .store
            .get_document(&credential_path(email))
            .await
            .map_err(backend_error)?;

        doc.map(|d| serde_json::from_value(serde_json::Value::Object(d)))
            .transpose()
            .map_err(|e| AuthError::Unknown(format!("corrupt credential record: {}", e)))
    }

    /// Valid, unrevoked claims for `token`.
    async fn session_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = validate_token(token, &self.config.jwt_secret)?;
        if self.revoked.read().await.contains_key(&claims.jti) {
            return Err(AuthError::InvalidSession);
        }
        Ok(claims)
    }
}

#[async_trait]
impl AuthGateway for StoreAuthGateway {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        require_credentials(&email, password)?;

        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < self.config.min_password_length {
            return Err(AuthError::WeakPassword {
                min_length: self.config.min_password_length,
            });
        }

        let _guard = self.sign_up_lock.lock().await;

        if self.load_credential(&email).await?.is_some() {
            return Err(AuthError::EmailInUse);
        }

        let uid = uuid::Uuid::new_v4().simple().to_string();
        let credential = Credential {
            uid: uid.clone(),
            email: email.clone(),
            password_hash: hash_password(password, self.config.bcrypt_cost)?,
        };
        let profile = UserProfile {
            uid: uid.clone(),
            email: email.clone(),
            created_at: Utc::now().to_rfc3339(),
        };

        self.store
            .set_document(
                &credential_path(&email),
                to_document(&credential).map_err(backend_error)?,
            )
            .await
            .map_err(backend_error)?;
        self.store
            .set_document(
                &DocPath::user(&uid),
                to_document(&profile).map_err(backend_error)?,
            )
            .await
            .map_err(backend_error)?;

        info!(%uid, "account created");
        self.issue(UserIdentity { uid, email })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        require_credentials(&email, password)?;

        let credential = self
            .load_credential(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !verify_password(password, &credential.password_hash)? {
            return Err(AuthError::WrongPassword);
        }

        match self.store.get_document(&DocPath::user(&credential.uid)).await {
            Ok(Some(_)) => debug!(uid = %credential.uid, "user profile found"),
            Ok(None) => warn!(uid = %credential.uid, "no user profile found"),
            Err(e) => warn!(uid = %credential.uid, error = %e, "failed to read user profile"),
        }

        info!(uid = %credential.uid, "signed in");
        self.issue(UserIdentity {
            uid: credential.uid,
            email: credential.email,
        })
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let claims = match validate_token(token, &self.config.jwt_secret) {
            Ok(claims) => claims,
            Err(_) => {
                debug!("sign-out with unusable token ignored");
                return Ok(());
            }
        };

        {
            let now = Utc::now().timestamp();
            let mut revoked = self.revoked.write().await;
            revoked.retain(|_, exp| *exp > now);
            revoked.insert(claims.jti.clone(), claims.exp);
        }

        let listeners = self
            .events
            .send(AuthEvent::SignedOut {
                jti: claims.jti.clone(),
            })
            .unwrap_or(0);
        info!(uid = %claims.sub, listeners, "signed out");
        Ok(())
    }

    async fn current_user(&self, token: &str) -> Result<UserIdentity, AuthError> {
        let claims = self.session_claims(token).await?;
        Ok(UserIdentity::from(&claims))
    }

    async fn on_auth_state_change(&self, token: Option<&str>) -> AuthStateListener {
        let events = self.events.subscribe();

        let claims = match token {
            Some(token) => match self.session_claims(token).await {
                Ok(claims) => Some(claims),
                Err(e) => {
                    debug!(error = %e, "auth state: no session");
                    None
                }
            },
            None => None,
        };

        match claims {
            Some(claims) => {
                let expires_at = Utc
                    .timestamp_opt(claims.exp, 0)
                    .single()
                    .unwrap_or_else(Utc::now);
                AuthStateListener::new(
                    Some(UserIdentity::from(&claims)),
                    Some((claims.jti, expires_at)),
                    events,
                )
            }
            None => AuthStateListener::new(None, None, events),
        }
    }
}

fn credential_path(email: &str) -> DocPath {
    DocPath::new(CREDENTIALS_COLLECTION, email)
}

fn backend_error(e: crate::error::StoreError) -> AuthError {
    AuthError::Unknown(e.to_string())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn require_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
