use tracing::debug;

use crate::auth::{AuthGateway, AuthStateListener, UserIdentity};

pub const LOGIN_ROUTE: &str = "/login";

pub enum GuardDecision {
    Redirect { to: &'static str },
    Proceed(SessionGuard),
}

/// Gate in front of the dashboard. Holds the auth-state registration for as long as the
/// view is alive; dropping the guard unregisters it.
pub struct SessionGuard {
    listener: AuthStateListener,
    identity: UserIdentity,
}

impl SessionGuard {
    /// A failed auth check is treated the same as having no session.
    pub async fn activate(gateway: &dyn AuthGateway, token: Option<&str>) -> GuardDecision {
        let listener = gateway.on_auth_state_change(token).await;

        match listener.current().cloned() {
            Some(identity) => {
                debug!(uid = %identity.uid, "session present");
                GuardDecision::Proceed(SessionGuard { listener, identity })
            }
            None => {
                debug!("no session, redirecting to {}", LOGIN_ROUTE);
                GuardDecision::Redirect { to: LOGIN_ROUTE }
            }
        }
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    /// Resolves when the guarded session is signed out or expires.
    pub async fn session_ended(&mut self) {
        self.listener.session_ended().await
    }
}
