pub mod auth;
pub mod health;
pub mod loads;
pub mod pages;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::api::form_tokens::FormTokens;
use crate::auth::AuthGateway;
use crate::config::Config;
use crate::store::DocumentStore;
use crate::telemetry::Analytics;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthGateway>,
    pub config: Arc<Config>,
    pub analytics: Analytics,
    /// Open dashboard WebSocket connections.
    pub live_connections: Arc<AtomicUsize>,
    pub form_tokens: FormTokens,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthGateway>,
        config: Config,
        analytics: Analytics,
    ) -> Self {
        Self {
            store,
            auth,
            config: Arc::new(config),
            analytics,
            live_connections: Arc::new(AtomicUsize::new(0)),
            form_tokens: FormTokens::new(),
        }
    }
}
