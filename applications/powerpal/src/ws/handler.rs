use crate::api::middleware::session_token;
use crate::api::AppState;
use crate::ws::connection::handle_connection;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Slot in the connection limit, released on drop.
pub struct ConnectionSlot {
    counter: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    pub fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()?;
        Some(Self {
            counter: counter.clone(),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle WebSocket upgrade request
/// Token in query parameter (/ws/dashboard?token=<JWT>) or the session cookie.
/// Requests without a usable session are upgraded and then sent a login redirect.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, StatusCode> {
    let token = params.token.or_else(|| session_token(&headers));

    let max = state.config.server.max_connections;
    let slot = ConnectionSlot::acquire(&state.live_connections, max).ok_or_else(|| {
        warn!(max, "WebSocket connection limit reached");
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    let client_id = uuid::Uuid::new_v4().to_string();
    info!("WebSocket upgrade requested: {}", client_id);

    Ok(ws.on_upgrade(move |socket: WebSocket| async move {
        let _slot = slot;
        handle_connection(socket, state, token, client_id).await
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_slots_are_limited_and_released() {
        let counter = Arc::new(AtomicUsize::new(0));

        let first = ConnectionSlot::acquire(&counter, 2).unwrap();
        let second = ConnectionSlot::acquire(&counter, 2).unwrap();
        assert!(ConnectionSlot::acquire(&counter, 2).is_none());

        drop(first);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(ConnectionSlot::acquire(&counter, 2).is_some());
        drop(second);
    }
}
