use crate::api::AppState;
use crate::dashboard::{
    write_loads, Activation, DashboardSession, ListUpdate, PendingWrite, SessionEvent,
    LOGIN_ROUTE,
};
use crate::error::StoreError;
use crate::ws::protocol::{ClientMessage, ServerMessage};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const OUTBOUND_BUFFER: usize = 64;

type WriteOutcome = (PendingWrite, Result<(), StoreError>);

/// Handle a WebSocket connection
pub async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    token: Option<String>,
    client_id: String,
) {
    info!("WebSocket client connected: {}", client_id);

    let (mut ws_sender, ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

    // Forward outbound messages; closes the socket once every sender is gone
    let send_client_id = client_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(server_msg) = out_rx.recv().await {
            let json = match serde_json::to_string(&server_msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
                error!("Failed to send message to {}: {}", send_client_id, e);
                return;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let activation =
        DashboardSession::activate(state.auth.as_ref(), state.store.clone(), token.as_deref())
            .await;

    match activation {
        Ok(Activation::Active(session)) => {
            run_session(session, ws_receiver, out_tx, &client_id).await;
        }
        Ok(Activation::Redirect(to)) => {
            info!("Client {} has no session, redirecting", client_id);
            let _ = out_tx.send(ServerMessage::redirect(to)).await;
            drop(out_tx);
        }
        Err(e) => {
            error!("Failed to open dashboard for {}: {}", client_id, e);
            let _ = out_tx
                .send(ServerMessage::error("Document store unavailable", "STORE_UNAVAILABLE"))
                .await;
            drop(out_tx);
        }
    }

    if let Err(e) = send_task.await {
        debug!("Send task for {} ended abnormally: {}", client_id, e);
    }
    info!("WebSocket client disconnected: {}", client_id);
}

async fn run_session(
    mut session: DashboardSession,
    mut ws_receiver: SplitStream<WebSocket>,
    out_tx: mpsc::Sender<ServerMessage>,
    client_id: &str,
) {
    let (done_tx, mut done_rx) = mpsc::channel::<WriteOutcome>(1);

    if out_tx.send(ServerMessage::snapshot(session.devices())).await.is_err()
        || out_tx
            .send(ServerMessage::edit_state(session.controller()))
            .await
            .is_err()
    {
        session.teardown();
        return;
    }

    loop {
        let outbound: Vec<ServerMessage> = tokio::select! {
            event = session.next_event() => match event {
                SessionEvent::List(ListUpdate::Replaced) => {
                    vec![ServerMessage::snapshot(session.devices())]
                }
                SessionEvent::List(ListUpdate::NoData) => continue,
                SessionEvent::List(ListUpdate::Stale(e)) => {
                    vec![ServerMessage::error(
                        format!("Live updates interrupted, showing last known data: {}", e),
                        "STALE_DATA",
                    )]
                }
                SessionEvent::Ended => {
                    info!("Session for client {} ended", client_id);
                    let _ = out_tx.send(ServerMessage::redirect(LOGIN_ROUTE)).await;
                    break;
                }
                SessionEvent::FeedClosed => {
                    warn!("Live feed closed for client {}", client_id);
                    let _ = out_tx
                        .send(ServerMessage::error("Live updates stopped", "FEED_CLOSED"))
                        .await;
                    break;
                }
            },
            Some((write, result)) = done_rx.recv() => {
                let mut messages = Vec::with_capacity(2);
                match session.complete(write, result) {
                    Ok(()) => messages.push(ServerMessage::snapshot(session.devices())),
                    Err(e) => messages.push(ServerMessage::controller_error(&e)),
                }
                messages.push(ServerMessage::edit_state(session.controller()));
                messages
            }
            msg_result = ws_receiver.next() => {
                let msg = match msg_result {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            handle_client_message(&mut session, client_msg, &done_tx, client_id)
                        }
                        Err(e) => {
                            warn!("Failed to parse client message: {}", e);
                            vec![ServerMessage::error("Invalid message", "INVALID_MESSAGE")]
                        }
                    },
                    Message::Close(_) => {
                        info!("Client {} closed connection", client_id);
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => continue,
                    Message::Binary(_) => {
                        warn!("Received unexpected binary message from client {}", client_id);
                        continue;
                    }
                }
            }
        };

        for message in outbound {
            if out_tx.send(message).await.is_err() {
                session.teardown();
                return;
            }
        }
    }

    session.teardown();
}

/// Applies one client action and returns the replies. Writes run on their own task and
/// report back through `done_tx` so snapshots keep flowing meanwhile.
fn handle_client_message(
    session: &mut DashboardSession,
    msg: ClientMessage,
    done_tx: &mpsc::Sender<WriteOutcome>,
    client_id: &str,
) -> Vec<ServerMessage> {
    let result = match msg {
        ClientMessage::Ping => {
            debug!("Received ping from client {}", client_id);
            return vec![ServerMessage::pong()];
        }
        ClientMessage::BeginEdit { index } => session.begin_edit(index),
        ClientMessage::EditField { field, value } => session.change_field(field, &value),
        ClientMessage::Cancel => session.cancel(),
        ClientMessage::NewDeviceField { field, value } => {
            session.change_new_device_field(field, &value)
        }
        ClientMessage::Save => match session.prepare_save() {
            Ok(write) => {
                spawn_write(session, write, done_tx);
                Ok(())
            }
            Err(e) => Err(e),
        },
        ClientMessage::AddLoad => match session.prepare_add() {
            Ok(write) => {
                spawn_write(session, write, done_tx);
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => vec![ServerMessage::edit_state(session.controller())],
        Err(e) => {
            debug!("Client {} action rejected: {}", client_id, e);
            vec![
                ServerMessage::controller_error(&e),
                ServerMessage::edit_state(session.controller()),
            ]
        }
    }
}

fn spawn_write(
    session: &DashboardSession,
    write: PendingWrite,
    done_tx: &mpsc::Sender<WriteOutcome>,
) {
    let store = session.store();
    let path = session.path().clone();
    let done_tx = done_tx.clone();

    tokio::spawn(async move {
        let result = write_loads(store.as_ref(), &path, &write.devices).await;
        // The connection may already be gone; the write itself still stands.
        let _ = done_tx.send((write, result)).await;
    });
}
