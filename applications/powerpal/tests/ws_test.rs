// Live dashboard over a real WebSocket, served on an ephemeral port

use axum::http::StatusCode;
use axum_test::{TestServer, TestWebSocket};
use powerpal::auth::StoreAuthGateway;
use powerpal::config::{AnalyticsConfig, AuthConfig, Config, IngestConfig, ServerConfig, StoreConfig};
use powerpal::store::DocumentStore;
use powerpal::{create_router, Analytics, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::FlakyStore;


fn create_test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            max_connections: 10,
        },
        auth: AuthConfig {
            jwt_secret: "ws-test-secret".into(),
            jwt_expiry_hours: 1,
            min_password_length: 6,
            bcrypt_cost: 4,
        },
        store: StoreConfig::default(),
        ingest: IngestConfig::default(),
        analytics: AnalyticsConfig::default(),
    }
}

fn create_test_server(store: &FlakyStore) -> TestServer {
    let config = create_test_config();
    let store: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let auth = Arc::new(StoreAuthGateway::new(store.clone(), config.auth.clone()));

    let app = create_router(AppState::new(store, auth, config, Analytics::disabled()));
    TestServer::builder().http_transport().build(app).unwrap()
}

async fn signup(server: &TestServer, email: &str) -> String {
    let response = server
        .post("/api/v1/auth/signup")
        .json(&json!({ "email": email, "password": "hunter22" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    body["token"].as_str().unwrap().to_string()
}

async fn connect(server: &TestServer, token: Option<&str>) -> TestWebSocket {
    let mut request = server.get_websocket("/ws/dashboard");
    if let Some(token) = token {
        request = request.add_query_param("token", token);
    }
    request.await.into_websocket().await
}

async fn receive(ws: &mut TestWebSocket) -> Value {
    tokio::time::timeout(Duration::from_secs(2), ws.receive_json::<Value>())
        .await
        .expect("timed out waiting for a server message")
}

/// Reads messages until one of type `kind` matches `done`, returning everything read.
async fn receive_until(
    ws: &mut TestWebSocket,
    kind: &str,
    done: impl Fn(&Value) -> bool,
) -> Vec<Value> {
    let mut seen = Vec::new();
    for _ in 0..10 {
        let msg = receive(ws).await;
        let finished = msg["type"] == kind && done(&msg);
        seen.push(msg);
        if finished {
            return seen;
        }
    }
    panic!("no matching {} message in {:?}", kind, seen);
}

#[tokio::test]
async fn test_connection_without_session_is_redirected() {
    let store = FlakyStore::new();
    let server = create_test_server(&store);

    let mut ws = connect(&server, None).await;
    let msg = receive(&mut ws).await;
    assert_eq!(msg, json!({ "type": "redirect", "to": "/login" }));

    let mut ws = connect(&server, Some("not-a-token")).await;
    let msg = receive(&mut ws).await;
    assert_eq!(msg["type"], "redirect");

    assert_eq!(store.subscriptions(), 0);
}

#[tokio::test]
async fn test_session_receives_initial_state() {
    let store = FlakyStore::new();
    let server = create_test_server(&store);
    let token = signup(&server, "live@example.com").await;

    let mut ws = connect(&server, Some(&token)).await;

    let snapshot = receive(&mut ws).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["devices"], json!([]));
    assert_eq!(snapshot["summary"]["total_consumption_kwh"], 0.0);

    let state = receive(&mut ws).await;
    assert_eq!(state["type"], "edit_state");
    assert_eq!(state["editing"], Value::Null);
    assert_eq!(state["pending"], false);
    assert_eq!(store.subscriptions(), 1);

    ws.send_json(&json!({ "type": "ping" })).await;
    assert_eq!(receive(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn test_add_load_completes_with_snapshot_and_edit_state() {
    let store = FlakyStore::new();
    let server = create_test_server(&store);
    let token = signup(&server, "adder@example.com").await;

    let mut ws = connect(&server, Some(&token)).await;
    receive_until(&mut ws, "edit_state", |_| true).await;

    for (field, value) in [("name", "Heater"), ("power", "1.5"), ("status", "active")] {
        ws.send_json(&json!({ "type": "new_device_field", "field": field, "value": value }))
            .await;
        let state = receive(&mut ws).await;
        assert_eq!(state["type"], "edit_state");
    }

    ws.send_json(&json!({ "type": "add_load" })).await;
    let state = receive(&mut ws).await;
    assert_eq!(state["type"], "edit_state");
    assert_eq!(state["pending"], true);

    let seen = receive_until(&mut ws, "edit_state", |msg| msg["pending"] == false).await;
    let state = seen.last().unwrap();
    assert_eq!(state["new_device"]["name"], "");
    assert_eq!(state["new_device"]["status"], "standby");

    let snapshot = seen
        .iter()
        .rev()
        .find(|msg| msg["type"] == "snapshot")
        .expect("a snapshot after the write");
    assert_eq!(snapshot["devices"][0]["name"], "Heater");
    assert_eq!(snapshot["devices"][0]["load_factor"], 60);
}

#[tokio::test]
async fn test_save_and_failed_save() {
    let store = FlakyStore::new();
    let server = create_test_server(&store);
    let token = signup(&server, "editor@example.com").await;

    server
        .post("/api/v1/loads")
        .add_header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "name": "Fan", "power": "0.2" }))
        .await
        .assert_status(StatusCode::CREATED);

    let mut ws = connect(&server, Some(&token)).await;
    receive_until(&mut ws, "edit_state", |_| true).await;

    ws.send_json(&json!({ "type": "begin_edit", "index": 0 })).await;
    let state = receive(&mut ws).await;
    assert_eq!(state["editing"]["index"], 0);
    assert_eq!(state["editing"]["draft"]["name"], "Fan");

    ws.send_json(&json!({ "type": "edit_field", "field": "power", "value": "abc" }))
        .await;
    let error = receive(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "VALIDATION");
    receive(&mut ws).await;

    ws.send_json(&json!({ "type": "edit_field", "field": "name", "value": "Desk fan" }))
        .await;
    receive(&mut ws).await;

    store.set_offline(true);
    ws.send_json(&json!({ "type": "save" })).await;
    let seen = receive_until(&mut ws, "edit_state", |msg| msg["pending"] == false).await;
    assert!(seen
        .iter()
        .any(|msg| msg["type"] == "error" && msg["code"] == "SAVE_FAILED"));
    let state = seen.last().unwrap();
    assert_eq!(state["editing"]["draft"]["name"], "Desk fan");

    store.set_offline(false);
    ws.send_json(&json!({ "type": "save" })).await;
    let seen = receive_until(&mut ws, "edit_state", |msg| {
        msg["pending"] == false && msg["editing"].is_null()
    })
    .await;
    let snapshot = seen
        .iter()
        .rev()
        .find(|msg| msg["type"] == "snapshot")
        .expect("a snapshot after the write");
    assert_eq!(snapshot["devices"][0]["name"], "Desk fan");
}

#[tokio::test]
async fn test_sign_out_ends_connection_with_redirect() {
    let store = FlakyStore::new();
    let server = create_test_server(&store);
    let token = signup(&server, "leaver@example.com").await;

    let mut ws = connect(&server, Some(&token)).await;
    receive_until(&mut ws, "edit_state", |_| true).await;

    server
        .post("/api/v1/auth/logout")
        .add_header("Authorization", format!("Bearer {}", token))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let msg = receive(&mut ws).await;
    assert_eq!(msg, json!({ "type": "redirect", "to": "/login" }));
}
