//! Bot API client tests against a local stub server.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use solidstreak::telegram::{BotClient, BotError, MessageSink, StreamError, UpdateSource};

type Calls = Arc<Mutex<Vec<(String, Value)>>>;

/// Serve a fake Bot API on an ephemeral port and return its base URL.
async fn stub(reply: Value) -> (String, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/:bot/:method",
            post(
                |State((calls, reply)): State<(Calls, Value)>,
                 Path((_bot, method)): Path<(String, String)>,
                 Json(body): Json<Value>| async move {
                    calls.lock().expect("lock").push((method, body));
                    Json(reply)
                },
            ),
        )
        .with_state((Arc::clone(&calls), reply));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    (format!("http://{addr}"), calls)
}

#[tokio::test]
async fn get_updates_sends_offset_and_parses_result() {
    let (base, calls) = stub(json!({
        "ok": true,
        "result": [
            {"update_id": 11, "message": {"message_id": 1, "chat": {"id": 5},
             "from": {"id": 5, "is_bot": false, "first_name": "Ann"}, "text": "/start"}},
            {"update_id": 12, "edited_message": {"message_id": 1}}
        ]
    }))
    .await;
    let client = BotClient::new(&base, "1:abc");

    let updates = client.get_updates(11, 0).await.expect("should fetch");
    assert_eq!(updates.len(), 2);
    assert!(updates[0].is_actionable());
    assert!(!updates[1].is_actionable());

    let calls = calls.lock().expect("lock").clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "getUpdates");
    assert_eq!(calls[0].1["offset"], 11);
    assert_eq!(calls[0].1["timeout"], 0);
}

#[tokio::test]
async fn get_updates_reports_api_error() {
    let (base, _) = stub(json!({"ok": false, "description": "Unauthorized"})).await;
    let client = BotClient::new(&base, "1:abc");

    match client.get_updates(0, 0).await {
        Err(StreamError::Api(msg)) => assert_eq!(msg, "Unauthorized"),
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn send_message_posts_chat_and_text() {
    let (base, calls) = stub(json!({"ok": true, "result": {"message_id": 9}})).await;
    let client = BotClient::new(&base, "1:abc");

    client.send_message(-100, "hi").await.expect("should send");

    let calls = calls.lock().expect("lock").clone();
    assert_eq!(calls[0].0, "sendMessage");
    assert_eq!(calls[0].1["chat_id"], -100);
    assert_eq!(calls[0].1["text"], "hi");
}

#[tokio::test]
async fn send_message_reports_api_error() {
    let (base, _) = stub(json!({"ok": false, "description": "Forbidden"})).await;
    let client = BotClient::new(&base, "1:abc");

    assert!(matches!(
        client.send_message(1, "hi").await,
        Err(BotError::Api(msg)) if msg == "Forbidden"
    ));
}
