#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures_util::{SinkExt, StreamExt};
use resumer_core::Role;
use resumer_gateway::{AuthConfig, EchoGenerator, GatewayServer};
use resumer_session::{EntryStore, FileEntryStore, ResponseResumer, ResumerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    addr: String,
    resumer: Arc<ResponseResumer>,
    entries: Arc<FileEntryStore>,
    _tmp: tempfile::TempDir,
}

/// Helper: build a test server on a random port.
async fn start_server(config: ResumerConfig, token_delay: Duration, auth: AuthConfig) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let entries = Arc::new(
        FileEntryStore::new(tmp.path().join("entries"))
            .await
            .unwrap(),
    );
    let resumer = ResponseResumer::new(config).unwrap();
    let app = GatewayServer::build_with_middleware(
        resumer.clone(),
        Arc::new(EchoGenerator::new(token_delay)),
        entries.clone(),
        auth,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let addr = format!("127.0.0.1:{}", addr.port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        resumer,
        entries,
        _tmp: tmp,
    }
}

async fn start_test_server() -> TestServer {
    start_server(ResumerConfig::default(), Duration::ZERO, AuthConfig::default()).await
}

async fn connect(addr: &str, path: &str) -> Ws {
    let url = format!("ws://{addr}{path}");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

async fn next_message(ws: &mut Ws) -> Option<Message> {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .map(|m| m.unwrap())
}

async fn next_json(ws: &mut Ws) -> serde_json::Value {
    loop {
        match next_message(ws).await.unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

async fn send_json(ws: &mut Ws, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// What a reader connection delivered before the server closed it.
#[derive(Debug, Default)]
struct Delivered {
    text: String,
    offsets: Vec<u64>,
    end_status: Option<String>,
    close_code: Option<u16>,
    close_reason: String,
}

async fn read_to_close(ws: &mut Ws) -> Delivered {
    let mut out = Delivered::default();
    while let Some(msg) = next_message(ws).await {
        match msg {
            Message::Text(text) => {
                let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                match frame["type"].as_str().unwrap() {
                    "chunk" => {
                        out.offsets.push(frame["offset"].as_u64().unwrap());
                        out.text.push_str(frame["data"].as_str().unwrap());
                    }
                    "end" => out.end_status = Some(frame["status"].as_str().unwrap().to_string()),
                    _ => {}
                }
            }
            Message::Close(frame) => {
                if let Some(frame) = frame {
                    out.close_code = Some(u16::from(frame.code));
                    out.close_reason = frame.reason.to_string();
                }
                break;
            }
            _ => {}
        }
    }
    out
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = start_test_server().await;
    let resp = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "resumer");
}

#[tokio::test]
async fn test_enabled_check_and_in_progress() {
    let server = start_test_server().await;
    let live = Uuid::new_v4();
    let unknown = Uuid::new_v4();
    let handle = server.resumer.start(live).unwrap();
    server.resumer.recorder().append(&handle, "abc").unwrap();

    let enabled: serde_json::Value = reqwest::get(format!("http://{}/v1/responses/enabled", server.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(enabled["enabled"], true);

    let client = reqwest::Client::new();
    let check: serde_json::Value = client
        .post(format!("http://{}/v1/responses/check", server.addr))
        .json(&serde_json::json!({"conversation_ids": [live, unknown]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let recordings = &check["recordings"];
    assert_eq!(recordings[live.to_string()]["recording"], true);
    assert_eq!(recordings[live.to_string()]["length"], 3);
    assert_eq!(recordings[unknown.to_string()]["recording"], false);
    assert_eq!(recordings[unknown.to_string()]["length"], 0);

    let in_progress: serde_json::Value = reqwest::get(format!(
        "http://{}/v1/conversations/{live}/in-progress",
        server.addr
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
    assert_eq!(in_progress["in_progress"], true);
}

#[tokio::test]
async fn test_resume_unknown_conversation_closes_not_found() {
    let server = start_test_server().await;
    let mut ws = connect(
        &server.addr,
        &format!("/v1/conversations/{}/resume", Uuid::new_v4()),
    )
    .await;
    let delivered = read_to_close(&mut ws).await;
    assert!(delivered.text.is_empty());
    assert!(delivered.end_status.is_none());
    assert_eq!(delivered.close_code, Some(4404));
}

#[tokio::test]
async fn test_resume_past_end_closes_invalid_position() {
    let server = start_test_server().await;
    let id = Uuid::new_v4();
    let handle = server.resumer.start(id).unwrap();
    server.resumer.recorder().append(&handle, "HELLO").unwrap();

    let mut ws = connect(
        &server.addr,
        &format!("/v1/conversations/{id}/resume?position=6"),
    )
    .await;
    assert_eq!(read_to_close(&mut ws).await.close_code, Some(4400));
}

#[tokio::test]
async fn test_resume_completed_recording() {
    let server = start_test_server().await;
    let id = Uuid::new_v4();
    let handle = server.resumer.start(id).unwrap();
    server.resumer.recorder().append(&handle, "HEL").unwrap();
    server.resumer.recorder().append(&handle, "LO").unwrap();
    server.resumer.recorder().complete(&handle);

    let mut ws = connect(&server.addr, &format!("/v1/conversations/{id}/resume")).await;
    let all = read_to_close(&mut ws).await;
    assert_eq!(all.text, "HELLO");
    assert_eq!(all.offsets, vec![0, 3]);
    assert_eq!(all.end_status.as_deref(), Some("completed"));
    assert_eq!(all.close_code, Some(1000));

    let mut ws = connect(
        &server.addr,
        &format!("/v1/conversations/{id}/resume?position=3"),
    )
    .await;
    assert_eq!(read_to_close(&mut ws).await.text, "LO");

    // Nothing left is still a successful, empty resume.
    let mut ws = connect(
        &server.addr,
        &format!("/v1/conversations/{id}/resume?position=5"),
    )
    .await;
    let empty = read_to_close(&mut ws).await;
    assert!(empty.text.is_empty());
    assert_eq!(empty.end_status.as_deref(), Some("completed"));
    assert_eq!(empty.close_code, Some(1000));
}

#[tokio::test]
async fn test_resume_follows_live_output() {
    let server = start_test_server().await;
    let id = Uuid::new_v4();
    let handle = server.resumer.start(id).unwrap();
    server.resumer.recorder().append(&handle, "first ").unwrap();

    let mut ws = connect(&server.addr, &format!("/v1/conversations/{id}/resume")).await;
    let first = next_json(&mut ws).await;
    assert_eq!(first["data"], "first ");

    server.resumer.recorder().append(&handle, "second").unwrap();
    server.resumer.recorder().complete(&handle);

    let rest = read_to_close(&mut ws).await;
    assert_eq!(rest.text, "second");
    assert_eq!(rest.offsets, vec![6]);
    assert_eq!(rest.end_status.as_deref(), Some("completed"));
}

#[tokio::test]
async fn test_chat_streams_reply_and_persists_entries() {
    let server = start_test_server().await;
    let id = Uuid::new_v4();
    let mut ws = connect(&server.addr, &format!("/v1/conversations/{id}/chat")).await;
    send_json(&mut ws, serde_json::json!({"content": "hello resumable world"})).await;

    let reply = read_to_close(&mut ws).await;
    let expected = EchoGenerator::default().reply_for("hello resumable world");
    assert_eq!(reply.text, expected);
    assert_eq!(reply.end_status.as_deref(), Some("completed"));

    let entries = server.entries.clone();
    let mut persisted = Vec::new();
    for _ in 0..200 {
        persisted = entries.list(id).await.unwrap();
        if persisted.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[0].role, Role::User);
    assert_eq!(persisted[1].role, Role::Assistant);
    assert_eq!(persisted[1].content, expected);
}

#[tokio::test]
async fn test_refused_prompt_leaves_no_recording() {
    let server = start_test_server().await;
    let id = Uuid::new_v4();
    let mut ws = connect(&server.addr, &format!("/v1/conversations/{id}/chat")).await;
    send_json(&mut ws, serde_json::json!({"content": "   "})).await;

    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(read_to_close(&mut ws).await.close_code, Some(4500));

    let probe = server.resumer.check_recordings(&[id]);
    assert!(!probe[&id].recording);
    assert_eq!(probe[&id].length, 0);
    assert!(server.resumer.registry().get(id).is_none());

    let mut resume = connect(&server.addr, &format!("/v1/conversations/{id}/resume")).await;
    let delivered = read_to_close(&mut resume).await;
    assert!(delivered.end_status.is_none());
    assert_eq!(delivered.close_code, Some(4404));
}

#[tokio::test]
async fn test_chat_survives_disconnect_and_resumes() {
    let server = start_server(
        ResumerConfig::default(),
        Duration::from_millis(30),
        AuthConfig::default(),
    )
    .await;
    let id = Uuid::new_v4();
    let prompt = "one two three four five";

    let mut ws = connect(&server.addr, &format!("/v1/conversations/{id}/chat")).await;
    send_json(&mut ws, serde_json::json!({"content": prompt})).await;
    let first = next_json(&mut ws).await;
    assert_eq!(first["type"], "chunk");
    assert_eq!(first["offset"], 0);
    drop(ws);

    // Generation continues without the client.
    let resumer = server.resumer.clone();
    wait_until(move || !resumer.has_response_in_progress(id)).await;

    let mut ws = connect(&server.addr, &format!("/v1/conversations/{id}/resume")).await;
    let replay = read_to_close(&mut ws).await;
    assert_eq!(replay.text, EchoGenerator::default().reply_for(prompt));
    assert_eq!(replay.end_status.as_deref(), Some("completed"));
}

#[tokio::test]
async fn test_cancel_during_chat() {
    let server = start_server(
        ResumerConfig::default(),
        Duration::from_millis(50),
        AuthConfig::default(),
    )
    .await;
    let id = Uuid::new_v4();
    let prompt = "a b c d e f g h i j k l m n o p";

    let mut ws = connect(&server.addr, &format!("/v1/conversations/{id}/chat")).await;
    send_json(&mut ws, serde_json::json!({"content": prompt})).await;
    let first = next_json(&mut ws).await;
    assert_eq!(first["type"], "chunk");

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/conversations/{id}/cancel", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let rest = read_to_close(&mut ws).await;
    assert_eq!(rest.end_status.as_deref(), Some("cancelled"));
    let full = EchoGenerator::default().reply_for(prompt);
    let received = format!("{}{}", first["data"].as_str().unwrap(), rest.text);
    assert!(received.len() < full.len());
    assert!(full.starts_with(&received));

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/conversations/{id}/cancel", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_record_socket_round_trip() {
    let server = start_test_server().await;
    let id = Uuid::new_v4();
    let mut producer = connect(&server.addr, "/v1/responses/record").await;
    send_json(
        &mut producer,
        serde_json::json!({"conversation_id": id, "token": "Hel"}),
    )
    .await;
    send_json(&mut producer, serde_json::json!({"token": "lo"})).await;
    send_json(&mut producer, serde_json::json!({"complete": true})).await;

    let recorded = next_json(&mut producer).await;
    assert_eq!(recorded["type"], "recorded");
    assert_eq!(recorded["status"], "completed");
    assert_eq!(recorded["offset"], 5);

    let mut reader = connect(
        &server.addr,
        &format!("/v1/conversations/{id}/resume?position=3"),
    )
    .await;
    assert_eq!(read_to_close(&mut reader).await.text, "lo");
}

#[tokio::test]
async fn test_record_socket_receives_cancel() {
    let server = start_test_server().await;
    let id = Uuid::new_v4();
    let mut producer = connect(&server.addr, "/v1/responses/record").await;
    send_json(
        &mut producer,
        serde_json::json!({"conversation_id": id, "token": "partial"}),
    )
    .await;
    let resumer = server.resumer.clone();
    wait_until(move || resumer.check_recordings(&[id])[&id].length == 7).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/conversations/{id}/cancel", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let notice = next_json(&mut producer).await;
    assert_eq!(notice["type"], "cancel_requested");
    let recorded = next_json(&mut producer).await;
    assert_eq!(recorded["type"], "recorded");
    assert_eq!(recorded["status"], "cancelled");
    assert_eq!(recorded["offset"], 7);
}

#[tokio::test]
async fn test_second_producer_is_rejected() {
    let server = start_test_server().await;
    let id = Uuid::new_v4();
    let mut first = connect(&server.addr, "/v1/responses/record").await;
    send_json(&mut first, serde_json::json!({"conversation_id": id})).await;
    let resumer = server.resumer.clone();
    wait_until(move || resumer.has_response_in_progress(id)).await;

    let mut second = connect(&server.addr, "/v1/responses/record").await;
    send_json(&mut second, serde_json::json!({"conversation_id": id})).await;
    let error = next_json(&mut second).await;
    assert_eq!(error["type"], "error");
    assert_eq!(read_to_close(&mut second).await.close_code, Some(4409));
}

#[tokio::test]
async fn test_disabled_resume_closes_unavailable() {
    let server = start_server(
        ResumerConfig {
            enabled: false,
            ..ResumerConfig::default()
        },
        Duration::ZERO,
        AuthConfig::default(),
    )
    .await;
    let mut ws = connect(
        &server.addr,
        &format!("/v1/conversations/{}/resume", Uuid::new_v4()),
    )
    .await;
    assert_eq!(read_to_close(&mut ws).await.close_code, Some(4503));
}

// --- Auth middleware tests ---

#[tokio::test]
async fn test_auth_health_is_public() {
    let server = start_server(
        ResumerConfig::default(),
        Duration::ZERO,
        AuthConfig::new(vec!["secret-key-123".to_string()]),
    )
    .await;
    let resp = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_auth_rejects_without_key() {
    let server = start_server(
        ResumerConfig::default(),
        Duration::ZERO,
        AuthConfig::new(vec!["secret-key-123".to_string()]),
    )
    .await;
    let resp = reqwest::get(format!("http://{}/v1/responses/enabled", server.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let url = format!(
        "ws://{}/v1/conversations/{}/resume",
        server.addr,
        Uuid::new_v4()
    );
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());
}

#[tokio::test]
async fn test_auth_accepts_query_key_on_websocket() {
    let server = start_server(
        ResumerConfig::default(),
        Duration::ZERO,
        AuthConfig::new(vec!["secret-key-123".to_string()]),
    )
    .await;
    let id = Uuid::new_v4();
    let handle = server.resumer.start(id).unwrap();
    server.resumer.recorder().append(&handle, "ok").unwrap();
    server.resumer.recorder().complete(&handle);

    let mut ws = connect(
        &server.addr,
        &format!("/v1/conversations/{id}/resume?position=0&api_key=secret-key-123"),
    )
    .await;
    assert_eq!(read_to_close(&mut ws).await.text, "ok");
}
