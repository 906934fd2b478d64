//! End-to-End Socket Tests
//!
//! Run the real router on a local port against a scripted agent WebSocket
//! server, and drive it with a WebSocket client playing the telephony side.

mod common;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use base64::prelude::*;
use callbridge_gateway::core::agent::WebSocketAgentConnector;
use callbridge_gateway::core::functions::FunctionDispatcher;
use callbridge_gateway::{AppState, routes};
use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;

use common::{WAIT, media_event, start_event, test_config};

/// What the scripted agent observed
#[derive(Debug)]
enum AgentSaw {
    Settings(Value),
    Audio(usize),
}

/// Agent that speaks first, waits for one chunk of caller audio, signals a
/// barge-in and hangs up.
async fn spawn_agent(
    authorization: Arc<Mutex<Option<String>>>,
) -> (String, mpsc::UnboundedReceiver<AgentSaw>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let auth = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            *authorization.lock().unwrap() = auth;
            response
                .headers_mut()
                .insert("sec-websocket-protocol", HeaderValue::from_static("token"));
            Ok(response)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let settings: Value = serde_json::from_str(text.as_str()).unwrap();
            let _ = seen_tx.send(AgentSaw::Settings(settings));
        }

        ws.send(Message::binary(vec![9u8, 9, 9])).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if let Message::Binary(audio) = message {
                let _ = seen_tx.send(AgentSaw::Audio(audio.len()));
                break;
            }
        }

        ws.send(Message::text(r#"{"type":"UserStartedSpeaking"}"#))
            .await
            .unwrap();
        let _ = ws.close(None).await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    (format!("ws://{addr}/v1/agent/converse"), seen_rx)
}

async fn spawn_gateway(agent_url: &str) -> SocketAddr {
    let state = AppState::new(
        test_config(agent_url),
        Arc::new(FunctionDispatcher::empty()),
        Arc::new(WebSocketAgentConnector::new(agent_url, "test_agent_key")),
        json!({"type": "Settings", "agent": {"listen": {"provider": {"type": "deepgram"}}}}),
    );
    let app = routes::create_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn next_event<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for telephony frame")
            .expect("telephony socket ended")
            .expect("telephony socket failed");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_full_call_over_websockets() {
    let authorization = Arc::new(Mutex::new(None));
    let (agent_url, mut agent_seen) = spawn_agent(authorization.clone()).await;
    let gateway = spawn_gateway(&agent_url).await;

    let (mut telephony, _) = tokio_tungstenite::connect_async(format!("ws://{gateway}/twilio"))
        .await
        .unwrap();

    telephony
        .send(Message::text(json!({"event": "connected", "protocol": "Call"}).to_string()))
        .await
        .unwrap();
    telephony
        .send(Message::text(start_event("MZ-e2e")))
        .await
        .unwrap();

    // Agent audio sent before the stream started arrives once it has
    let media = next_event(&mut telephony).await;
    assert_eq!(media["event"], "media");
    assert_eq!(media["streamSid"], "MZ-e2e");
    assert_eq!(media["media"]["payload"], BASE64_STANDARD.encode([9u8, 9, 9]));

    for _ in 0..20 {
        telephony
            .send(Message::text(media_event(&[0x7f; 160])))
            .await
            .unwrap();
    }

    let clear = next_event(&mut telephony).await;
    assert_eq!(clear, json!({"event": "clear", "streamSid": "MZ-e2e"}));

    // The agent hung up, so the gateway closes the telephony socket
    timeout(WAIT, async {
        while let Some(Ok(message)) = telephony.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await
    .expect("telephony socket was not closed");

    match agent_seen.recv().await.unwrap() {
        AgentSaw::Settings(settings) => assert_eq!(settings["type"], "Settings"),
        other => panic!("Expected settings first, got {other:?}"),
    }
    match agent_seen.recv().await.unwrap() {
        AgentSaw::Audio(len) => assert_eq!(len, 3200),
        other => panic!("Expected caller audio, got {other:?}"),
    }
    assert_eq!(
        authorization.lock().unwrap().as_deref(),
        Some("Token test_agent_key")
    );
}

#[tokio::test]
async fn test_socket_greets_and_closes() {
    let gateway = spawn_gateway("ws://127.0.0.1:1/agent").await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{gateway}/test"))
        .await
        .unwrap();

    let greeting = next_event(&mut socket).await;
    assert_eq!(
        greeting,
        json!({"event": "connected", "message": "Test WebSocket connection successful"})
    );
}

#[tokio::test]
async fn test_unreachable_agent_reports_error_to_caller() {
    // Nothing listens on port 1
    let gateway = spawn_gateway("ws://127.0.0.1:1/agent").await;

    let (mut telephony, _) = tokio_tungstenite::connect_async(format!("ws://{gateway}/twilio"))
        .await
        .unwrap();

    let error = next_event(&mut telephony).await;
    assert_eq!(error["event"], "error");
    assert_eq!(error["error"]["code"], "AGENT_CONNECTION_FAILED");
}
