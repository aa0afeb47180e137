use std::future::Future;

use futures::{SinkExt, StreamExt};
use genai::{FunctionResponse, Part};
use genai_live::{LiveClient, LiveConnectConfig, LiveError, ServerMessage, SessionState};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};
use url::Url;

type ServerSocket = WebSocketStream<TcpStream>;

/// Starts a one-connection server running `handler` and returns its URL.
async fn serve<F, Fut>(handler: F) -> Url
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let socket = accept_async(stream).await.unwrap();
        handler(socket).await;
    });
    Url::parse(&format!("ws://{addr}/live")).unwrap()
}

async fn next_json(socket: &mut ServerSocket) -> Option<Value> {
    while let Some(message) = socket.next().await {
        match message.ok()? {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

async fn reply(socket: &mut ServerSocket, value: Value) {
    socket.send(Message::text(value.to_string())).await.unwrap();
}

async fn acknowledge_setup(socket: &mut ServerSocket) -> Value {
    let setup = next_json(socket).await.unwrap();
    reply(socket, json!({"setupComplete": {}})).await;
    setup
}

fn envelope_kind(value: &Value) -> String {
    value.as_object().and_then(|object| object.keys().next().cloned()).unwrap_or_default()
}

fn client(url: Url) -> LiveClient {
    LiveClient::studio("test-key").with_endpoint(url)
}

#[tokio::test]
async fn sends_keep_their_order_and_unknown_cancellations_are_tolerated() {
    let (recorded_tx, recorded_rx) = oneshot::channel();
    let url = serve(|mut socket| async move {
        let setup = acknowledge_setup(&mut socket).await;
        assert_eq!(setup["setup"]["model"], "models/gemini-2.0-flash-live-001");
        reply(
            &mut socket,
            json!({"toolCall": {"functionCalls": [{"id": "call-1", "name": "lookup", "args": {"q": "rust"}}]}}),
        )
        .await;
        reply(&mut socket, json!({"toolCallCancellation": {"ids": ["never-issued"]}})).await;

        let mut recorded = Vec::new();
        for _ in 0..3 {
            recorded.push(next_json(&mut socket).await.unwrap());
        }
        reply(
            &mut socket,
            json!({"serverContent": {"modelTurn": {"role": "model", "parts": [{"text": "done"}]}, "turnComplete": true}}),
        )
        .await;
        socket.close(None).await.ok();
        recorded_tx.send(recorded).ok();
    })
    .await;

    let mut session = client(url).connect("gemini-2.0-flash-live-001", LiveConnectConfig::default()).await.unwrap();
    assert_eq!(session.state(), SessionState::Active);

    let Some(ServerMessage::ToolCall(call)) = session.receive().await.unwrap() else {
        panic!("expected a tool call");
    };
    assert_eq!(call.function_calls[0].id.as_deref(), Some("call-1"));
    let cancellation = session.receive().await.unwrap();
    assert_eq!(cancellation, Some(ServerMessage::ToolCallCancellation { ids: vec!["never-issued".into()] }));

    session.send_client_content("first", false).await.unwrap();
    session
        .send_tool_response(vec![FunctionResponse::new("lookup", Default::default()).with_id("call-1")])
        .await
        .unwrap();
    session.send_client_content(vec![Part::text("second")], true).await.unwrap();

    let Some(ServerMessage::ServerContent(content)) = session.receive().await.unwrap() else {
        panic!("expected server content");
    };
    assert!(content.turn_complete);
    assert_eq!(content.text().unwrap().as_deref(), Some("done"));
    assert!(session.receive().await.unwrap().is_none());

    let recorded = recorded_rx.await.unwrap();
    let kinds: Vec<String> = recorded.iter().map(envelope_kind).collect();
    assert_eq!(kinds, ["clientContent", "toolResponse", "clientContent"]);
    assert_eq!(recorded[0]["clientContent"]["turns"][0]["parts"][0]["text"], "first");
    assert_eq!(recorded[0]["clientContent"]["turnComplete"], false);
    assert_eq!(recorded[1]["toolResponse"]["functionResponses"][0]["id"], "call-1");
    assert_eq!(recorded[2]["clientContent"]["turnComplete"], true);
}

#[tokio::test]
async fn split_halves_work_from_different_tasks() {
    let url = serve(|mut socket| async move {
        acknowledge_setup(&mut socket).await;
        let input = next_json(&mut socket).await.unwrap();
        assert_eq!(input["realtimeInput"]["mediaChunks"][0]["mimeType"], "audio/pcm;rate=16000");
        reply(
            &mut socket,
            json!({"serverContent": {"modelTurn": {"parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}}]}}}),
        )
        .await;
        reply(&mut socket, json!({"serverContent": {"interrupted": true}})).await;
        socket.close(None).await.ok();
    })
    .await;

    let session = client(url).connect("gemini-2.0-flash-live-001", LiveConnectConfig::default()).await.unwrap();
    let (sender, receiver) = session.split();

    let reader = tokio::spawn(async move {
        let messages: Vec<_> = receiver.into_stream().collect().await;
        messages.into_iter().collect::<Result<Vec<_>, _>>()
    });
    sender.send_realtime_input(genai::Blob::new("audio/pcm;rate=16000", vec![0u8; 32])).await.unwrap();

    let messages = reader.await.unwrap().unwrap();
    assert_eq!(messages.len(), 2);
    let ServerMessage::ServerContent(audio) = &messages[0] else {
        panic!("expected audio content");
    };
    assert_eq!(audio.data(), Some(vec![0, 0, 0]));
    let ServerMessage::ServerContent(interruption) = &messages[1] else {
        panic!("expected an interruption");
    };
    assert!(interruption.interrupted);
    assert!(!interruption.turn_complete);
}

#[tokio::test]
async fn closing_before_setup_complete_is_an_error() {
    let url = serve(|mut socket| async move {
        next_json(&mut socket).await;
        socket.close(None).await.ok();
    })
    .await;

    let err = client(url).connect("gemini-2.0-flash-live-001", LiveConnectConfig::default()).await.unwrap_err();
    assert!(matches!(err, LiveError::ClosedBeforeSetup), "{err}");
}

#[tokio::test]
async fn content_before_setup_complete_is_a_protocol_violation() {
    let url = serve(|mut socket| async move {
        next_json(&mut socket).await;
        reply(&mut socket, json!({"serverContent": {"turnComplete": true}})).await;
        next_json(&mut socket).await;
    })
    .await;

    let err = client(url).connect("gemini-2.0-flash-live-001", LiveConnectConfig::default()).await.unwrap_err();
    assert!(matches!(err, LiveError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn client_teardown_ends_the_session() {
    let url = serve(|mut socket| async move {
        acknowledge_setup(&mut socket).await;
        while next_json(&mut socket).await.is_some() {}
    })
    .await;

    let mut session = client(url).connect("gemini-2.0-flash-live-001", LiveConnectConfig::default()).await.unwrap();
    session.close().await.unwrap();

    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.receive().await.unwrap().is_none());
    let err = session.send_client_content("too late", true).await.unwrap_err();
    assert!(matches!(err, LiveError::NotActive(SessionState::Closed)), "{err}");
}

#[tokio::test]
async fn vertex_sessions_authenticate_and_use_qualified_models() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (header_tx, header_rx) = oneshot::channel();
    let (setup_tx, setup_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |request: &Request, response: Response| {
            let authorization = request
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            header_tx.send(authorization).ok();
            Ok(response)
        };
        let mut socket = accept_hdr_async(stream, callback).await.unwrap();
        setup_tx.send(acknowledge_setup(&mut socket).await).ok();
        while next_json(&mut socket).await.is_some() {}
    });

    let endpoint = Url::parse(&format!("ws://{addr}/live")).unwrap();
    let session = LiveClient::vertex("my-project", "us-central1", "token")
        .with_endpoint(endpoint)
        .connect("gemini-2.0-flash-live-preview-04-09", LiveConnectConfig::default().with_voice("Aoede"))
        .await
        .unwrap();

    assert_eq!(header_rx.await.unwrap().as_deref(), Some("Bearer token"));
    let setup = setup_rx.await.unwrap();
    assert_eq!(
        setup["setup"]["model"],
        "projects/my-project/locations/us-central1/publishers/google/models/gemini-2.0-flash-live-preview-04-09"
    );
    assert_eq!(
        setup["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Aoede"
    );
    session.close().await.unwrap();
}
