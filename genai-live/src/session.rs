//! WebSocket transport for live sessions.

use std::sync::{Arc, LazyLock};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use genai::backend::BackendKind;
use genai::coerce::coerce_contents;
use genai::resource::{ResourceKind, Target, resolve, vertex_full_path};
use genai::{Blob, ContentUnion, FunctionResponse};
use parking_lot::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{LiveError, Result};
use crate::messages::{ClientMessage, LiveConnectConfig, ServerMessage};
use crate::protocol::{Protocol, SessionState};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

static STUDIO_LIVE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse(
        "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent",
    )
    .expect("unreachable error: failed to parse live endpoint")
});

/// Live endpoint of the Gemini Developer API, authenticated by `api_key`.
pub fn studio_url(api_key: &str) -> Url {
    let mut url = STUDIO_LIVE_URL.clone();
    url.query_pairs_mut().append_pair("key", api_key);
    url
}

/// Live endpoint of Vertex AI in `location`.
pub fn vertex_url(location: &str) -> Result<Url> {
    if location.is_empty() {
        return Err(LiveError::connection("Vertex AI location must not be empty"));
    }
    let url = format!(
        "wss://{location}-aiplatform.googleapis.com/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent"
    );
    Url::parse(&url).map_err(|e| LiveError::connection(format!("invalid live endpoint for location '{location}': {e}")))
}

#[derive(Clone)]
enum Auth {
    ApiKey(String),
    Vertex { project: String, location: String, access_token: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::ApiKey(_) => f.write_str("ApiKey(..)"),
            Auth::Vertex { project, location, .. } => {
                f.debug_struct("Vertex").field("project", project).field("location", location).finish_non_exhaustive()
            }
        }
    }
}

/// Opens live sessions against one backend.
#[derive(Debug, Clone)]
pub struct LiveClient {
    auth: Auth,
    endpoint: Option<Url>,
}

impl LiveClient {
    pub fn studio(api_key: impl Into<String>) -> Self {
        Self { auth: Auth::ApiKey(api_key.into()), endpoint: None }
    }

    pub fn vertex(project: impl Into<String>, location: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            auth: Auth::Vertex { project: project.into(), location: location.into(), access_token: access_token.into() },
            endpoint: None,
        }
    }

    /// Replaces the default endpoint, e.g. to go through a proxy.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn backend(&self) -> BackendKind {
        match self.auth {
            Auth::ApiKey(_) => BackendKind::Studio,
            Auth::Vertex { .. } => BackendKind::Vertex,
        }
    }

    /// Model name as the `setup` envelope expects it: `models/{id}` on
    /// Studio and the fully qualified publisher path on Vertex.
    pub fn setup_model(&self, model: &str) -> Result<String> {
        match &self.auth {
            Auth::ApiKey(_) => Ok(resolve(ResourceKind::Model, model, Target::Studio)?),
            Auth::Vertex { project, location, .. } => {
                let target = Target::Vertex { project: project.as_str(), location: location.as_str() };
                let model = resolve(ResourceKind::Model, model, target)?;
                Ok(vertex_full_path(&model, project, location))
            }
        }
    }

    fn endpoint(&self) -> Result<Url> {
        match (&self.auth, &self.endpoint) {
            (Auth::ApiKey(key), Some(endpoint)) => {
                let mut url = endpoint.clone();
                url.query_pairs_mut().append_pair("key", key);
                Ok(url)
            }
            (Auth::ApiKey(key), None) => Ok(studio_url(key)),
            (Auth::Vertex { .. }, Some(endpoint)) => Ok(endpoint.clone()),
            (Auth::Vertex { location, .. }, None) => vertex_url(location),
        }
    }

    /// Connects, sends `setup` and waits for the server's acknowledgment.
    #[instrument(skip_all, fields(model = model, backend = %self.backend()), err)]
    pub async fn connect(&self, model: &str, config: LiveConnectConfig) -> Result<LiveSession> {
        let setup = ClientMessage::Setup { model: self.setup_model(model)?, config };

        let mut request = self
            .endpoint()?
            .as_str()
            .into_client_request()
            .map_err(|e| LiveError::connection(format!("failed to create client request: {e}")))?;
        if let Auth::Vertex { access_token, .. } = &self.auth {
            let value = HeaderValue::from_str(&format!("Bearer {access_token}"))
                .map_err(|e| LiveError::connection(format!("invalid auth token header: {e}")))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (stream, _response) =
            connect_async(request).await.map_err(|e| LiveError::connection(format!("websocket connect error: {e}")))?;
        let (sink, source) = stream.split();

        let session_id: Arc<str> = uuid::Uuid::new_v4().to_string().into();
        let protocol = Arc::new(Mutex::new(Protocol::new()));
        let sender = LiveSender {
            session_id: session_id.clone(),
            backend: self.backend(),
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            protocol: protocol.clone(),
        };
        let mut receiver = LiveReceiver { session_id: session_id.clone(), source, protocol };

        sender.send(setup).await?;
        match receiver.receive().await? {
            Some(ServerMessage::SetupComplete) => {}
            _ => return Err(LiveError::ClosedBeforeSetup),
        }
        info!(session_id = %session_id, "live session established");

        Ok(LiveSession { session_id, sender, receiver })
    }
}

/// An established live session.
///
/// Use [`LiveSession::split`] to send and receive from different tasks.
#[derive(Debug)]
pub struct LiveSession {
    session_id: Arc<str>,
    sender: LiveSender,
    receiver: LiveReceiver,
}

impl LiveSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.sender.state()
    }

    pub fn sender(&self) -> &LiveSender {
        &self.sender
    }

    pub fn split(self) -> (LiveSender, LiveReceiver) {
        (self.sender, self.receiver)
    }

    pub async fn send_client_content(&self, turns: impl Into<ContentUnion>, turn_complete: bool) -> Result<()> {
        self.sender.send_client_content(turns, turn_complete).await
    }

    pub async fn send_realtime_input(&self, chunk: Blob) -> Result<()> {
        self.sender.send_realtime_input(chunk).await
    }

    pub async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> Result<()> {
        self.sender.send_tool_response(responses).await
    }

    pub async fn receive(&mut self) -> Result<Option<ServerMessage>> {
        self.receiver.receive().await
    }

    pub async fn close(&self) -> Result<()> {
        self.sender.close().await
    }
}

/// Sending half of a session. Clones share the socket; messages are
/// transmitted in the order their sends acquire it.
#[derive(Clone)]
pub struct LiveSender {
    session_id: Arc<str>,
    backend: BackendKind,
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    protocol: Arc<Mutex<Protocol>>,
}

impl std::fmt::Debug for LiveSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSender")
            .field("session_id", &self.session_id)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl LiveSender {
    pub fn state(&self) -> SessionState {
        self.protocol.lock().state()
    }

    pub async fn send(&self, message: ClientMessage) -> Result<()> {
        let payload = serde_json::to_string(&message.to_wire(self.backend)?)?;
        let mut sink = self.sink.lock().await;
        self.protocol.lock().on_send(&message)?;
        debug!(session_id = %self.session_id, kind = message.kind(), payload = %payload, "sending live message");
        sink.send(Message::text(payload))
            .await
            .map_err(|e| LiveError::connection(format!("failed to send {}: {e}", message.kind())))
    }

    pub async fn send_client_content(&self, turns: impl Into<ContentUnion>, turn_complete: bool) -> Result<()> {
        let turns = coerce_contents(turns)?;
        self.send(ClientMessage::ClientContent { turns, turn_complete }).await
    }

    pub async fn send_realtime_input(&self, chunk: Blob) -> Result<()> {
        self.send(ClientMessage::RealtimeInput { media_chunks: vec![chunk] }).await
    }

    pub async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> Result<()> {
        self.send(ClientMessage::ToolResponse { function_responses: responses }).await
    }

    /// Closes the socket. The receiving half ends with `None`.
    pub async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        match sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {}
            Err(e) => return Err(LiveError::connection(format!("failed to close session: {e}"))),
        }
        self.protocol.lock().on_close()?;
        info!(session_id = %self.session_id, "live session closed");
        Ok(())
    }
}

/// Receiving half of a session.
pub struct LiveReceiver {
    session_id: Arc<str>,
    source: WsSource,
    protocol: Arc<Mutex<Protocol>>,
}

impl std::fmt::Debug for LiveReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveReceiver").field("session_id", &self.session_id).finish_non_exhaustive()
    }
}

impl LiveReceiver {
    /// Next server message, or `None` once the session has ended.
    pub async fn receive(&mut self) -> Result<Option<ServerMessage>> {
        if self.protocol.lock().state() == SessionState::Closed {
            return Ok(None);
        }
        loop {
            let message = match self.source.next().await {
                Some(Ok(Message::Text(text))) => {
                    debug!(session_id = %self.session_id, payload = %text.as_str(), "received live message");
                    ServerMessage::from_slice(text.as_bytes())?
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(session_id = %self.session_id, payload = %String::from_utf8_lossy(&data), "received live message");
                    ServerMessage::from_slice(&data)?
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(session_id = %self.session_id, ?frame, "server closed the session");
                    self.protocol.lock().on_close()?;
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) if is_closure(&e) => {
                    debug!(session_id = %self.session_id, error = %e, "connection dropped");
                    self.protocol.lock().on_close()?;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.protocol.lock().on_close().ok();
                    return Err(LiveError::connection(format!("websocket error: {e}")));
                }
                None => {
                    self.protocol.lock().on_close()?;
                    return Ok(None);
                }
            };
            self.protocol.lock().on_receive(&message)?;
            return Ok(Some(message));
        }
    }

    /// Server messages as a stream that ends with the session.
    pub fn into_stream(self) -> impl Stream<Item = Result<ServerMessage>> {
        futures::stream::unfold(Some(self), |receiver| async move {
            let mut receiver = receiver?;
            match receiver.receive().await {
                Ok(Some(message)) => Some((Ok(message), Some(receiver))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

fn is_closure(error: &WsError) -> bool {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn studio_url_carries_the_key() {
        let url = studio_url("secret");
        assert_eq!(url.host_str(), Some("generativelanguage.googleapis.com"));
        assert!(url.path().ends_with("GenerativeService.BidiGenerateContent"));
        assert_eq!(url.query(), Some("key=secret"));
    }

    #[test]
    fn setup_model_is_qualified_on_vertex() {
        let client = LiveClient::vertex("my-project", "europe-west4", "token");
        assert_eq!(
            client.setup_model("gemini-2.0-flash-live-001").unwrap(),
            "projects/my-project/locations/europe-west4/publishers/google/models/gemini-2.0-flash-live-001"
        );
        assert_eq!(
            LiveClient::studio("key").setup_model("gemini-2.0-flash-live-001").unwrap(),
            "models/gemini-2.0-flash-live-001"
        );
    }

    #[test]
    fn custom_endpoints_keep_the_api_key() {
        let client = LiveClient::studio("k").with_endpoint(Url::parse("ws://127.0.0.1:9000/live").unwrap());
        assert_eq!(client.endpoint().unwrap().as_str(), "ws://127.0.0.1:9000/live?key=k");
        assert!(!format!("{client:?}").contains("\"k\""));
    }
}
