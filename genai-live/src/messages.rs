//! Client and server envelopes of the live protocol.
//!
//! Every frame is a JSON object with exactly one top-level key naming the
//! envelope (`setup`, `clientContent`, `serverContent`, ...). Client
//! envelopes are encoded per backend since `setup` reuses the request
//! transcoder's fragments for tools and instructions.

use genai::backend::{BackendKind, fragments};
use genai::generation::{GenerationConfig, Modality, SpeechConfig, text_of};
use genai::{Blob, Content, ContentUnion, FunctionCall, FunctionResponse, Part, Tool};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::{LiveError, Result};

/// Session configuration carried by the `setup` envelope.
///
/// `response_modalities` and `speech_config` take precedence over the same
/// fields of `generation_config`.
#[derive(Debug, Clone, Default)]
pub struct LiveConnectConfig {
    pub generation_config: Option<GenerationConfig>,
    pub response_modalities: Option<Vec<Modality>>,
    pub speech_config: Option<SpeechConfig>,
    pub system_instruction: Option<ContentUnion>,
    pub tools: Option<Vec<Tool>>,
}

impl LiveConnectConfig {
    pub fn with_response_modalities(mut self, modalities: impl IntoIterator<Item = Modality>) -> Self {
        self.response_modalities = Some(modalities.into_iter().collect());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.speech_config = Some(SpeechConfig::voice(voice));
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<ContentUnion>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Tool>) -> Self {
        self.tools = Some(tools.into_iter().collect());
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    fn effective_generation_config(&self) -> GenerationConfig {
        let mut config = self.generation_config.clone().unwrap_or_default();
        if let Some(modalities) = &self.response_modalities {
            config.response_modalities = Some(modalities.clone());
        }
        if let Some(speech) = &self.speech_config {
            config.speech_config = Some(speech.clone());
        }
        config
    }
}

/// A message sent by the client.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Must be the first message of a session. `model` is already resolved
    /// for the target backend.
    Setup { model: String, config: LiveConnectConfig },
    /// Turn-based content. Generation starts once `turn_complete` is set.
    ClientContent { turns: Vec<Content>, turn_complete: bool },
    /// Continuous media input without turn boundaries.
    RealtimeInput { media_chunks: Vec<Blob> },
    /// Answers to previously issued tool calls, keyed by call id.
    ToolResponse { function_responses: Vec<FunctionResponse> },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Setup { .. } => "setup",
            ClientMessage::ClientContent { .. } => "clientContent",
            ClientMessage::RealtimeInput { .. } => "realtimeInput",
            ClientMessage::ToolResponse { .. } => "toolResponse",
        }
    }

    /// Encodes the envelope for `backend`.
    pub fn to_wire(&self, backend: BackendKind) -> Result<Value> {
        let body = match self {
            ClientMessage::Setup { model, config } => {
                let mut setup = Map::new();
                setup.insert("model".into(), Value::String(model.clone()));
                let generation_config = fragments::generation_config(&config.effective_generation_config(), backend)?;
                if generation_config.as_object().is_some_and(|fields| !fields.is_empty()) {
                    setup.insert("generationConfig".into(), generation_config);
                }
                let instruction = fragments::instruction(config.system_instruction.as_ref(), backend)?;
                if !instruction.is_null() {
                    setup.insert("systemInstruction".into(), instruction);
                }
                let tools = fragments::tools(config.tools.as_deref(), backend)?;
                if !tools.is_null() {
                    setup.insert("tools".into(), tools);
                }
                Value::Object(setup)
            }
            ClientMessage::ClientContent { turns, turn_complete } => json!({
                "turns": fragments::contents(turns, backend)?,
                "turnComplete": turn_complete,
            }),
            ClientMessage::RealtimeInput { media_chunks } => json!({ "mediaChunks": serde_json::to_value(media_chunks)? }),
            ClientMessage::ToolResponse { function_responses } => {
                json!({ "functionResponses": serde_json::to_value(function_responses)? })
            }
        };
        let mut envelope = Map::new();
        envelope.insert(self.kind().into(), body);
        Ok(Value::Object(envelope))
    }
}

/// Incremental model output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    /// The client should drop any buffered playback.
    #[serde(default)]
    pub interrupted: bool,
}

impl ServerContent {
    /// Text of the model turn, with the same rules as
    /// [`genai::GenerateContentResponse::text`].
    pub fn text(&self) -> std::result::Result<Option<String>, genai::Error> {
        match &self.model_turn {
            Some(content) => text_of(&content.parts),
            None => Ok(None),
        }
    }

    /// Concatenated inline bytes of the model turn, `None` when there are none.
    pub fn data(&self) -> Option<Vec<u8>> {
        let mut data: Option<Vec<u8>> = None;
        for part in self.model_turn.iter().flat_map(|content| &content.parts) {
            if let Part::InlineData(blob) = part {
                data.get_or_insert_with(Vec::new).extend_from_slice(&blob.data);
            }
        }
        data
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// A message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    SetupComplete,
    ServerContent(ServerContent),
    ToolCall(ToolCall),
    /// Withdraws unanswered tool calls.
    ToolCallCancellation { ids: Vec<String> },
    /// An envelope this crate does not model, kept verbatim.
    Unknown(Value),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::SetupComplete => "setupComplete",
            ServerMessage::ServerContent(_) => "serverContent",
            ServerMessage::ToolCall(_) => "toolCall",
            ServerMessage::ToolCallCancellation { .. } => "toolCallCancellation",
            ServerMessage::Unknown(_) => "unknown",
        }
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Self::from_value(serde_json::from_slice(payload)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut envelope) = value else {
            return Err(LiveError::protocol("server message is not a JSON object"));
        };
        if envelope.contains_key("setupComplete") {
            return Ok(ServerMessage::SetupComplete);
        }
        if let Some(content) = envelope.remove("serverContent") {
            return Ok(ServerMessage::ServerContent(serde_json::from_value(content)?));
        }
        if let Some(call) = envelope.remove("toolCall") {
            return Ok(ServerMessage::ToolCall(serde_json::from_value(call)?));
        }
        if let Some(cancellation) = envelope.remove("toolCallCancellation") {
            return Ok(ServerMessage::ToolCallCancellation { ids: cancellation_ids(&cancellation)? });
        }
        Ok(ServerMessage::Unknown(Value::Object(envelope)))
    }
}

fn cancellation_ids(cancellation: &Value) -> Result<Vec<String>> {
    let Some(ids) = cancellation.get("ids") else {
        return Ok(Vec::new());
    };
    let Value::Array(ids) = ids else {
        return Err(LiveError::protocol("toolCallCancellation.ids is not an array"));
    };
    ids.iter()
        .map(|id| match id {
            Value::String(id) => Ok(id.clone()),
            Value::Number(id) => Ok(id.to_string()),
            other => Err(LiveError::protocol(format!("invalid tool call id: {other}"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use genai::FunctionDeclaration;

    #[test]
    fn setup_merges_modalities_into_generation_config() {
        let config = LiveConnectConfig::default()
            .with_generation_config(GenerationConfig { temperature: Some(0.5), ..Default::default() })
            .with_response_modalities([Modality::Audio])
            .with_voice("Puck")
            .with_system_instruction("Be brief.");
        let message = ClientMessage::Setup { model: "models/gemini-2.0-flash-live-001".into(), config };

        let wire = message.to_wire(BackendKind::Studio).unwrap();

        let setup = &wire["setup"];
        assert_eq!(setup["model"], "models/gemini-2.0-flash-live-001");
        assert_eq!(setup["generationConfig"]["temperature"], 0.5);
        assert_eq!(setup["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert!(setup.get("tools").is_none());
    }

    #[test]
    fn setup_encodes_tools_per_backend() {
        let tool = Tool::functions([FunctionDeclaration::new("lookup", "Looks something up")]);
        let config = LiveConnectConfig::default().with_tools([tool]);
        let message = ClientMessage::Setup { model: "models/m".into(), config };

        let wire = message.to_wire(BackendKind::Vertex).unwrap();
        assert_eq!(wire["setup"]["tools"][0]["functionDeclarations"][0]["name"], "lookup");
        assert!(wire["setup"].get("generationConfig").is_none());
    }

    #[test]
    fn realtime_input_is_base64_media_chunks() {
        let message = ClientMessage::RealtimeInput { media_chunks: vec![Blob::new("audio/pcm;rate=16000", [1u8, 2, 3])] };
        let wire = message.to_wire(BackendKind::Studio).unwrap();
        assert_eq!(wire, json!({"realtimeInput": {"mediaChunks": [{"mimeType": "audio/pcm;rate=16000", "data": "AQID"}]}}));
    }

    #[test]
    fn tool_response_keeps_call_ids() {
        let mut result = Map::new();
        result.insert("temperature".into(), json!(21));
        let message = ClientMessage::ToolResponse {
            function_responses: vec![FunctionResponse::new("weather", result).with_id("call-1")],
        };
        let wire = message.to_wire(BackendKind::Studio).unwrap();
        assert_eq!(wire["toolResponse"]["functionResponses"][0]["id"], "call-1");
        assert_eq!(wire["toolResponse"]["functionResponses"][0]["response"]["temperature"], 21);
    }

    #[test]
    fn server_content_flags_default_to_false() {
        let message = ServerMessage::from_value(json!({
            "serverContent": {"modelTurn": {"role": "model", "parts": [{"text": "Hi"}, {"text": " there"}]}}
        }))
        .unwrap();
        let ServerMessage::ServerContent(content) = message else {
            panic!("unexpected message: {message:?}");
        };
        assert!(!content.turn_complete);
        assert!(!content.interrupted);
        assert_eq!(content.text().unwrap().as_deref(), Some("Hi there"));
        assert_eq!(content.data(), None);
    }

    #[test]
    fn server_content_data_concatenates_inline_parts() {
        let message = ServerMessage::from_value(json!({
            "serverContent": {"modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm", "data": "AQI="}},
                {"inlineData": {"mimeType": "audio/pcm", "data": "Aw=="}}
            ]}}
        }))
        .unwrap();
        let ServerMessage::ServerContent(content) = message else {
            panic!("unexpected message: {message:?}");
        };
        assert_eq!(content.data(), Some(vec![1, 2, 3]));
        assert_eq!(content.text().unwrap(), None);
    }

    #[test]
    fn cancellation_ids_accept_strings_and_numbers() {
        let message = ServerMessage::from_value(json!({"toolCallCancellation": {"ids": ["a", 7]}})).unwrap();
        assert_eq!(message, ServerMessage::ToolCallCancellation { ids: vec!["a".into(), "7".into()] });
    }

    #[test]
    fn unknown_envelopes_are_preserved() {
        let message = ServerMessage::from_value(json!({"usageMetadata": {"totalTokenCount": 3}})).unwrap();
        assert_eq!(message.kind(), "unknown");
        assert!(ServerMessage::from_value(json!([1, 2])).is_err());
    }
}
