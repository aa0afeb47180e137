//! # Canonical value model
//!
//! The building blocks every request and response is expressed in:
//!
//! - [`Role`] - the speaker of a [`Content`] (user or model)
//! - [`Part`] - one fragment of a message; exactly one variant per part
//! - [`Blob`] - inline bytes with a MIME type, base64 on the wire
//! - [`Content`] - ordered parts plus an optional role
//!
//! Wire encoding is shared by both backends. Backend-specific restrictions
//! (for example video metadata on the Developer API) are enforced by the
//! transcoders in [`crate::backend`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, invalid_argument};

/// Role of a message in a conversation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// Message from the user
    User,
    /// Message from the model
    Model,
}

/// Inline binary data with its MIME type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    #[serde(with = "crate::common::base64_bytes")]
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { mime_type: mime_type.into(), data: data.into() }
    }
}

/// Reference to a file stored by the service (uploaded file or `gs://` object)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub file_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self { id: None, name: name.into(), args }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub response: Map<String, Value>,
}

impl FunctionResponse {
    pub fn new(name: impl Into<String>, response: Map<String, Value>) -> Self {
        Self { id: None, name: name.into(), response }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutableCode {
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "PYTHON".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeExecutionResult {
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Offsets into a referenced video, as protobuf duration strings (`"1.5s"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_offset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_offset: Option<String>,
}

/// One fragment of a [`Content`].
///
/// Exactly one variant is populated per part. Decoding a part object with
/// zero or several populated fields fails with [`Error::InvalidArgument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePart", into = "WirePart")]
pub enum Part {
    Text {
        text: String,
        /// Set on thought summaries emitted by thinking models
        thought: Option<bool>,
    },
    InlineData(Blob),
    FileData(FileData),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
    ExecutableCode(ExecutableCode),
    CodeExecutionResult(CodeExecutionResult),
    VideoMetadata(VideoMetadata),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into(), thought: None }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Part::InlineData(Blob::new(mime_type, data))
    }

    pub fn file_data(file_uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Part::FileData(FileData { file_uri: file_uri.into(), mime_type: Some(mime_type.into()) })
    }

    pub fn function_call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Part::FunctionCall(FunctionCall::new(name, args))
    }

    pub fn function_response(name: impl Into<String>, response: Map<String, Value>) -> Self {
        Part::FunctionResponse(FunctionResponse::new(name, response))
    }

    /// Wire name of the populated variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Part::Text { .. } => "text",
            Part::InlineData(_) => "inlineData",
            Part::FileData(_) => "fileData",
            Part::FunctionCall(_) => "functionCall",
            Part::FunctionResponse(_) => "functionResponse",
            Part::ExecutableCode(_) => "executableCode",
            Part::CodeExecutionResult(_) => "codeExecutionResult",
            Part::VideoMetadata(_) => "videoMetadata",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_thought(&self) -> bool {
        matches!(self, Part::Text { thought: Some(true), .. })
    }

    /// Decodes a loose JSON mapping, enforcing the one-of-N rule.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let wire: WirePart = serde_json::from_value(value)
            .map_err(|e| invalid_argument(format!("malformed part: {e}")))?;
        Part::try_from(wire)
    }
}

impl From<&str> for Part {
    fn from(text: &str) -> Self {
        Part::text(text)
    }
}

impl From<String> for Part {
    fn from(text: String) -> Self {
        Part::text(text)
    }
}

impl From<FunctionCall> for Part {
    fn from(call: FunctionCall) -> Self {
        Part::FunctionCall(call)
    }
}

impl From<FunctionResponse> for Part {
    fn from(response: FunctionResponse) -> Self {
        Part::FunctionResponse(response)
    }
}

/// Flat wire form of [`Part`]; every variant is an optional sibling field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    executable_code: Option<ExecutableCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code_execution_result: Option<CodeExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    video_metadata: Option<VideoMetadata>,
}

impl WirePart {
    fn populated(&self) -> Vec<&'static str> {
        let fields = [
            ("text", self.text.is_some()),
            ("inlineData", self.inline_data.is_some()),
            ("fileData", self.file_data.is_some()),
            ("functionCall", self.function_call.is_some()),
            ("functionResponse", self.function_response.is_some()),
            ("executableCode", self.executable_code.is_some()),
            ("codeExecutionResult", self.code_execution_result.is_some()),
            ("videoMetadata", self.video_metadata.is_some()),
        ];
        fields.into_iter().filter(|(_, set)| *set).map(|(name, _)| name).collect()
    }

    fn is_empty(&self) -> bool {
        self.populated().is_empty()
    }
}

impl TryFrom<WirePart> for Part {
    type Error = Error;

    fn try_from(wire: WirePart) -> Result<Self, Self::Error> {
        let populated = wire.populated();
        let malformed = || {
            invalid_argument(format!(
                "a part must have exactly one populated field, found {}: [{}]",
                populated.len(),
                populated.join(", ")
            ))
        };
        if populated.len() != 1 {
            return Err(malformed());
        }
        let part = if let Some(text) = wire.text {
            Part::Text { text, thought: wire.thought }
        } else if let Some(blob) = wire.inline_data {
            Part::InlineData(blob)
        } else if let Some(file) = wire.file_data {
            Part::FileData(file)
        } else if let Some(call) = wire.function_call {
            Part::FunctionCall(call)
        } else if let Some(response) = wire.function_response {
            Part::FunctionResponse(response)
        } else if let Some(code) = wire.executable_code {
            Part::ExecutableCode(code)
        } else if let Some(result) = wire.code_execution_result {
            Part::CodeExecutionResult(result)
        } else if let Some(video) = wire.video_metadata {
            Part::VideoMetadata(video)
        } else {
            return Err(malformed());
        };
        Ok(part)
    }
}

impl From<Part> for WirePart {
    fn from(part: Part) -> Self {
        let mut wire = WirePart::default();
        match part {
            Part::Text { text, thought } => {
                wire.text = Some(text);
                wire.thought = thought;
            }
            Part::InlineData(blob) => wire.inline_data = Some(blob),
            Part::FileData(file) => wire.file_data = Some(file),
            Part::FunctionCall(call) => wire.function_call = Some(call),
            Part::FunctionResponse(response) => wire.function_response = Some(response),
            Part::ExecutableCode(code) => wire.executable_code = Some(code),
            Part::CodeExecutionResult(result) => wire.code_execution_result = Some(result),
            Part::VideoMetadata(video) => wire.video_metadata = Some(video),
        }
        wire
    }
}

/// Content of a message
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "lenient_parts")]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Option<Role>, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn user(parts: impl IntoIterator<Item = Part>) -> Self {
        Self { role: Some(Role::User), parts: parts.into_iter().collect() }
    }

    pub fn model(parts: impl IntoIterator<Item = Part>) -> Self {
        Self { role: Some(Role::Model), parts: parts.into_iter().collect() }
    }

    /// A role-less content holding a single text part
    pub fn text(text: impl Into<String>) -> Self {
        Self { role: None, parts: vec![Part::text(text)] }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn push(&mut self, part: impl Into<Part>) {
        self.parts.push(part.into());
    }
}

// Responses occasionally carry empty part objects (e.g. a bare
// `thoughtSignature`); they are dropped instead of failing the whole response.
fn lenient_parts<'de, D>(deserializer: D) -> Result<Vec<Part>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire = Option::<Vec<WirePart>>::deserialize(deserializer)?.unwrap_or_default();
    let mut parts = Vec::with_capacity(wire.len());
    for part in wire {
        if part.is_empty() {
            tracing::debug!("dropping empty part from response content");
            continue;
        }
        parts.push(Part::try_from(part).map_err(serde::de::Error::custom)?);
    }
    Ok(parts)
}
