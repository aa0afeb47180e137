use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::Snafu;
use url::Url;

use crate::backend::BackendKind;
use crate::generation::GenerateContentResponse;

/// Structured status object returned by both backends on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Value>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiStatus,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid argument: {message}"))]
    InvalidArgument { message: String },

    #[snafu(display("not found: {message}"))]
    NotFound { message: String },

    #[snafu(display("already exists: {message}"))]
    AlreadyExists { message: String },

    #[snafu(display("permission denied: {message}"))]
    PermissionDenied { message: String },

    #[snafu(display("failed precondition: {message}"))]
    FailedPrecondition { message: String },

    /// The response did not fit the requested schema. When the mismatch was
    /// found while decoding a `generateContent` reply, `response` keeps the
    /// undecoded reply.
    #[snafu(display("response does not match the requested schema: {message}"))]
    SchemaMismatch {
        message: String,
        response: Option<Box<GenerateContentResponse>>,
    },

    #[snafu(display("{operation} not supported on {backend}"))]
    UnsupportedOnBackend {
        operation: String,
        backend: BackendKind,
    },

    #[snafu(display("API error {code} ({status}): {message}"))]
    Api {
        code: u16,
        status: String,
        message: String,
        details: Vec<Value>,
    },

    #[snafu(display(
        "bad response from server; code {code}; description: {}",
        description.as_deref().unwrap_or("none")
    ))]
    BadResponse {
        code: u16,
        description: Option<String>,
    },

    #[snafu(display("failed to perform request to '{url}'"))]
    PerformRequest { source: reqwest::Error, url: Url },

    #[snafu(display("failed to build HTTP client"))]
    BuildHttpClient { source: reqwest::Error },

    #[snafu(display("failed to read response body"))]
    ReadBody { source: reqwest::Error },

    #[snafu(display("failed to parse server-sent event: {message}"))]
    BadPart { message: String },

    #[snafu(display("failed to deserialize JSON response"))]
    Deserialize { source: serde_json::Error },

    #[snafu(display("failed to serialize request body"))]
    Serialize { source: serde_json::Error },

    #[snafu(display("failed to construct URL (probably incorrect model name): {suffix}"))]
    ConstructUrl {
        source: url::ParseError,
        suffix: String,
    },

    #[snafu(display("invalid header value for '{name}'"))]
    InvalidHeader {
        source: reqwest::header::InvalidHeaderValue,
        name: String,
    },

    #[snafu(display("client configuration error: {message}"))]
    Configuration { message: String },

    #[snafu(display("unexpected response shape for {operation}"))]
    UnexpectedResponse { operation: String },

    #[snafu(display("I/O error during file operations"))]
    Io { source: std::io::Error },
}

impl Error {
    /// Maps a non-2xx response onto the error taxonomy.
    ///
    /// The structured `status` string wins over the HTTP code; bodies that are
    /// not a status envelope fall back to [`Error::BadResponse`].
    pub fn from_response(code: u16, body: &[u8], backend: BackendKind) -> Self {
        match serde_json::from_slice::<ErrorEnvelope>(body) {
            Ok(envelope) => Self::from_status(code, envelope.error, backend),
            Err(_) => Error::BadResponse {
                code,
                description: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
            },
        }
    }

    pub fn from_status(code: u16, status: ApiStatus, backend: BackendKind) -> Self {
        let ApiStatus { message, status: label, details, .. } = status;
        match (label.as_deref(), code) {
            (Some("INVALID_ARGUMENT"), _) | (None, 400) => Error::InvalidArgument { message },
            (Some("NOT_FOUND"), _) | (None, 404) => Error::NotFound { message },
            (Some("ALREADY_EXISTS"), _) | (None, 409) => Error::AlreadyExists { message },
            (Some("PERMISSION_DENIED"), _) | (None, 403) => Error::PermissionDenied { message },
            (Some("FAILED_PRECONDITION"), _) | (None, 412) => Error::FailedPrecondition { message },
            (Some("UNIMPLEMENTED"), _) | (None, 501) => {
                Error::UnsupportedOnBackend { operation: message, backend }
            }
            (label, code) => Error::Api {
                code,
                status: label.unwrap_or("UNKNOWN").to_string(),
                message,
                details,
            },
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedOnBackend { .. })
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Error::SchemaMismatch { .. })
    }

    /// The reply that failed schema validation, if this error carries one.
    pub fn mismatched_response(&self) -> Option<&GenerateContentResponse> {
        match self {
            Error::SchemaMismatch { response, .. } => response.as_deref(),
            _ => None,
        }
    }

    /// HTTP-style status code for errors that originate from the backend.
    pub fn code(&self) -> Option<u16> {
        match self {
            Error::Api { code, .. } | Error::BadResponse { code, .. } => Some(*code),
            Error::NotFound { .. } => Some(404),
            Error::AlreadyExists { .. } => Some(409),
            Error::PermissionDenied { .. } => Some(403),
            _ => None,
        }
    }
}

pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
    Error::InvalidArgument { message: message.into() }
}

pub(crate) fn unsupported(operation: impl Into<String>, backend: BackendKind) -> Error {
    Error::UnsupportedOnBackend { operation: operation.into(), backend }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn status_label_takes_precedence_over_http_code() {
        let err = Error::from_response(
            400,
            &body(json!({"error": {"code": 400, "message": "gone", "status": "NOT_FOUND"}})),
            BackendKind::Vertex,
        );
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn falls_back_to_http_code_without_label() {
        let err = Error::from_response(
            403,
            &body(json!({"error": {"code": 403, "message": "no"}})),
            BackendKind::Studio,
        );
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[test]
    fn unimplemented_becomes_unsupported_on_backend() {
        let err = Error::from_response(
            501,
            &body(json!({"error": {"code": 501, "message": "batch", "status": "UNIMPLEMENTED"}})),
            BackendKind::Studio,
        );
        assert!(err.is_unsupported());
    }

    #[test]
    fn unknown_status_keeps_details() {
        let err = Error::from_response(
            429,
            &body(json!({"error": {
                "code": 429,
                "message": "quota",
                "status": "RESOURCE_EXHAUSTED",
                "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo"}]
            }})),
            BackendKind::Vertex,
        );
        match err {
            Error::Api { code, status, details, .. } => {
                assert_eq!(code, 429);
                assert_eq!(status, "RESOURCE_EXHAUSTED");
                assert_eq!(details.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_json_body_is_bad_response() {
        let err = Error::from_response(502, b"upstream down", BackendKind::Studio);
        assert!(matches!(err, Error::BadResponse { code: 502, description: Some(_) }));
    }
}
