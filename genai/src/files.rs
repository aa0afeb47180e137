//! Files uploaded to the Gemini Developer API.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::error::ApiStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    #[default]
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// int64 on the wire, carried as a decimal string.
    #[serde(default, deserialize_with = "int64", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub state: FileState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiStatus>,
}

fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// What to upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadFileConfig {
    /// Resource name to request, e.g. `files/my-file`.
    pub name: Option<String>,
    /// Guessed from the path when absent; required for byte uploads.
    pub mime_type: Option<String>,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_accepts_string_and_number() {
        let file: File = serde_json::from_value(serde_json::json!({
            "name": "files/abc",
            "sizeBytes": "1024",
            "state": "ACTIVE",
            "createTime": "2024-12-20T00:00:00.123456Z"
        }))
        .unwrap();
        assert_eq!(file.size_bytes, Some(1024));
        assert_eq!(file.state, FileState::Active);
        assert!(file.create_time.is_some());

        let file: File = serde_json::from_value(serde_json::json!({"sizeBytes": 7})).unwrap();
        assert_eq!(file.size_bytes, Some(7));
    }
}
