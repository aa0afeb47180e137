use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::coerce::ContentUnion;
use crate::tools::{Tool, ToolConfig};

/// Optional parameters for creating a cached content.
///
/// `ttl` and `expire_time` are alternatives. When both are set the request
/// carries `expire_time` and a diagnostic records that `ttl` was ignored.
#[derive(Debug, Clone, Default)]
pub struct CreateCachedContentConfig {
    /// Protobuf duration, e.g. `"86400s"`.
    pub ttl: Option<String>,
    pub expire_time: Option<OffsetDateTime>,
    pub display_name: Option<String>,
    pub contents: Option<ContentUnion>,
    pub system_instruction: Option<ContentUnion>,
    pub tools: Option<Vec<Tool>>,
    pub tool_config: Option<ToolConfig>,
}

impl CreateCachedContentConfig {
    pub fn with_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.ttl = Some(ttl.into());
        self
    }

    pub fn with_expire_time(mut self, expire_time: OffsetDateTime) -> Self {
        self.expire_time = Some(expire_time);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_contents(mut self, contents: impl Into<ContentUnion>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<ContentUnion>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

/// Only the expiry of a cached content can change after creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateCachedContentConfig {
    pub ttl: Option<String>,
    pub expire_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContentUsageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_duration_seconds: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration_seconds: Option<i32>,
}

/// A cached content resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<CachedContentUsageMetadata>,
}
