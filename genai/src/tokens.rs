use serde::{Deserialize, Serialize};

use crate::coerce::ContentUnion;
use crate::generation::GenerationConfig;
use crate::tools::Tool;

/// Optional parameters for `count_tokens`. Only the contents are counted on
/// the Gemini Developer API; the other fields are Vertex AI only.
#[derive(Debug, Clone, Default)]
pub struct CountTokensConfig {
    pub system_instruction: Option<ContentUnion>,
    pub tools: Option<Vec<Tool>>,
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensResponse {
    #[serde(default)]
    pub total_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<i32>,
}

/// Tokens of one content as seen by the model's tokenizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// int64 ids, carried as decimal strings on the wire
    #[serde(default)]
    pub token_ids: Vec<String>,
    #[serde(default, with = "crate::common::base64_vec")]
    pub tokens: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeTokensResponse {
    #[serde(default)]
    pub tokens_info: Vec<TokensInfo>,
}
