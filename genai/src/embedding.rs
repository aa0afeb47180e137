use serde::{Deserialize, Serialize};

/// Optional parameters for `embed_content`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedContentConfig {
    /// e.g. `RETRIEVAL_DOCUMENT`, `SEMANTIC_SIMILARITY`
    pub task_type: Option<String>,
    pub title: Option<String>,
    pub output_dimensionality: Option<i32>,
    /// Vertex AI only.
    pub mime_type: Option<String>,
    /// Vertex AI only.
    pub auto_truncate: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEmbeddingStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    /// Vertex AI reports this one in snake case.
    #[serde(alias = "token_count", skip_serializing_if = "Option::is_none")]
    pub token_count: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEmbedding {
    #[serde(default)]
    pub values: Vec<f32>,
    /// Vertex AI only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<ContentEmbeddingStatistics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedContentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billable_character_count: Option<i64>,
}

/// One embedding per input content, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedContentResponse {
    #[serde(default)]
    pub embeddings: Vec<ContentEmbedding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EmbedContentMetadata>,
}
