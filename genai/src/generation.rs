//! Content generation: request configuration, response types and the
//! derived accessors computed over a response.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::coerce::ContentUnion;
use crate::error::{Error, invalid_argument};
use crate::models::{Content, FunctionCall, Part};
use crate::schema::Schema;
use crate::tools::{Tool, ToolConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    ModalityUnspecified,
    Text,
    Image,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryUnspecified,
    HarmCategoryHateSpeech,
    HarmCategoryDangerousContent,
    HarmCategoryHarassment,
    HarmCategorySexuallyExplicit,
    HarmCategoryCivicIntegrity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    HarmBlockThresholdUnspecified,
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
    Off,
}

/// Vertex AI only; how `threshold` is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockMethod {
    HarmBlockMethodUnspecified,
    Severity,
    Probability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<HarmBlockMethod>,
}

impl SafetySetting {
    pub fn new(category: HarmCategory, threshold: HarmBlockThreshold) -> Self {
        Self { category, threshold, method: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prebuilt_voice_config: Option<PrebuiltVoiceConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_config: Option<VoiceConfig>,
}

impl SpeechConfig {
    pub fn voice(name: impl Into<String>) -> Self {
        Self {
            voice_config: Some(VoiceConfig {
                prebuilt_voice_config: Some(PrebuiltVoiceConfig { voice_name: Some(name.into()) }),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRoutingMode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_routing_preference: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualRoutingMode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

/// Vertex AI only; routes a request to a model chosen by preference or name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_mode: Option<AutoRoutingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_mode: Option<ManualRoutingMode>,
}

/// Sampling and output-shape parameters, sent as `generationConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_config: Option<RoutingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<Modality>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

impl GenerationConfig {
    /// Requests JSON output constrained to `schema`.
    pub fn json(schema: Schema) -> Self {
        Self {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(schema),
            ..Default::default()
        }
    }
}

/// Optional configuration for `generate_content`.
#[derive(Debug, Clone, Default)]
pub struct GenerateContentConfig {
    pub system_instruction: Option<ContentUnion>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Option<Vec<SafetySetting>>,
    pub tools: Option<Vec<Tool>>,
    pub tool_config: Option<ToolConfig>,
    /// Name of a cached content to use as context.
    pub cached_content: Option<String>,
    /// Vertex AI only.
    pub labels: Option<HashMap<String, String>>,
}

impl GenerateContentConfig {
    pub fn with_system_instruction(mut self, instruction: impl Into<ContentUnion>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.generation_config.temperature = Some(temperature);
        self
    }

    pub fn with_response_schema(mut self, schema: Schema) -> Self {
        self.generation_config.response_mime_type = Some("application/json".to_string());
        self.generation_config.response_schema = Some(schema);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Tool>) -> Self {
        self.tools = Some(tools.into_iter().collect());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyRating {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTypeDate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<GoogleTypeDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationMetadata {
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_logprobs: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_metadata: Option<CitationMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates_token_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<i32>,
}

/// Response of `generate_content`, or one chunk of a streamed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    /// Structured value decoded from the text when the request carried a
    /// response schema.
    #[serde(skip)]
    pub parsed: Option<Value>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> Option<&[Part]> {
        if self.candidates.len() > 1 {
            warn!(
                candidates = self.candidates.len(),
                "response has multiple candidates; accessors only read the first"
            );
        }
        self.candidates.first()?.content.as_ref().map(|c| c.parts.as_slice())
    }

    /// Concatenated text of the first candidate.
    ///
    /// Returns `None` when the candidate has no text part. A candidate that
    /// mixes text with any other kind of part is an
    /// [`Error::InvalidArgument`]. Thought parts are skipped.
    pub fn text(&self) -> Result<Option<String>, Error> {
        text_of(self.first_parts().unwrap_or_default())
    }

    /// Function calls of the first candidate, in order.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.first_parts()
            .unwrap_or_default()
            .iter()
            .filter_map(|part| match part {
                Part::FunctionCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Deserializes [`Self::parsed`] into `T`.
    pub fn parsed_as<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
        match &self.parsed {
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| Error::SchemaMismatch {
                message: format!("parsed value does not fit the requested type: {e}"),
                response: None,
            }),
            None => Ok(None),
        }
    }

    /// Decodes the text against `schema` and stores the result in `parsed`.
    pub(crate) fn attach_parsed(&mut self, schema: &Schema) -> Result<(), Error> {
        let Some(text) = self.text()? else {
            return Ok(());
        };
        let value: Value = serde_json::from_str(&text).map_err(|e| Error::SchemaMismatch {
            message: format!("response text is not JSON: {e}"),
            response: None,
        })?;
        let document = schema.to_json_schema();
        let validator = jsonschema::validator_for(&document).map_err(|e| Error::SchemaMismatch {
            message: format!("requested schema cannot be compiled: {e}"),
            response: None,
        })?;
        let problems: Vec<String> = validator.iter_errors(&value).map(|e| e.to_string()).collect();
        if !problems.is_empty() {
            return Err(Error::SchemaMismatch { message: problems.join("; "), response: None });
        }
        self.parsed = Some(value);
        Ok(())
    }
}

/// Strict text concatenation shared by every response type that carries
/// model content.
pub fn text_of(parts: &[Part]) -> Result<Option<String>, Error> {
    if !parts.iter().any(|part| matches!(part, Part::Text { thought: None | Some(false), .. })) {
        return Ok(None);
    }
    let mut text: Option<String> = None;
    for part in parts {
        match part {
            Part::Text { thought: Some(true), .. } => {}
            Part::Text { text: chunk, .. } => text.get_or_insert_with(String::new).push_str(chunk),
            other => {
                return Err(invalid_argument(format!(
                    "text accessor requires text-only parts, found a '{}' part",
                    other.kind()
                )));
            }
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Type;
    use serde_json::json;

    fn response(parts: Vec<Part>) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate { content: Some(Content::model(parts)), ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn text_concatenates_text_parts() {
        let response = response(vec![Part::text("Hello, "), Part::text("world")]);
        assert_eq!(response.text().unwrap().as_deref(), Some("Hello, world"));
    }

    #[test]
    fn text_rejects_mixed_parts() {
        let response = response(vec![Part::text("look"), Part::inline_data("image/png", vec![1u8])]);
        let err = response.text().unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("inlineData"), "{err}");
    }

    #[test]
    fn text_is_none_without_candidates() {
        assert_eq!(GenerateContentResponse::default().text().unwrap(), None);
    }

    #[test]
    fn text_is_none_for_function_call_only_candidates() {
        let response = response(vec![Part::function_call("lookup", Default::default())]);
        assert_eq!(response.text().unwrap(), None);
        assert_eq!(response.function_calls().len(), 1);
    }

    #[test]
    fn parsed_value_of_the_wrong_shape_is_a_schema_mismatch() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Dish {
            zeta_name: String,
        }
        let mut response = response(vec![]);
        response.parsed = Some(json!({"zeta_name": 3}));
        let err = response.parsed_as::<Dish>().unwrap_err();
        assert!(err.is_schema_mismatch(), "{err:?}");
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }

    #[test]
    fn parsed_value_is_validated_against_schema() {
        let schema = Schema::object([("n".to_string(), Schema::of(Type::Integer))]).with_required(["n"]);

        let mut ok = response(vec![Part::text(r#"{"n": 3}"#)]);
        ok.attach_parsed(&schema).unwrap();
        assert_eq!(ok.parsed, Some(json!({"n": 3})));

        #[derive(Deserialize)]
        struct N {
            n: i64,
        }
        assert_eq!(ok.parsed_as::<N>().unwrap().unwrap().n, 3);

        let mut bad = response(vec![Part::text(r#"{"n": "three"}"#)]);
        assert!(bad.attach_parsed(&schema).unwrap_err().is_schema_mismatch());

        let mut not_json = response(vec![Part::text("three")]);
        assert!(not_json.attach_parsed(&schema).unwrap_err().is_schema_mismatch());
    }

    #[test]
    fn function_calls_are_collected() {
        let response = response(vec![Part::function_call("a", Default::default())]);
        assert_eq!(response.function_calls()[0].name, "a");
    }
}
