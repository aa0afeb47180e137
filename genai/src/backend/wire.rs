//! Mapping helpers shared by both transcoders. Anything that differs between
//! the backends takes a [`BackendKind`] and fails with
//! [`Error::UnsupportedOnBackend`] for fields the backend cannot carry.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use snafu::ResultExt;
use time::OffsetDateTime;
use tracing::warn;

use crate::backend::{BackendKind, Diagnostic};
use crate::coerce::{ContentUnion, coerce_content, coerce_contents};
use crate::common::{Clock, format_timestamp, parse_duration};
use crate::error::{DeserializeSnafu, Error, SerializeSnafu, invalid_argument, unsupported};
use crate::generation::{GenerateContentConfig, GenerateContentResponse, GenerationConfig, SafetySetting};
use crate::images::{GeneratedImage, GenerateImagesResponse, Image, ReferenceImage};
use crate::model_info::ListPage;
use crate::models::{Content, Part};
use crate::tools::Tool;

pub(super) fn to_value<T: Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).context(SerializeSnafu)
}

pub(super) fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value).context(DeserializeSnafu)
}

/// Drops `null` members so absent options never reach the wire. Returns
/// `Null` for an object left empty, which the enclosing call then drops too.
pub(super) fn object(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map.into_iter().filter(|(_, v)| !v.is_null()).collect();
            if map.is_empty() { Value::Null } else { Value::Object(map) }
        }
        other => other,
    }
}

/// Like [`object`] but keeps an empty object.
pub(super) fn body(value: Value) -> Value {
    match object(value) {
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

pub(super) fn contents(contents: &[Content], backend: BackendKind) -> Result<Value, Error> {
    if backend == BackendKind::Studio {
        let has_video_metadata = contents
            .iter()
            .flat_map(|content| &content.parts)
            .any(|part| matches!(part, Part::VideoMetadata(_)));
        if has_video_metadata {
            return Err(unsupported("video_metadata parameter", backend));
        }
    }
    to_value(&contents)
}

pub(super) fn instruction(instruction: Option<&ContentUnion>, backend: BackendKind) -> Result<Value, Error> {
    match instruction {
        Some(union) => {
            let content = coerce_content(union.clone())?;
            contents(std::slice::from_ref(&content), backend)?
                .as_array_mut()
                .and_then(|items| items.pop())
                .ok_or_else(|| invalid_argument("system instruction is empty"))
        }
        None => Ok(Value::Null),
    }
}

pub(super) fn tools(tools: Option<&[Tool]>, backend: BackendKind) -> Result<Value, Error> {
    let Some(tools) = tools else {
        return Ok(Value::Null);
    };
    let mut out = Vec::with_capacity(tools.len());
    for tool in tools {
        if backend == BackendKind::Studio && tool.retrieval.is_some() {
            return Err(unsupported("retrieval parameter", backend));
        }
        let mut declarations = Vec::new();
        for declaration in tool.resolved_declarations()? {
            if backend == BackendKind::Studio {
                if let Some(parameters) = &declaration.parameters {
                    let name = declaration.name.as_str();
                    parameters.walk(&mut Vec::new(), &mut |path, schema| {
                        let parameter = path.join(".");
                        if schema.default.is_some() {
                            return Err(invalid_argument(format!(
                                "default value of parameter '{parameter}' of function '{name}' is not supported in the Gemini Developer API"
                            )));
                        }
                        if schema.any_of.is_some() {
                            return Err(invalid_argument(format!(
                                "anyOf in parameter '{parameter}' of function '{name}' is not supported in the Gemini Developer API"
                            )));
                        }
                        Ok(())
                    })?;
                }
                let mut value = to_value(&declaration)?;
                if let Some(map) = value.as_object_mut() {
                    map.remove("response");
                }
                declarations.push(value);
            } else {
                declarations.push(to_value(&declaration)?);
            }
        }
        out.push(object(json!({
            "functionDeclarations": (!declarations.is_empty()).then_some(declarations),
            "googleSearch": tool.google_search,
            "googleSearchRetrieval": tool.google_search_retrieval,
            "codeExecution": tool.code_execution,
            "retrieval": tool.retrieval,
        })));
    }
    Ok(Value::Array(out))
}

pub(super) fn generation_config(config: &GenerationConfig, backend: BackendKind) -> Result<Value, Error> {
    if backend == BackendKind::Studio && config.routing_config.is_some() {
        return Err(unsupported("routing_config parameter", backend));
    }
    Ok(object(to_value(config)?))
}

pub(super) fn safety_settings(settings: Option<&[SafetySetting]>, backend: BackendKind) -> Result<Value, Error> {
    let Some(settings) = settings else {
        return Ok(Value::Null);
    };
    if backend == BackendKind::Studio && settings.iter().any(|s| s.method.is_some()) {
        return Err(unsupported("method parameter", backend));
    }
    to_value(&settings)
}

/// Body of `generateContent`, `streamGenerateContent` and the Vertex
/// `countTokens` call. `cached_content` is already resolved.
pub(super) fn generate_content_body(
    backend: BackendKind,
    request_contents: &[Content],
    config: &GenerateContentConfig,
    cached_content: Option<String>,
) -> Result<Value, Error> {
    if backend == BackendKind::Studio && config.labels.is_some() {
        return Err(unsupported("labels parameter", backend));
    }
    Ok(body(json!({
        "contents": contents(request_contents, backend)?,
        "systemInstruction": instruction(config.system_instruction.as_ref(), backend)?,
        "generationConfig": generation_config(&config.generation_config, backend)?,
        "safetySettings": safety_settings(config.safety_settings.as_deref(), backend)?,
        "tools": tools(config.tools.as_deref(), backend)?,
        "toolConfig": config.tool_config,
        "cachedContent": cached_content,
        "labels": config.labels,
    })))
}

/// Attaches `parsed` to a complete reply. Stream chunks carry partial JSON
/// and are returned as is. A reply that fails validation comes back inside
/// the [`Error::SchemaMismatch`].
pub(super) fn generate_content_response(
    mut response: GenerateContentResponse,
    config: &GenerateContentConfig,
    stream: bool,
) -> Result<GenerateContentResponse, Error> {
    let Some(schema) = config.generation_config.response_schema.as_ref().filter(|_| !stream) else {
        return Ok(response);
    };
    match response.attach_parsed(schema) {
        Ok(()) => Ok(response),
        Err(Error::SchemaMismatch { message, .. }) => {
            Err(Error::SchemaMismatch { message, response: Some(Box::new(response)) })
        }
        Err(other) => Err(other),
    }
}

/// Collapses `ttl` / `expire_time` into one absolute `expireTime`.
///
/// `expire_time` wins when both are present; the ignored `ttl` is logged and
/// recorded as a diagnostic.
pub(super) fn expiry(
    ttl: Option<&str>,
    expire_time: Option<OffsetDateTime>,
    clock: &dyn Clock,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Option<String>, Error> {
    match (ttl, expire_time) {
        (Some(ttl), Some(expire_time)) => {
            parse_duration(ttl)?;
            warn!(ttl, "both ttl and expire_time set; using expire_time");
            diagnostics.push(Diagnostic {
                code: "ttl_ignored",
                message: format!("ttl {ttl} ignored because expire_time is set"),
            });
            format_timestamp(expire_time).map(Some)
        }
        (None, Some(expire_time)) => format_timestamp(expire_time).map(Some),
        (Some(ttl), None) => format_timestamp(clock.now() + parse_duration(ttl)?).map(Some),
        (None, None) => Ok(None),
    }
}

/// Cached contents can only reference files the backend can read.
pub(super) fn check_cache_file_uris(contents: &[Content], backend: BackendKind) -> Result<(), Error> {
    for part in contents.iter().flat_map(|content| &content.parts) {
        let Part::FileData(file) = part else { continue };
        let foreign = match backend {
            BackendKind::Studio => file.file_uri.starts_with("gs://"),
            BackendKind::Vertex => file.file_uri.starts_with("https://generativelanguage.googleapis.com/"),
        };
        if foreign {
            return Err(unsupported(format!("caching file '{}'", file.file_uri), backend));
        }
    }
    Ok(())
}

pub(super) fn cache_contents(union: Option<&ContentUnion>) -> Result<Vec<Content>, Error> {
    match union {
        Some(union) => coerce_contents(union.clone()),
        None => Ok(Vec::new()),
    }
}

pub(super) fn output_options(mime_type: Option<&String>, compression_quality: Option<i32>) -> Value {
    object(json!({
        "mimeType": mime_type,
        "compressionQuality": compression_quality,
    }))
}

pub(super) fn reference_images(references: &[ReferenceImage]) -> Result<Value, Error> {
    let mut out = Vec::with_capacity(references.len());
    for reference in references {
        let image = match reference.image() {
            Some(image) => to_value(image)?,
            None => Value::Null,
        };
        let mut entry = json!({
            "referenceImage": image,
            "referenceId": reference.reference_id(),
            "referenceType": reference.reference_type(),
        });
        let (key, config) = match reference {
            ReferenceImage::Raw { .. } => (None, Value::Null),
            ReferenceImage::Mask { config, .. } => (
                Some("maskImageConfig"),
                json!({
                    "maskMode": config.mask_mode,
                    "maskClasses": config.segmentation_classes,
                    "dilation": config.mask_dilation,
                }),
            ),
            ReferenceImage::Control { config, .. } => (
                Some("controlImageConfig"),
                json!({
                    "controlType": config.control_type,
                    "computeControl": config.enable_control_image_computation,
                }),
            ),
            ReferenceImage::Style { config, .. } => {
                (Some("styleImageConfig"), json!({"styleDescription": config.style_description}))
            }
            ReferenceImage::Subject { config, .. } => (
                Some("subjectImageConfig"),
                json!({
                    "subjectType": config.subject_type,
                    "subjectDescription": config.subject_description,
                }),
            ),
        };
        if let (Some(key), Some(map)) = (key, entry.as_object_mut()) {
            map.insert(key.to_string(), object(config));
        }
        out.push(object(entry));
    }
    Ok(Value::Array(out))
}

/// Decodes the `predictions` of an image `:predict` call.
pub(super) fn generated_images(body: Value) -> Result<GenerateImagesResponse, Error> {
    let predictions = match body.get("predictions") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    let mut generated_images = Vec::with_capacity(predictions.len());
    for prediction in predictions {
        let has_image = prediction.get("bytesBase64Encoded").is_some() || prediction.get("gcsUri").is_some();
        let rai_filtered_reason = prediction.get("raiFilteredReason").and_then(Value::as_str).map(str::to_string);
        let enhanced_prompt = prediction.get("prompt").and_then(Value::as_str).map(str::to_string);
        let image: Option<Image> = if has_image { Some(from_value(prediction)?) } else { None };
        generated_images.push(GeneratedImage { image, rai_filtered_reason, enhanced_prompt });
    }
    Ok(GenerateImagesResponse { generated_images })
}

/// Splits a list response into items and the continuation token.
pub(super) fn page<T>(
    mut body: Value,
    key: &str,
    mut decode: impl FnMut(Value) -> Result<T, Error>,
) -> Result<ListPage<T>, Error> {
    let items = match body.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => items.into_iter().map(&mut decode).collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };
    let next_page_token = body
        .get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);
    Ok(ListPage { items, next_page_token })
}

/// Moves `from` to `to` within a JSON object.
pub(super) fn rename(value: &mut Value, from: &str, to: &str) {
    if let Some(map) = value.as_object_mut() {
        if let Some(moved) = map.remove(from) {
            map.insert(to.to_string(), moved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FixedClock;
    use crate::schema::{Schema, Type};
    use crate::tools::FunctionDeclaration;
    use time::macros::datetime;

    #[test]
    fn schema_mismatch_keeps_the_reply() {
        let config = GenerateContentConfig::default()
            .with_response_schema(Schema::object([("n".to_string(), Schema::of(Type::Integer))]).with_required(["n"]));
        let reply = GenerateContentResponse {
            candidates: vec![crate::generation::Candidate {
                content: Some(Content::model(vec![Part::text(r#"{"n": "three"}"#)])),
                ..Default::default()
            }],
            ..Default::default()
        };

        let err = generate_content_response(reply.clone(), &config, false).unwrap_err();
        assert!(err.is_schema_mismatch());
        assert_eq!(err.mismatched_response(), Some(&reply));

        let chunk = generate_content_response(reply.clone(), &config, true).unwrap();
        assert_eq!(chunk.parsed, None);
    }

    #[test]
    fn ttl_becomes_absolute_expiry() {
        let clock = FixedClock(datetime!(2024-12-20 00:00:00 UTC));
        let mut diagnostics = Vec::new();
        let expiry = expiry(Some("86400s"), None, &clock, &mut diagnostics).unwrap();
        assert_eq!(expiry.as_deref(), Some("2024-12-21T00:00:00Z"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn expire_time_wins_over_ttl_with_diagnostic() {
        let clock = FixedClock(datetime!(2024-12-20 00:00:00 UTC));
        let mut diagnostics = Vec::new();
        let expiry = expiry(Some("60s"), Some(datetime!(2025-01-01 12:00:00 UTC)), &clock, &mut diagnostics).unwrap();
        assert_eq!(expiry.as_deref(), Some("2025-01-01T12:00:00Z"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, "ttl_ignored");
    }

    #[test]
    fn studio_rejects_defaults_and_drops_response() {
        let mut location = Schema::of(Type::String);
        location.default = Some(json!("Boston"));
        let declaration = FunctionDeclaration::new("weather", "Weather")
            .with_parameters(Schema::object([("location".to_string(), location)]));
        let tool = [Tool::functions([declaration.clone()])];

        let err = tools(Some(&tool), BackendKind::Studio).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("'location'"), "{err}");
        assert!(tools(Some(&tool), BackendKind::Vertex).is_ok());

        let with_response = [Tool::functions([FunctionDeclaration::new("f", "d")
            .with_parameters(Schema::object([("q".to_string(), Schema::of(Type::String))]))
            .with_response(Schema::of(Type::String))])];
        let studio = tools(Some(&with_response), BackendKind::Studio).unwrap();
        assert!(studio[0]["functionDeclarations"][0].get("response").is_none());
        let vertex = tools(Some(&with_response), BackendKind::Vertex).unwrap();
        assert_eq!(vertex[0]["functionDeclarations"][0]["response"]["type"], "STRING");
    }

    #[test]
    fn cache_file_uris_must_match_backend() {
        let gcs = [Content::user([Part::file_data("gs://bucket/doc.pdf", "application/pdf")])];
        assert!(check_cache_file_uris(&gcs, BackendKind::Studio).unwrap_err().is_unsupported());
        assert!(check_cache_file_uris(&gcs, BackendKind::Vertex).is_ok());

        let uploaded = [Content::user([Part::file_data(
            "https://generativelanguage.googleapis.com/v1beta/files/abc",
            "application/pdf",
        )])];
        assert!(check_cache_file_uris(&uploaded, BackendKind::Vertex).unwrap_err().is_unsupported());
    }

    #[test]
    fn mask_config_is_emitted_under_its_own_key() {
        let references = [
            ReferenceImage::raw(1, Image::from_gcs("gs://b/raw.png", None)),
            ReferenceImage::mask(
                2,
                None,
                crate::images::MaskReferenceConfig {
                    mask_mode: Some("MASK_MODE_BACKGROUND".into()),
                    mask_dilation: Some(0.06),
                    ..Default::default()
                },
            ),
        ];
        let wire = reference_images(&references).unwrap();
        assert_eq!(wire[0]["referenceType"], "REFERENCE_TYPE_RAW");
        assert_eq!(wire[0]["referenceImage"]["gcsUri"], "gs://b/raw.png");
        assert_eq!(wire[1]["maskImageConfig"]["maskMode"], "MASK_MODE_BACKGROUND");
        assert!(wire[1].get("referenceImage").is_none());
        assert!(wire[1].get("config").is_none());
    }

    #[test]
    fn empty_objects_are_dropped() {
        assert_eq!(object(json!({"a": null})), Value::Null);
        assert_eq!(body(json!({"a": null})), json!({}));
        assert_eq!(output_options(None, None), Value::Null);
    }
}
