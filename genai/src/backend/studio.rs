//! Gemini Developer API.

use std::sync::{Arc, LazyLock};

use reqwest::Method;
use serde_json::{Value, json};
use url::Url;

use super::wire::{self, body, object};
use super::{ApiRequest, ApiResponse, Backend, BackendKind, WireRequest};
use crate::common::{Clock, SystemClock};
use crate::error::{Error, UnexpectedResponseSnafu, invalid_argument, unsupported};
use crate::jobs::JobState;
use crate::model_info::ModelInfo;
use crate::resource::{ResourceKind, Target};
use crate::tuning::{TunedModel, TuningJob};

static DEFAULT_BASE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://generativelanguage.googleapis.com/v1beta/")
        .expect("unreachable error: failed to parse default base URL")
});

const KIND: BackendKind = BackendKind::Studio;

#[derive(Debug, Clone)]
pub struct StudioBackend {
    base_url: Url,
    clock: Arc<dyn Clock>,
}

impl Default for StudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StudioBackend {
    pub fn new() -> Self {
        Self { base_url: DEFAULT_BASE_URL.clone(), clock: Arc::new(SystemClock) }
    }

    pub fn default_base_url() -> &'static Url {
        &DEFAULT_BASE_URL
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn batch_unsupported() -> Error {
        unsupported("batch jobs (only supported in the Vertex AI client)", KIND)
    }
}

impl Backend for StudioBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn target(&self) -> Target<'_> {
        Target::Studio
    }

    fn transcode_request(&self, request: &ApiRequest) -> Result<WireRequest, Error> {
        let wire = match request {
            ApiRequest::GenerateContent { model, contents, config, stream } => {
                let model = self.resolve(ResourceKind::Model, model)?;
                let cached = config
                    .cached_content
                    .as_deref()
                    .map(|name| self.resolve(ResourceKind::CachedContent, name))
                    .transpose()?;
                let payload = wire::generate_content_body(KIND, contents, config, cached)?;
                if *stream {
                    WireRequest::new(Method::POST, format!("{model}:streamGenerateContent"))
                        .with_query("alt", "sse")
                        .with_body(payload)
                } else {
                    WireRequest::new(Method::POST, format!("{model}:generateContent")).with_body(payload)
                }
            }
            ApiRequest::CountTokens { model, contents, config } => {
                if config.system_instruction.is_some() {
                    return Err(unsupported("system_instruction parameter", KIND));
                }
                if config.tools.is_some() {
                    return Err(unsupported("tools parameter", KIND));
                }
                if config.generation_config.is_some() {
                    return Err(unsupported("generation_config parameter", KIND));
                }
                let model = self.resolve(ResourceKind::Model, model)?;
                WireRequest::new(Method::POST, format!("{model}:countTokens"))
                    .with_body(json!({ "contents": wire::contents(contents, KIND)? }))
            }
            ApiRequest::ComputeTokens { .. } => {
                return Err(unsupported("compute_tokens (only supported in the Vertex AI client)", KIND));
            }
            ApiRequest::EmbedContent { model, contents, config } => {
                if config.mime_type.is_some() {
                    return Err(unsupported("mime_type parameter", KIND));
                }
                if config.auto_truncate.is_some() {
                    return Err(unsupported("auto_truncate parameter", KIND));
                }
                let model = self.resolve(ResourceKind::Model, model)?;
                let mut requests = Vec::with_capacity(contents.len());
                for content in contents {
                    requests.push(object(json!({
                        "model": model,
                        "content": wire::to_value(content)?,
                        "taskType": config.task_type,
                        "title": config.title,
                        "outputDimensionality": config.output_dimensionality,
                    })));
                }
                WireRequest::new(Method::POST, format!("{model}:batchEmbedContents"))
                    .with_body(json!({ "requests": requests }))
            }
            ApiRequest::GenerateImages { model, prompt, config } => {
                let vertex_only = [
                    ("output_gcs_uri", config.output_gcs_uri.is_some()),
                    ("negative_prompt", config.negative_prompt.is_some()),
                    ("seed", config.seed.is_some()),
                    ("language", config.language.is_some()),
                    ("add_watermark", config.add_watermark.is_some()),
                ];
                if let Some((field, _)) = vertex_only.iter().find(|(_, set)| *set) {
                    return Err(unsupported(format!("{field} parameter"), KIND));
                }
                let model = self.resolve(ResourceKind::Model, model)?;
                let parameters = object(json!({
                    "sampleCount": config.number_of_images,
                    "aspectRatio": config.aspect_ratio,
                    "guidanceScale": config.guidance_scale,
                    "safetySetting": config.safety_filter_level,
                    "personGeneration": config.person_generation,
                    "includeSafetyAttributes": config.include_safety_attributes,
                    "includeRaiReason": config.include_rai_reason,
                    "outputOptions": wire::output_options(
                        config.output_mime_type.as_ref(),
                        config.output_compression_quality,
                    ),
                    "enhancePrompt": config.enhance_prompt,
                }));
                WireRequest::new(Method::POST, format!("{model}:predict")).with_body(body(json!({
                    "instances": [{ "prompt": prompt }],
                    "parameters": parameters,
                })))
            }
            ApiRequest::EditImage { .. } => {
                return Err(unsupported("edit_image (only supported in the Vertex AI client)", KIND));
            }
            ApiRequest::UpscaleImage { .. } => {
                return Err(unsupported("upscale_image (only supported in the Vertex AI client)", KIND));
            }
            ApiRequest::GetModel { model } => WireRequest::new(Method::GET, self.resolve(ResourceKind::Model, model)?),
            ApiRequest::ListModels { config } => WireRequest::new(Method::GET, "models").with_list_config(config),
            ApiRequest::CreateCachedContent { model, config } => {
                let contents = wire::cache_contents(config.contents.as_ref())?;
                wire::check_cache_file_uris(&contents, KIND)?;
                let mut request = WireRequest::new(Method::POST, "cachedContents");
                let expire_time = wire::expiry(
                    config.ttl.as_deref(),
                    config.expire_time,
                    self.clock.as_ref(),
                    &mut request.diagnostics,
                )?;
                let payload = body(json!({
                    "model": self.resolve(ResourceKind::Model, model)?,
                    "contents": wire::contents(&contents, KIND)?,
                    "systemInstruction": wire::instruction(config.system_instruction.as_ref(), KIND)?,
                    "tools": wire::tools(config.tools.as_deref(), KIND)?,
                    "toolConfig": config.tool_config,
                    "displayName": config.display_name,
                    "expireTime": expire_time,
                }));
                request.with_body(payload)
            }
            ApiRequest::GetCachedContent { name } => {
                WireRequest::new(Method::GET, self.resolve(ResourceKind::CachedContent, name)?)
            }
            ApiRequest::UpdateCachedContent { name, config } => {
                let mut request = WireRequest::new(Method::PATCH, self.resolve(ResourceKind::CachedContent, name)?);
                let expire_time = wire::expiry(
                    config.ttl.as_deref(),
                    config.expire_time,
                    self.clock.as_ref(),
                    &mut request.diagnostics,
                )?
                .ok_or_else(|| invalid_argument("cache update requires ttl or expire_time"))?;
                request.with_body(json!({ "expireTime": expire_time }))
            }
            ApiRequest::DeleteCachedContent { name } => {
                WireRequest::new(Method::DELETE, self.resolve(ResourceKind::CachedContent, name)?)
            }
            ApiRequest::ListCachedContents { config } => {
                WireRequest::new(Method::GET, "cachedContents").with_list_config(config)
            }
            ApiRequest::CreateTuningJob { base_model, training_dataset, config } => {
                if training_dataset.gcs_uri.is_some() {
                    return Err(unsupported("gcs_uri parameter", KIND));
                }
                if config.validation_dataset.is_some() {
                    return Err(unsupported("validation_dataset parameter", KIND));
                }
                if config.adapter_size.is_some() {
                    return Err(unsupported("adapter_size parameter", KIND));
                }
                let examples = training_dataset
                    .examples
                    .as_ref()
                    .ok_or_else(|| invalid_argument("training dataset requires examples"))?;
                let hyperparameters = object(json!({
                    "epochCount": config.epoch_count,
                    "learningRateMultiplier": config.learning_rate_multiplier,
                    "batchSize": config.batch_size,
                    "learningRate": config.learning_rate,
                }));
                WireRequest::new(Method::POST, "tunedModels").with_body(body(json!({
                    "baseModel": self.resolve(ResourceKind::Model, base_model)?,
                    "displayName": config.tuned_model_display_name,
                    "description": config.description,
                    "tuningTask": object(json!({
                        "trainingData": { "examples": { "examples": examples } },
                        "hyperparameters": hyperparameters,
                    })),
                })))
            }
            ApiRequest::GetTuningJob { name } => {
                WireRequest::new(Method::GET, self.resolve(ResourceKind::TuningJob, name)?)
            }
            ApiRequest::ListTuningJobs { config } => WireRequest::new(Method::GET, "tunedModels").with_list_config(config),
            ApiRequest::CancelTuningJob { name } => {
                self.resolve(ResourceKind::TuningJob, name)?;
                return Err(unsupported("cancelling tuning jobs", KIND));
            }
            ApiRequest::CreateBatchJob { .. }
            | ApiRequest::GetBatchJob { .. }
            | ApiRequest::CancelBatchJob { .. }
            | ApiRequest::DeleteBatchJob { .. }
            | ApiRequest::ListBatchJobs { .. } => return Err(Self::batch_unsupported()),
            ApiRequest::GetFile { name } => WireRequest::new(Method::GET, self.resolve(ResourceKind::File, name)?),
            ApiRequest::DeleteFile { name } => {
                WireRequest::new(Method::DELETE, self.resolve(ResourceKind::File, name)?)
            }
            ApiRequest::ListFiles { config } => WireRequest::new(Method::GET, "files").with_list_config(config),
        };
        Ok(wire)
    }

    fn transcode_response(&self, request: &ApiRequest, mut payload: Value) -> Result<ApiResponse, Error> {
        let response = match request {
            ApiRequest::GenerateContent { config, stream, .. } => {
                citations_from_sources(&mut payload);
                let response = wire::from_value(payload)?;
                ApiResponse::GenerateContent(wire::generate_content_response(response, config, *stream)?)
            }
            ApiRequest::CountTokens { .. } => ApiResponse::CountTokens(wire::from_value(payload)?),
            ApiRequest::EmbedContent { .. } => ApiResponse::EmbedContent(wire::from_value(payload)?),
            ApiRequest::GenerateImages { .. } => ApiResponse::GenerateImages(wire::generated_images(payload)?),
            ApiRequest::GetModel { .. } => ApiResponse::Model(model_info(payload)?),
            ApiRequest::ListModels { .. } => ApiResponse::Models(wire::page(payload, "models", model_info)?),
            ApiRequest::CreateCachedContent { .. }
            | ApiRequest::GetCachedContent { .. }
            | ApiRequest::UpdateCachedContent { .. } => ApiResponse::CachedContent(wire::from_value(payload)?),
            ApiRequest::ListCachedContents { .. } => {
                ApiResponse::CachedContents(wire::page(payload, "cachedContents", wire::from_value)?)
            }
            ApiRequest::CreateTuningJob { .. } => ApiResponse::TuningJob(tuning_operation(payload)?),
            ApiRequest::GetTuningJob { .. } => ApiResponse::TuningJob(tuning_job(payload)?),
            ApiRequest::ListTuningJobs { .. } => {
                ApiResponse::TuningJobs(wire::page(payload, "tunedModels", tuning_job)?)
            }
            ApiRequest::GetFile { .. } => ApiResponse::File(wire::from_value(payload)?),
            ApiRequest::ListFiles { .. } => ApiResponse::Files(wire::page(payload, "files", wire::from_value)?),
            ApiRequest::DeleteCachedContent { .. } | ApiRequest::DeleteFile { .. } => ApiResponse::Empty,
            other => return UnexpectedResponseSnafu { operation: other.operation() }.fail(),
        };
        Ok(response)
    }
}

/// Studio reports `citationSources` where Vertex reports `citations`.
fn citations_from_sources(payload: &mut Value) {
    let Some(Value::Array(candidates)) = payload.get_mut("candidates") else {
        return;
    };
    for candidate in candidates {
        if let Some(metadata) = candidate.get_mut("citationMetadata") {
            wire::rename(metadata, "citationSources", "citations");
        }
    }
}

fn model_info(mut payload: Value) -> Result<ModelInfo, Error> {
    wire::rename(&mut payload, "supportedGenerationMethods", "supportedActions");
    wire::from_value(payload)
}

/// A tuned model resource read as a tuning job.
fn tuning_job(mut payload: Value) -> Result<TuningJob, Error> {
    let task = payload.get_mut("tuningTask").map(Value::take).unwrap_or(Value::Null);
    wire::rename(&mut payload, "displayName", "tunedModelDisplayName");
    if let Some(map) = payload.as_object_mut() {
        for (from, to) in [("startTime", "startTime"), ("completeTime", "endTime")] {
            if let Some(timestamp) = task.get(from) {
                map.insert(to.to_string(), timestamp.clone());
            }
        }
    }
    let mut job: TuningJob = wire::from_value(payload)?;
    job.tuned_model = job
        .name
        .as_ref()
        .map(|name| TunedModel { model: Some(name.clone()), endpoint: Some(name.clone()) });
    job.backend = Some(KIND);
    Ok(job)
}

/// Tuning starts with an operation whose metadata names the tuned model.
fn tuning_operation(payload: Value) -> Result<TuningJob, Error> {
    match payload.pointer("/metadata/tunedModel").and_then(Value::as_str) {
        Some(name) => Ok(TuningJob {
            name: Some(name.to_string()),
            state: JobState::Creating,
            backend: Some(KIND),
            ..Default::default()
        }),
        None => tuning_job(payload),
    }
}
