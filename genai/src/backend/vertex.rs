//! Vertex AI.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{Value, json};
use snafu::ResultExt;
use time::macros::format_description;
use url::Url;

use super::wire::{self, body, object};
use super::{ApiRequest, ApiResponse, Backend, BackendKind, WireRequest};
use crate::batch::{BatchJob, BatchJobDestination, BatchJobSource, DeleteResourceJob};
use crate::common::{Clock, SystemClock};
use crate::embedding::{ContentEmbedding, EmbedContentResponse};
use crate::error::{ConstructUrlSnafu, Error, UnexpectedResponseSnafu, invalid_argument, unsupported};
use crate::generation::text_of;
use crate::images::GenerateImagesConfig;
use crate::model_info::{Endpoint, ModelInfo, TunedModelInfo};
use crate::resource::{ResourceKind, Target, vertex_full_path};
use crate::tuning::{TuningDataset, TuningJob};

const KIND: BackendKind = BackendKind::Vertex;

const TUNING_BASE_MODEL_LABEL: &str = "google-vertex-llm-tuning-base-model-id";

#[derive(Debug, Clone)]
pub struct VertexBackend {
    project: String,
    location: String,
    base_url: Url,
    clock: Arc<dyn Clock>,
}

impl VertexBackend {
    pub fn new(project: impl Into<String>, location: impl Into<String>) -> Result<Self, Error> {
        let project = project.into();
        let location = location.into();
        let base_url = Self::default_base_url(&location)?;
        Ok(Self { project, location, base_url, clock: Arc::new(SystemClock) })
    }

    /// Regional endpoint for `location`; `global` has no regional prefix.
    pub fn default_base_url(location: &str) -> Result<Url, Error> {
        let raw = if location == "global" {
            "https://aiplatform.googleapis.com/v1beta1/".to_string()
        } else {
            format!("https://{location}-aiplatform.googleapis.com/v1beta1/")
        };
        Url::parse(&raw).context(ConstructUrlSnafu { suffix: raw.clone() })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn scope(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.location)
    }

    /// Fully qualified model path, as method calls require.
    fn model_path(&self, model: &str) -> Result<String, Error> {
        let resolved = self.resolve(ResourceKind::Model, model)?;
        Ok(vertex_full_path(&resolved, &self.project, &self.location))
    }

    fn timestamp(&self) -> Result<String, Error> {
        self.clock
            .now()
            .format(format_description!("[year][month][day][hour][minute][second]"))
            .map_err(|e| invalid_argument(format!("timestamp cannot be rendered: {e}")))
    }

    /// Where predictions go when the caller names no destination.
    fn derived_destination(&self, src: &str) -> Result<String, Error> {
        if src.starts_with("gs://") {
            let directory = src.rsplit_once('/').map(|(directory, _)| directory).unwrap_or(src);
            Ok(format!("{directory}/dest"))
        } else if let Some(table) = src.strip_prefix("bq://") {
            let dataset = table.rsplit_once('.').map(|(dataset, _)| dataset).unwrap_or(table);
            Ok(format!("bq://{dataset}.predictions_{}", self.timestamp()?))
        } else {
            Err(invalid_argument(format!("unsupported batch source '{src}'")))
        }
    }

    fn image_parameters(&self, config: &GenerateImagesConfig) -> Value {
        object(json!({
            "storageUri": config.output_gcs_uri,
            "negativePrompt": config.negative_prompt,
            "sampleCount": config.number_of_images,
            "aspectRatio": config.aspect_ratio,
            "guidanceScale": config.guidance_scale,
            "seed": config.seed,
            "safetySetting": config.safety_filter_level,
            "personGeneration": config.person_generation,
            "includeSafetyAttributes": config.include_safety_attributes,
            "includeRaiReason": config.include_rai_reason,
            "language": config.language,
            "outputOptions": wire::output_options(config.output_mime_type.as_ref(), config.output_compression_quality),
            "addWatermark": config.add_watermark,
            "enhancePrompt": config.enhance_prompt,
        }))
    }
}

fn dataset_uri(dataset: &TuningDataset) -> Result<&str, Error> {
    if dataset.examples.is_some() {
        return Err(unsupported("examples parameter", KIND));
    }
    dataset
        .gcs_uri
        .as_deref()
        .ok_or_else(|| invalid_argument("tuning dataset requires a gcs_uri"))
}

impl Backend for VertexBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn target(&self) -> Target<'_> {
        Target::Vertex { project: &self.project, location: &self.location }
    }

    fn transcode_request(&self, request: &ApiRequest) -> Result<WireRequest, Error> {
        let wire = match request {
            ApiRequest::GenerateContent { model, contents, config, stream } => {
                let model = self.model_path(model)?;
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
                let generation_config = match &config.generation_config {
                    Some(generation_config) => wire::generation_config(generation_config, KIND)?,
                    None => Value::Null,
                };
                WireRequest::new(Method::POST, format!("{}:countTokens", self.model_path(model)?)).with_body(body(
                    json!({
                        "contents": wire::contents(contents, KIND)?,
                        "systemInstruction": wire::instruction(config.system_instruction.as_ref(), KIND)?,
                        "tools": wire::tools(config.tools.as_deref(), KIND)?,
                        "generationConfig": generation_config,
                    }),
                ))
            }
            ApiRequest::ComputeTokens { model, contents } => {
                WireRequest::new(Method::POST, format!("{}:computeTokens", self.model_path(model)?))
                    .with_body(json!({ "contents": wire::contents(contents, KIND)? }))
            }
            ApiRequest::EmbedContent { model, contents, config } => {
                let mut instances = Vec::with_capacity(contents.len());
                for content in contents {
                    instances.push(object(json!({
                        "content": text_of(&content.parts)?.unwrap_or_default(),
                        "task_type": config.task_type,
                        "title": config.title,
                        "mimeType": config.mime_type,
                    })));
                }
                WireRequest::new(Method::POST, format!("{}:predict", self.model_path(model)?)).with_body(body(json!({
                    "instances": instances,
                    "parameters": object(json!({
                        "outputDimensionality": config.output_dimensionality,
                        "autoTruncate": config.auto_truncate,
                    })),
                })))
            }
            ApiRequest::GenerateImages { model, prompt, config } => {
                WireRequest::new(Method::POST, format!("{}:predict", self.model_path(model)?)).with_body(body(json!({
                    "instances": [{ "prompt": prompt }],
                    "parameters": self.image_parameters(config),
                })))
            }
            ApiRequest::EditImage { model, prompt, reference_images, config } => {
                let parameters = object(json!({
                    "storageUri": config.output_gcs_uri,
                    "negativePrompt": config.negative_prompt,
                    "sampleCount": config.number_of_images,
                    "guidanceScale": config.guidance_scale,
                    "seed": config.seed,
                    "safetySetting": config.safety_filter_level,
                    "personGeneration": config.person_generation,
                    "includeSafetyAttributes": config.include_safety_attributes,
                    "includeRaiReason": config.include_rai_reason,
                    "language": config.language,
                    "outputOptions": wire::output_options(
                        config.output_mime_type.as_ref(),
                        config.output_compression_quality,
                    ),
                    "editMode": config.edit_mode,
                }));
                WireRequest::new(Method::POST, format!("{}:predict", self.model_path(model)?)).with_body(body(json!({
                    "instances": [{
                        "prompt": prompt,
                        "referenceImages": wire::reference_images(reference_images)?,
                    }],
                    "parameters": parameters,
                })))
            }
            ApiRequest::UpscaleImage { model, image, upscale_factor, config } => {
                if !image.has_bytes() && image.gcs_uri.is_none() {
                    return Err(invalid_argument("image to upscale has neither bytes nor a gcs_uri"));
                }
                let parameters = object(json!({
                    "mode": "upscale",
                    "sampleCount": 1,
                    "upscaleConfig": { "upscaleFactor": upscale_factor },
                    "includeRaiReason": config.include_rai_reason,
                    "outputOptions": wire::output_options(
                        config.output_mime_type.as_ref(),
                        config.output_compression_quality,
                    ),
                }));
                WireRequest::new(Method::POST, format!("{}:predict", self.model_path(model)?)).with_body(json!({
                    "instances": [{ "prompt": "Upscale the image", "image": wire::to_value(image)? }],
                    "parameters": parameters,
                }))
            }
            ApiRequest::GetModel { model } => {
                let resolved = self.resolve(ResourceKind::Model, model)?;
                let path = if resolved.starts_with("publishers/") {
                    resolved
                } else {
                    vertex_full_path(&resolved, &self.project, &self.location)
                };
                WireRequest::new(Method::GET, path)
            }
            ApiRequest::ListModels { config } => {
                let mut request = WireRequest::new(Method::GET, format!("{}/models", self.scope())).with_list_config(config);
                if config.filter.is_none() {
                    request = request.with_query("filter", "labels.tune-type:*");
                }
                request
            }
            ApiRequest::CreateCachedContent { model, config } => {
                let contents = wire::cache_contents(config.contents.as_ref())?;
                wire::check_cache_file_uris(&contents, KIND)?;
                let mut request = WireRequest::new(Method::POST, format!("{}/cachedContents", self.scope()));
                let expire_time = wire::expiry(
                    config.ttl.as_deref(),
                    config.expire_time,
                    self.clock.as_ref(),
                    &mut request.diagnostics,
                )?;
                let payload = body(json!({
                    "model": self.model_path(model)?,
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
                WireRequest::new(Method::GET, format!("{}/cachedContents", self.scope())).with_list_config(config)
            }
            ApiRequest::CreateTuningJob { base_model, training_dataset, config } => {
                if config.batch_size.is_some() {
                    return Err(unsupported("batch_size parameter", KIND));
                }
                if config.learning_rate.is_some() {
                    return Err(unsupported("learning_rate parameter", KIND));
                }
                self.resolve(ResourceKind::Model, base_model)?;
                let validation_uri = config.validation_dataset.as_ref().map(dataset_uri).transpose()?;
                let spec = object(json!({
                    "trainingDatasetUri": dataset_uri(training_dataset)?,
                    "validationDatasetUri": validation_uri,
                    "hyperParameters": object(json!({
                        "epochCount": config.epoch_count,
                        "learningRateMultiplier": config.learning_rate_multiplier,
                        "adapterSize": config.adapter_size,
                    })),
                }));
                WireRequest::new(Method::POST, format!("{}/tuningJobs", self.scope())).with_body(body(json!({
                    "baseModel": base_model,
                    "supervisedTuningSpec": spec,
                    "tunedModelDisplayName": config.tuned_model_display_name,
                    "description": config.description,
                })))
            }
            ApiRequest::GetTuningJob { name } => {
                WireRequest::new(Method::GET, self.resolve(ResourceKind::TuningJob, name)?)
            }
            ApiRequest::ListTuningJobs { config } => {
                WireRequest::new(Method::GET, format!("{}/tuningJobs", self.scope())).with_list_config(config)
            }
            ApiRequest::CancelTuningJob { name } => {
                WireRequest::new(Method::POST, format!("{}:cancel", self.resolve(ResourceKind::TuningJob, name)?))
                    .with_body(json!({}))
            }
            ApiRequest::CreateBatchJob { model, src, config } => {
                let source = BatchJobSource::from_uri(src)
                    .ok_or_else(|| invalid_argument(format!("batch source '{src}' must be a gs:// or bq:// URI")))?;
                let dest = match &config.dest {
                    Some(dest) => dest.clone(),
                    None => self.derived_destination(src)?,
                };
                let destination = BatchJobDestination::from_uri(&dest).ok_or_else(|| {
                    invalid_argument(format!("batch destination '{dest}' must be a gs:// or bq:// URI"))
                })?;
                let display_name = match &config.display_name {
                    Some(name) => name.clone(),
                    None => format!("genai_batch_job_{}", self.timestamp()?),
                };
                WireRequest::new(Method::POST, format!("{}/batchPredictionJobs", self.scope())).with_body(json!({
                    "displayName": display_name,
                    "model": self.model_path(model)?,
                    "inputConfig": object(json!({
                        "instancesFormat": source.format,
                        "gcsSource": source.gcs_uri.map(|uris| json!({ "uris": uris })),
                        "bigquerySource": source.bigquery_uri.map(|uri| json!({ "inputUri": uri })),
                    })),
                    "outputConfig": object(json!({
                        "predictionsFormat": destination.format,
                        "gcsDestination": destination.gcs_uri.map(|uri| json!({ "outputUriPrefix": uri })),
                        "bigqueryDestination": destination.bigquery_uri.map(|uri| json!({ "outputUri": uri })),
                    })),
                }))
            }
            ApiRequest::GetBatchJob { name } => WireRequest::new(Method::GET, self.resolve(ResourceKind::BatchJob, name)?),
            ApiRequest::CancelBatchJob { name } => {
                WireRequest::new(Method::POST, format!("{}:cancel", self.resolve(ResourceKind::BatchJob, name)?))
                    .with_body(json!({}))
            }
            ApiRequest::DeleteBatchJob { name } => {
                WireRequest::new(Method::DELETE, self.resolve(ResourceKind::BatchJob, name)?)
            }
            ApiRequest::ListBatchJobs { config } => {
                WireRequest::new(Method::GET, format!("{}/batchPredictionJobs", self.scope())).with_list_config(config)
            }
            ApiRequest::GetFile { .. } | ApiRequest::DeleteFile { .. } | ApiRequest::ListFiles { .. } => {
                return Err(unsupported("file operations (only supported in the Gemini Developer API)", KIND));
            }
        };
        Ok(wire)
    }

    fn transcode_response(&self, request: &ApiRequest, payload: Value) -> Result<ApiResponse, Error> {
        let response = match request {
            ApiRequest::GenerateContent { config, stream, .. } => {
                let response = wire::from_value(payload)?;
                ApiResponse::GenerateContent(wire::generate_content_response(response, config, *stream)?)
            }
            ApiRequest::CountTokens { .. } => ApiResponse::CountTokens(wire::from_value(payload)?),
            ApiRequest::ComputeTokens { .. } => ApiResponse::ComputeTokens(wire::from_value(payload)?),
            ApiRequest::EmbedContent { .. } => ApiResponse::EmbedContent(embeddings(payload)?),
            ApiRequest::GenerateImages { .. } | ApiRequest::EditImage { .. } | ApiRequest::UpscaleImage { .. } => {
                ApiResponse::GenerateImages(wire::generated_images(payload)?)
            }
            ApiRequest::GetModel { .. } => ApiResponse::Model(model_info(payload)?),
            ApiRequest::ListModels { .. } => ApiResponse::Models(wire::page(payload, "models", model_info)?),
            ApiRequest::CreateCachedContent { .. }
            | ApiRequest::GetCachedContent { .. }
            | ApiRequest::UpdateCachedContent { .. } => ApiResponse::CachedContent(wire::from_value(payload)?),
            ApiRequest::ListCachedContents { .. } => {
                ApiResponse::CachedContents(wire::page(payload, "cachedContents", wire::from_value)?)
            }
            ApiRequest::CreateTuningJob { .. } | ApiRequest::GetTuningJob { .. } => {
                ApiResponse::TuningJob(tuning_job(payload)?)
            }
            ApiRequest::ListTuningJobs { .. } => ApiResponse::TuningJobs(wire::page(payload, "tuningJobs", tuning_job)?),
            ApiRequest::CreateBatchJob { .. } | ApiRequest::GetBatchJob { .. } => {
                ApiResponse::BatchJob(batch_job(payload)?)
            }
            ApiRequest::ListBatchJobs { .. } => {
                ApiResponse::BatchJobs(wire::page(payload, "batchPredictionJobs", batch_job)?)
            }
            ApiRequest::DeleteBatchJob { .. } => {
                ApiResponse::DeleteResourceJob(wire::from_value::<DeleteResourceJob>(payload)?)
            }
            ApiRequest::DeleteCachedContent { .. }
            | ApiRequest::CancelTuningJob { .. }
            | ApiRequest::CancelBatchJob { .. } => ApiResponse::Empty,
            other => return UnexpectedResponseSnafu { operation: other.operation() }.fail(),
        };
        Ok(response)
    }
}

fn embeddings(payload: Value) -> Result<EmbedContentResponse, Error> {
    let mut embeddings = Vec::new();
    if let Some(Value::Array(predictions)) = payload.get("predictions") {
        for prediction in predictions {
            let embedding: ContentEmbedding =
                wire::from_value(prediction.get("embeddings").cloned().unwrap_or(Value::Null))?;
            embeddings.push(embedding);
        }
    }
    let metadata = payload.get("metadata").cloned().map(wire::from_value).transpose()?;
    Ok(EmbedContentResponse { embeddings, metadata })
}

fn model_info(mut payload: Value) -> Result<ModelInfo, Error> {
    let deployed = payload.get_mut("deployedModels").map(Value::take);
    wire::rename(&mut payload, "versionId", "version");
    let mut info: ModelInfo = wire::from_value(payload)?;
    if let Some(Value::Array(deployed)) = deployed {
        info.endpoints = deployed
            .iter()
            .map(|model| Endpoint {
                name: model.get("endpoint").and_then(Value::as_str).map(str::to_string),
                deployed_model_id: model.get("deployedModelId").and_then(Value::as_str).map(str::to_string),
            })
            .collect();
    }
    let base_model = info.labels.as_ref().and_then(|labels| labels.get(TUNING_BASE_MODEL_LABEL)).cloned();
    if base_model.is_some() {
        info.tuned_model_info = Some(TunedModelInfo { base_model });
    }
    Ok(info)
}

fn tuning_job(payload: Value) -> Result<TuningJob, Error> {
    let mut job: TuningJob = wire::from_value(payload)?;
    job.backend = Some(KIND);
    Ok(job)
}

fn batch_job(mut payload: Value) -> Result<BatchJob, Error> {
    let input = payload.get_mut("inputConfig").map(Value::take).unwrap_or(Value::Null);
    let output = payload.get_mut("outputConfig").map(Value::take).unwrap_or(Value::Null);
    let mut job: BatchJob = wire::from_value(payload)?;
    let text = |value: &Value, pointer: &str| value.pointer(pointer).and_then(Value::as_str).map(str::to_string);
    if !input.is_null() {
        let uris = input.pointer("/gcsSource/uris").and_then(Value::as_array).map(|uris| {
            uris.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>()
        });
        job.src = Some(BatchJobSource {
            format: text(&input, "/instancesFormat"),
            gcs_uri: uris,
            bigquery_uri: text(&input, "/bigquerySource/inputUri"),
        });
    }
    if !output.is_null() {
        job.dest = Some(BatchJobDestination {
            format: text(&output, "/predictionsFormat"),
            gcs_uri: text(&output, "/gcsDestination/outputUriPrefix"),
            bigquery_uri: text(&output, "/bigqueryDestination/outputUri"),
        });
    }
    job.backend = Some(KIND);
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::CreateBatchJobConfig;
    use crate::cache::CreateCachedContentConfig;
    use crate::common::FixedClock;
    use crate::embedding::EmbedContentConfig;
    use crate::images::{EditImageConfig, Image, MaskReferenceConfig, ReferenceImage};
    use crate::models::{Content, Part};
    use crate::tuning::{CreateTuningJobConfig, TuningExample};
    use time::macros::datetime;

    fn backend() -> VertexBackend {
        VertexBackend::new("my-project", "us-central1")
            .unwrap()
            .with_clock(Arc::new(FixedClock(datetime!(2024-12-20 10:30:00 UTC))))
    }

    #[test]
    fn base_url_is_regional() {
        assert_eq!(
            VertexBackend::default_base_url("europe-west4").unwrap().as_str(),
            "https://europe-west4-aiplatform.googleapis.com/v1beta1/"
        );
        assert_eq!(
            VertexBackend::default_base_url("global").unwrap().as_str(),
            "https://aiplatform.googleapis.com/v1beta1/"
        );
    }

    #[test]
    fn cache_ttl_becomes_expire_time() {
        let request = ApiRequest::CreateCachedContent {
            model: "gemini-1.5-pro-002".into(),
            config: CreateCachedContentConfig::default().with_ttl("86400s").with_contents(Content::user([
                Part::file_data("gs://cloud-samples-data/generative-ai/pdf/2312.11805v3.pdf", "application/pdf"),
            ])),
        };
        let wire = backend().transcode_request(&request).unwrap();
        assert_eq!(wire.path, "projects/my-project/locations/us-central1/cachedContents");
        let payload = wire.body.unwrap();
        assert_eq!(payload["expireTime"], "2024-12-21T10:30:00Z");
        assert!(payload.get("ttl").is_none());
        assert_eq!(
            payload["model"],
            "projects/my-project/locations/us-central1/publishers/google/models/gemini-1.5-pro-002"
        );
        assert!(wire.diagnostics.is_empty());
    }

    #[test]
    fn batch_create_derives_destination_and_name() {
        let request = ApiRequest::CreateBatchJob {
            model: "gemini-1.5-flash-002".into(),
            src: "bq://my-project.my_dataset.requests".into(),
            config: CreateBatchJobConfig::default(),
        };
        let payload = backend().transcode_request(&request).unwrap().body.unwrap();
        assert_eq!(payload["displayName"], "genai_batch_job_20241220103000");
        assert_eq!(payload["inputConfig"]["instancesFormat"], "bigquery");
        assert_eq!(payload["inputConfig"]["bigquerySource"]["inputUri"], "bq://my-project.my_dataset.requests");
        assert_eq!(
            payload["outputConfig"]["bigqueryDestination"]["outputUri"],
            "bq://my-project.my_dataset.predictions_20241220103000"
        );

        let request = ApiRequest::CreateBatchJob {
            model: "gemini-1.5-flash-002".into(),
            src: "gs://bucket/batch/input.jsonl".into(),
            config: CreateBatchJobConfig::default(),
        };
        let payload = backend().transcode_request(&request).unwrap().body.unwrap();
        assert_eq!(payload["inputConfig"]["gcsSource"]["uris"][0], "gs://bucket/batch/input.jsonl");
        assert_eq!(payload["outputConfig"]["gcsDestination"]["outputUriPrefix"], "gs://bucket/batch/dest");
    }

    #[test]
    fn batch_job_configs_decode_into_src_and_dest() {
        let request = ApiRequest::GetBatchJob { name: "123".into() };
        let response = backend()
            .transcode_response(
                &request,
                json!({
                    "name": "projects/p/locations/us-central1/batchPredictionJobs/123",
                    "state": "JOB_STATE_SUCCEEDED",
                    "inputConfig": {"instancesFormat": "jsonl", "gcsSource": {"uris": ["gs://b/in.jsonl"]}},
                    "outputConfig": {"predictionsFormat": "jsonl", "gcsDestination": {"outputUriPrefix": "gs://b/out"}}
                }),
            )
            .unwrap();
        let ApiResponse::BatchJob(job) = response else { panic!("expected a batch job") };
        assert!(job.has_succeeded());
        assert_eq!(job.src.unwrap().gcs_uri, Some(vec!["gs://b/in.jsonl".to_string()]));
        assert_eq!(job.dest.unwrap().gcs_uri.as_deref(), Some("gs://b/out"));
    }

    #[test]
    fn tuning_rejects_studio_only_fields() {
        let request = ApiRequest::CreateTuningJob {
            base_model: "gemini-1.0-pro-002".into(),
            training_dataset: TuningDataset::examples([TuningExample::default()]),
            config: CreateTuningJobConfig::default(),
        };
        let err = backend().transcode_request(&request).unwrap_err();
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("examples"), "{err}");

        let request = ApiRequest::CreateTuningJob {
            base_model: "gemini-1.0-pro-002".into(),
            training_dataset: TuningDataset::gcs("gs://bucket/train.jsonl"),
            config: CreateTuningJobConfig { adapter_size: Some("ADAPTER_SIZE_ONE".into()), ..Default::default() },
        };
        let payload = backend().transcode_request(&request).unwrap().body.unwrap();
        assert_eq!(payload["supervisedTuningSpec"]["trainingDatasetUri"], "gs://bucket/train.jsonl");
        assert_eq!(payload["supervisedTuningSpec"]["hyperParameters"]["adapterSize"], "ADAPTER_SIZE_ONE");
    }

    #[test]
    fn embeddings_use_predict_with_text_instances() {
        let request = ApiRequest::EmbedContent {
            model: "text-embedding-004".into(),
            contents: vec![Content::text("What is life?")],
            config: EmbedContentConfig { output_dimensionality: Some(10), ..Default::default() },
        };
        let wire = backend().transcode_request(&request).unwrap();
        assert!(wire.path.ends_with("publishers/google/models/text-embedding-004:predict"));
        let payload = wire.body.unwrap();
        assert_eq!(payload["instances"][0]["content"], "What is life?");
        assert_eq!(payload["parameters"]["outputDimensionality"], 10);

        let response = backend()
            .transcode_response(
                &request,
                json!({"predictions": [{"embeddings": {
                    "values": [0.5, -0.25],
                    "statistics": {"truncated": false, "token_count": 4.0}
                }}]}),
            )
            .unwrap();
        let ApiResponse::EmbedContent(response) = response else { panic!("expected embeddings") };
        assert_eq!(response.embeddings[0].values, vec![0.5, -0.25]);
    }

    #[test]
    fn edit_image_flattens_reference_images() {
        let request = ApiRequest::EditImage {
            model: "imagen-3.0-capability-001".into(),
            prompt: "Sunlight and clear sky".into(),
            reference_images: vec![
                ReferenceImage::raw(1, Image::from_gcs("gs://b/cat.png", None)),
                ReferenceImage::mask(
                    2,
                    None,
                    MaskReferenceConfig { mask_mode: Some("MASK_MODE_BACKGROUND".into()), ..Default::default() },
                ),
            ],
            config: EditImageConfig { edit_mode: Some("EDIT_MODE_INPAINT_INSERTION".into()), ..Default::default() },
        };
        let payload = backend().transcode_request(&request).unwrap().body.unwrap();
        let references = &payload["instances"][0]["referenceImages"];
        assert_eq!(references[1]["referenceType"], "REFERENCE_TYPE_MASK");
        assert_eq!(references[1]["maskImageConfig"]["maskMode"], "MASK_MODE_BACKGROUND");
        assert_eq!(payload["parameters"]["editMode"], "EDIT_MODE_INPAINT_INSERTION");
    }

    #[test]
    fn files_are_unsupported() {
        let request = ApiRequest::GetFile { name: "files/abc".into() };
        assert!(backend().transcode_request(&request).unwrap_err().is_unsupported());
    }
}
