//! One policy object per backend. The client picks one at construction and
//! never branches on the backend itself; every difference between the
//! Gemini Developer API and Vertex AI lives behind [`Backend`].

use std::fmt::{self, Debug};

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::batch::{BatchJob, CreateBatchJobConfig, DeleteResourceJob};
use crate::cache::{CachedContent, CreateCachedContentConfig, UpdateCachedContentConfig};
use crate::embedding::{EmbedContentConfig, EmbedContentResponse};
use crate::error::{Error, UnexpectedResponseSnafu};
use crate::files::File;
use crate::generation::{GenerateContentConfig, GenerateContentResponse};
use crate::images::{
    EditImageConfig, GenerateImagesConfig, GenerateImagesResponse, Image, ReferenceImage, UpscaleImageConfig,
};
use crate::jobs::JobStateSets;
use crate::model_info::{ListConfig, ListPage, ModelInfo};
use crate::models::Content;
use crate::resource::{self, ResourceKind, Target};
use crate::tokens::{ComputeTokensResponse, CountTokensConfig, CountTokensResponse};
use crate::tuning::{CreateTuningJobConfig, TuningDataset, TuningJob};

pub mod studio;
pub mod vertex;
mod wire;

pub use studio::StudioBackend;
pub use vertex::VertexBackend;

/// Backend-specific encodings of request fragments that other protocols
/// embed directly, such as the live session `setup` message.
pub mod fragments {
    use serde_json::Value;

    use super::{BackendKind, wire};
    use crate::coerce::ContentUnion;
    use crate::error::Error;
    use crate::generation::GenerationConfig;
    use crate::models::Content;
    use crate::tools::Tool;

    pub fn contents(contents: &[Content], backend: BackendKind) -> Result<Value, Error> {
        wire::contents(contents, backend)
    }

    /// `Null` when `instruction` is absent.
    pub fn instruction(instruction: Option<&ContentUnion>, backend: BackendKind) -> Result<Value, Error> {
        wire::instruction(instruction, backend)
    }

    pub fn tools(tools: Option<&[Tool]>, backend: BackendKind) -> Result<Value, Error> {
        wire::tools(tools, backend)
    }

    pub fn generation_config(config: &GenerationConfig, backend: BackendKind) -> Result<Value, Error> {
        wire::generation_config(config, backend)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Gemini Developer API
    Studio,
    /// Vertex AI
    Vertex,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Studio => f.write_str("Gemini Developer API"),
            BackendKind::Vertex => f.write_str("Vertex AI"),
        }
    }
}

/// A machine-readable note about a decision the transcoder made on the
/// caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
}

/// Backend-specific request descriptor. `path` is relative to the backend
/// base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub diagnostics: Vec<Diagnostic>,
}

impl WireRequest {
    pub(crate) fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None, diagnostics: Vec::new() }
    }

    pub(crate) fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub(crate) fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub(crate) fn with_list_config(mut self, config: &ListConfig) -> Self {
        if let Some(size) = config.page_size {
            self = self.with_query("pageSize", size);
        }
        if let Some(token) = &config.page_token {
            self = self.with_query("pageToken", token);
        }
        if let Some(filter) = &config.filter {
            self = self.with_query("filter", filter);
        }
        self
    }
}

/// A canonical call, already coerced. One variant per operation.
#[derive(Debug, Clone)]
pub enum ApiRequest {
    GenerateContent { model: String, contents: Vec<Content>, config: GenerateContentConfig, stream: bool },
    CountTokens { model: String, contents: Vec<Content>, config: CountTokensConfig },
    ComputeTokens { model: String, contents: Vec<Content> },
    EmbedContent { model: String, contents: Vec<Content>, config: EmbedContentConfig },
    GenerateImages { model: String, prompt: String, config: GenerateImagesConfig },
    EditImage { model: String, prompt: String, reference_images: Vec<ReferenceImage>, config: EditImageConfig },
    UpscaleImage { model: String, image: Image, upscale_factor: String, config: UpscaleImageConfig },
    GetModel { model: String },
    ListModels { config: ListConfig },
    CreateCachedContent { model: String, config: CreateCachedContentConfig },
    GetCachedContent { name: String },
    UpdateCachedContent { name: String, config: UpdateCachedContentConfig },
    DeleteCachedContent { name: String },
    ListCachedContents { config: ListConfig },
    CreateTuningJob { base_model: String, training_dataset: TuningDataset, config: CreateTuningJobConfig },
    GetTuningJob { name: String },
    ListTuningJobs { config: ListConfig },
    CancelTuningJob { name: String },
    CreateBatchJob { model: String, src: String, config: CreateBatchJobConfig },
    GetBatchJob { name: String },
    CancelBatchJob { name: String },
    DeleteBatchJob { name: String },
    ListBatchJobs { config: ListConfig },
    GetFile { name: String },
    DeleteFile { name: String },
    ListFiles { config: ListConfig },
}

impl ApiRequest {
    /// Operation name used in logs and error messages.
    pub fn operation(&self) -> &'static str {
        match self {
            ApiRequest::GenerateContent { stream: false, .. } => "generate_content",
            ApiRequest::GenerateContent { stream: true, .. } => "generate_content_stream",
            ApiRequest::CountTokens { .. } => "count_tokens",
            ApiRequest::ComputeTokens { .. } => "compute_tokens",
            ApiRequest::EmbedContent { .. } => "embed_content",
            ApiRequest::GenerateImages { .. } => "generate_images",
            ApiRequest::EditImage { .. } => "edit_image",
            ApiRequest::UpscaleImage { .. } => "upscale_image",
            ApiRequest::GetModel { .. } => "get_model",
            ApiRequest::ListModels { .. } => "list_models",
            ApiRequest::CreateCachedContent { .. } => "caches.create",
            ApiRequest::GetCachedContent { .. } => "caches.get",
            ApiRequest::UpdateCachedContent { .. } => "caches.update",
            ApiRequest::DeleteCachedContent { .. } => "caches.delete",
            ApiRequest::ListCachedContents { .. } => "caches.list",
            ApiRequest::CreateTuningJob { .. } => "tunings.tune",
            ApiRequest::GetTuningJob { .. } => "tunings.get",
            ApiRequest::ListTuningJobs { .. } => "tunings.list",
            ApiRequest::CancelTuningJob { .. } => "tunings.cancel",
            ApiRequest::CreateBatchJob { .. } => "batches.create",
            ApiRequest::GetBatchJob { .. } => "batches.get",
            ApiRequest::CancelBatchJob { .. } => "batches.cancel",
            ApiRequest::DeleteBatchJob { .. } => "batches.delete",
            ApiRequest::ListBatchJobs { .. } => "batches.list",
            ApiRequest::GetFile { .. } => "files.get",
            ApiRequest::DeleteFile { .. } => "files.delete",
            ApiRequest::ListFiles { .. } => "files.list",
        }
    }
}

/// A canonical result. One variant per result shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    GenerateContent(GenerateContentResponse),
    CountTokens(CountTokensResponse),
    ComputeTokens(ComputeTokensResponse),
    EmbedContent(EmbedContentResponse),
    GenerateImages(GenerateImagesResponse),
    Model(ModelInfo),
    Models(ListPage<ModelInfo>),
    CachedContent(CachedContent),
    CachedContents(ListPage<CachedContent>),
    TuningJob(TuningJob),
    TuningJobs(ListPage<TuningJob>),
    BatchJob(BatchJob),
    BatchJobs(ListPage<BatchJob>),
    DeleteResourceJob(DeleteResourceJob),
    File(File),
    Files(ListPage<File>),
    Empty,
}

/// Extracts a concrete result from an [`ApiResponse`].
pub trait FromApiResponse: Sized {
    fn from_api_response(response: ApiResponse) -> Result<Self, Error>;
}

macro_rules! from_api_response {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        $(
            impl FromApiResponse for $ty {
                fn from_api_response(response: ApiResponse) -> Result<Self, Error> {
                    match response {
                        ApiResponse::$variant(value) => Ok(value),
                        _ => UnexpectedResponseSnafu { operation: stringify!($variant) }.fail(),
                    }
                }
            }
        )+
    };
}

from_api_response! {
    GenerateContent => GenerateContentResponse,
    CountTokens => CountTokensResponse,
    ComputeTokens => ComputeTokensResponse,
    EmbedContent => EmbedContentResponse,
    GenerateImages => GenerateImagesResponse,
    Model => ModelInfo,
    Models => ListPage<ModelInfo>,
    CachedContent => CachedContent,
    CachedContents => ListPage<CachedContent>,
    TuningJob => TuningJob,
    TuningJobs => ListPage<TuningJob>,
    BatchJob => BatchJob,
    BatchJobs => ListPage<BatchJob>,
    DeleteResourceJob => DeleteResourceJob,
    File => File,
    Files => ListPage<File>,
}

impl FromApiResponse for () {
    fn from_api_response(response: ApiResponse) -> Result<Self, Error> {
        match response {
            ApiResponse::Empty => Ok(()),
            _ => UnexpectedResponseSnafu { operation: "Empty" }.fail(),
        }
    }
}

/// The contract both backends fulfil.
pub trait Backend: Send + Sync + Debug {
    fn kind(&self) -> BackendKind;

    /// Root every [`WireRequest::path`] is joined onto.
    fn base_url(&self) -> &Url;

    fn target(&self) -> Target<'_>;

    fn resolve(&self, kind: ResourceKind, raw: &str) -> Result<String, Error> {
        resource::resolve(kind, raw, self.target())
    }

    /// Maps a canonical call onto this backend's wire request. Performs no
    /// I/O; unsupported features fail here, before anything is sent.
    fn transcode_request(&self, request: &ApiRequest) -> Result<WireRequest, Error>;

    /// Maps a response body (or one streamed chunk) back to canonical form.
    fn transcode_response(&self, request: &ApiRequest, body: Value) -> Result<ApiResponse, Error>;

    fn job_states(&self) -> JobStateSets {
        JobStateSets::for_backend(self.kind())
    }
}
