//! The backend-agnostic client facade.
//!
//! Every call follows the same path: coerce the inputs, let the [`Backend`]
//! transcode the canonical request, authorize and send it through the
//! [`Transport`], then transcode the response back. Operations are grouped
//! the way the services are ([`Models`], [`Caches`], [`Tunings`],
//! [`Batches`], [`Files`]).

use std::sync::Arc;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use snafu::ResultExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::backend::{ApiRequest, Backend, BackendKind, FromApiResponse, WireRequest};
use crate::batch::{BatchJob, CreateBatchJobConfig, DeleteResourceJob};
use crate::builder::ClientBuilder;
use crate::cache::{CachedContent, CreateCachedContentConfig, UpdateCachedContentConfig};
use crate::coerce::{ContentUnion, coerce_contents};
use crate::embedding::{EmbedContentConfig, EmbedContentResponse};
use crate::error::{ApiStatus, ConstructUrlSnafu, DeserializeSnafu, Error, unsupported};
use crate::files::{File, UploadFileConfig, UploadSource};
use crate::generation::{GenerateContentConfig, GenerateContentResponse};
use crate::images::{
    EditImageConfig, GenerateImagesConfig, GenerateImagesResponse, Image, ReferenceImage, UpscaleImageConfig,
};
use crate::jobs::{CancelOutcome, is_already_ended, poll_until_ended};
use crate::model_info::{ListConfig, ListPage, ModelInfo};
use crate::tokens::{ComputeTokensResponse, CountTokensConfig, CountTokensResponse};
use crate::transport::{Credentials, FileUploader, HttpRequest, HttpResponse, Transport};
use crate::tuning::{CreateTuningJobConfig, TuningDataset, TuningJob};

/// Stream of incremental generation responses.
pub type ResponseStream = BoxStream<'static, Result<GenerateContentResponse, Error>>;

#[derive(Debug, Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn Credentials>,
    uploader: Option<Arc<dyn FileUploader>>,
}

impl Client {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn Credentials>,
        uploader: Option<Arc<dyn FileUploader>>,
    ) -> Self {
        Self { backend, transport, credentials, uploader }
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn backend(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn base_url(&self) -> &Url {
        self.backend.base_url()
    }

    pub fn models(&self) -> Models<'_> {
        Models { client: self }
    }

    pub fn caches(&self) -> Caches<'_> {
        Caches { client: self }
    }

    pub fn tunings(&self) -> Tunings<'_> {
        Tunings { client: self }
    }

    pub fn batches(&self) -> Batches<'_> {
        Batches { client: self }
    }

    pub fn files(&self) -> Files<'_> {
        Files { client: self }
    }

    /// Transcodes a request without sending it.
    pub fn transcode(&self, request: &ApiRequest) -> Result<WireRequest, Error> {
        let wire = self.backend.transcode_request(request)?;
        for diagnostic in &wire.diagnostics {
            debug!(operation = request.operation(), code = diagnostic.code, message = %diagnostic.message, "transcoder diagnostic");
        }
        Ok(wire)
    }

    fn url(&self, wire: &WireRequest) -> Result<Url, Error> {
        let mut url = self.backend.base_url().join(&wire.path).context(ConstructUrlSnafu { suffix: wire.path.clone() })?;
        if !wire.query.is_empty() {
            url.query_pairs_mut().extend_pairs(wire.query.iter());
        }
        Ok(url)
    }

    async fn http_request(&self, wire: &WireRequest) -> Result<HttpRequest, Error> {
        let mut request = HttpRequest::new(wire.method.clone(), self.url(wire)?);
        if let Some(body) = &wire.body {
            request = request.with_json(body)?;
        }
        self.credentials.authorize(request).await
    }

    fn check(&self, response: HttpResponse) -> Result<Value, Error> {
        if !response.is_success() {
            return Err(Error::from_response(response.status, &response.body, self.backend.kind()));
        }
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_slice(&response.body).context(DeserializeSnafu)
    }

    /// Sends one canonical request and returns its canonical result.
    pub async fn execute<T: FromApiResponse>(&self, request: ApiRequest) -> Result<T, Error> {
        let wire = self.transcode(&request)?;
        debug!(operation = request.operation(), method = %wire.method, path = %wire.path, "sending request");
        let http = self.http_request(&wire).await?;
        let payload = self.check(self.transport.send(http).await?)?;
        let response = self.backend.transcode_response(&request, payload)?;
        T::from_api_response(response)
    }

    async fn stream(&self, request: ApiRequest) -> Result<ResponseStream, Error> {
        let wire = self.transcode(&request)?;
        let http = self.http_request(&wire).await?;
        let response = self.transport.send_streaming(http).await?;
        if !(200..300).contains(&response.status) {
            let response = response.collect().await?;
            return Err(Error::from_response(response.status, &response.body, self.backend.kind()));
        }

        let backend = self.backend.clone();
        let mut events = Box::pin(response.body.eventsource());
        let stream = async_stream::try_stream! {
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| Error::BadPart { message: e.to_string() })?;
                if event.data.trim().is_empty() {
                    continue;
                }
                let payload: Value = serde_json::from_str(&event.data).context(DeserializeSnafu)?;
                if let Some(status) = payload.get("error") {
                    let status: ApiStatus = serde_json::from_value(status.clone()).context(DeserializeSnafu)?;
                    let code = u16::try_from(status.code).unwrap_or(500);
                    Err::<(), Error>(Error::from_status(code, status, backend.kind()))?;
                }
                let response = backend.transcode_response(&request, payload)?;
                yield GenerateContentResponse::from_api_response(response)?;
            }
        };
        Ok(Box::pin(stream))
    }

    /// Follows page tokens until the listing is exhausted.
    fn paginate<T>(&self, config: ListConfig, request: fn(ListConfig) -> ApiRequest) -> BoxStream<'static, Result<T, Error>>
    where
        T: Send + 'static,
        ListPage<T>: FromApiResponse,
    {
        let client = self.clone();
        let stream = async_stream::try_stream! {
            let mut config = config;
            loop {
                let page: ListPage<T> = client.execute(request(config.clone())).await?;
                for item in page.items {
                    yield item;
                }
                match page.next_page_token.filter(|token| !token.is_empty()) {
                    Some(token) => config.page_token = Some(token),
                    None => break,
                }
            }
        };
        Box::pin(stream)
    }
}

/// Generation, embedding, token, image and model metadata calls.
#[derive(Debug, Clone, Copy)]
pub struct Models<'a> {
    client: &'a Client,
}

impl Models<'_> {
    #[instrument(skip_all, fields(model = model), err)]
    pub async fn generate_content(
        &self,
        model: &str,
        contents: impl Into<ContentUnion>,
        config: GenerateContentConfig,
    ) -> Result<GenerateContentResponse, Error> {
        let contents = coerce_contents(contents)?;
        self.client
            .execute(ApiRequest::GenerateContent { model: model.to_string(), contents, config, stream: false })
            .await
    }

    /// Streams partial responses as server-sent events.
    ///
    /// The stream ends after the first error. Dropping it releases the
    /// underlying connection.
    #[instrument(skip_all, fields(model = model), err)]
    pub async fn generate_content_stream(
        &self,
        model: &str,
        contents: impl Into<ContentUnion>,
        config: GenerateContentConfig,
    ) -> Result<ResponseStream, Error> {
        let contents = coerce_contents(contents)?;
        self.client
            .stream(ApiRequest::GenerateContent { model: model.to_string(), contents, config, stream: true })
            .await
    }

    #[instrument(skip_all, fields(model = model), err)]
    pub async fn count_tokens(
        &self,
        model: &str,
        contents: impl Into<ContentUnion>,
        config: CountTokensConfig,
    ) -> Result<CountTokensResponse, Error> {
        let contents = coerce_contents(contents)?;
        self.client.execute(ApiRequest::CountTokens { model: model.to_string(), contents, config }).await
    }

    /// Vertex AI only.
    #[instrument(skip_all, fields(model = model), err)]
    pub async fn compute_tokens(
        &self,
        model: &str,
        contents: impl Into<ContentUnion>,
    ) -> Result<ComputeTokensResponse, Error> {
        let contents = coerce_contents(contents)?;
        self.client.execute(ApiRequest::ComputeTokens { model: model.to_string(), contents }).await
    }

    #[instrument(skip_all, fields(model = model), err)]
    pub async fn embed_content(
        &self,
        model: &str,
        contents: impl Into<ContentUnion>,
        config: EmbedContentConfig,
    ) -> Result<EmbedContentResponse, Error> {
        let contents = coerce_contents(contents)?;
        self.client.execute(ApiRequest::EmbedContent { model: model.to_string(), contents, config }).await
    }

    #[instrument(skip_all, fields(model = model), err)]
    pub async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        config: GenerateImagesConfig,
    ) -> Result<GenerateImagesResponse, Error> {
        self.client
            .execute(ApiRequest::GenerateImages { model: model.to_string(), prompt: prompt.to_string(), config })
            .await
    }

    /// Vertex AI only.
    #[instrument(skip_all, fields(model = model, references = reference_images.len()), err)]
    pub async fn edit_image(
        &self,
        model: &str,
        prompt: &str,
        reference_images: Vec<ReferenceImage>,
        config: EditImageConfig,
    ) -> Result<GenerateImagesResponse, Error> {
        self.client
            .execute(ApiRequest::EditImage {
                model: model.to_string(),
                prompt: prompt.to_string(),
                reference_images,
                config,
            })
            .await
    }

    /// Vertex AI only. `upscale_factor` is `"x2"` or `"x4"`.
    #[instrument(skip_all, fields(model = model, upscale_factor = upscale_factor), err)]
    pub async fn upscale_image(
        &self,
        model: &str,
        image: Image,
        upscale_factor: &str,
        config: UpscaleImageConfig,
    ) -> Result<GenerateImagesResponse, Error> {
        self.client
            .execute(ApiRequest::UpscaleImage {
                model: model.to_string(),
                image,
                upscale_factor: upscale_factor.to_string(),
                config,
            })
            .await
    }

    #[instrument(skip_all, fields(model = model), err)]
    pub async fn get(&self, model: &str) -> Result<ModelInfo, Error> {
        self.client.execute(ApiRequest::GetModel { model: model.to_string() }).await
    }

    /// Lazily pages through models. On Vertex AI this lists tuned models
    /// unless a filter is given.
    pub fn list(&self, config: ListConfig) -> BoxStream<'static, Result<ModelInfo, Error>> {
        self.client.paginate(config, |config| ApiRequest::ListModels { config })
    }
}

/// Cached content: create, get, update, delete and list.
#[derive(Debug, Clone, Copy)]
pub struct Caches<'a> {
    client: &'a Client,
}

impl Caches<'_> {
    #[instrument(skip_all, fields(model = model), err)]
    pub async fn create(&self, model: &str, config: CreateCachedContentConfig) -> Result<CachedContent, Error> {
        self.client.execute(ApiRequest::CreateCachedContent { model: model.to_string(), config }).await
    }

    #[instrument(skip_all, fields(name = name), err)]
    pub async fn get(&self, name: &str) -> Result<CachedContent, Error> {
        self.client.execute(ApiRequest::GetCachedContent { name: name.to_string() }).await
    }

    /// Changes the expiration. Exactly one of `ttl` and `expire_time` is
    /// expected; when both are set `expire_time` wins.
    #[instrument(skip_all, fields(name = name), err)]
    pub async fn update(&self, name: &str, config: UpdateCachedContentConfig) -> Result<CachedContent, Error> {
        self.client.execute(ApiRequest::UpdateCachedContent { name: name.to_string(), config }).await
    }

    #[instrument(skip_all, fields(name = name), err)]
    pub async fn delete(&self, name: &str) -> Result<(), Error> {
        self.client.execute(ApiRequest::DeleteCachedContent { name: name.to_string() }).await
    }

    pub fn list(&self, config: ListConfig) -> BoxStream<'static, Result<CachedContent, Error>> {
        self.client.paginate(config, |config| ApiRequest::ListCachedContents { config })
    }
}

/// Supervised tuning jobs.
#[derive(Debug, Clone, Copy)]
pub struct Tunings<'a> {
    client: &'a Client,
}

impl Tunings<'_> {
    #[instrument(skip_all, fields(base_model = base_model), err)]
    pub async fn tune(
        &self,
        base_model: &str,
        training_dataset: TuningDataset,
        config: CreateTuningJobConfig,
    ) -> Result<TuningJob, Error> {
        self.client
            .execute(ApiRequest::CreateTuningJob { base_model: base_model.to_string(), training_dataset, config })
            .await
    }

    #[instrument(skip_all, fields(name = name), err)]
    pub async fn get(&self, name: &str) -> Result<TuningJob, Error> {
        self.client.execute(ApiRequest::GetTuningJob { name: name.to_string() }).await
    }

    pub fn list(&self, config: ListConfig) -> BoxStream<'static, Result<TuningJob, Error>> {
        self.client.paginate(config, |config| ApiRequest::ListTuningJobs { config })
    }

    /// Requests cancellation. A job that has already ended is reported as
    /// [`CancelOutcome::AlreadyEnded`] rather than an error.
    #[instrument(skip_all, fields(name = name), err)]
    pub async fn cancel(&self, name: &str) -> Result<CancelOutcome, Error> {
        cancel(self.client, ApiRequest::CancelTuningJob { name: name.to_string() }).await
    }

    /// Polls the job every `interval`, yielding each snapshot until it ends.
    pub fn wait(&self, name: &str, interval: Duration) -> impl Stream<Item = Result<TuningJob, Error>> + Send + 'static {
        let client = self.client.clone();
        let name = name.to_string();
        poll_until_ended(
            move || {
                let client = client.clone();
                let name = name.clone();
                async move { client.tunings().get(&name).await }
            },
            interval,
        )
    }
}

/// Batch prediction jobs. Vertex AI only.
#[derive(Debug, Clone, Copy)]
pub struct Batches<'a> {
    client: &'a Client,
}

impl Batches<'_> {
    /// `src` is a `gs://` or `bq://` URI; the destination is derived from it
    /// unless `config.dest` is set.
    #[instrument(skip_all, fields(model = model, src = src), err)]
    pub async fn create(&self, model: &str, src: &str, config: CreateBatchJobConfig) -> Result<BatchJob, Error> {
        self.client
            .execute(ApiRequest::CreateBatchJob { model: model.to_string(), src: src.to_string(), config })
            .await
    }

    #[instrument(skip_all, fields(name = name), err)]
    pub async fn get(&self, name: &str) -> Result<BatchJob, Error> {
        self.client.execute(ApiRequest::GetBatchJob { name: name.to_string() }).await
    }

    #[instrument(skip_all, fields(name = name), err)]
    pub async fn cancel(&self, name: &str) -> Result<CancelOutcome, Error> {
        cancel(self.client, ApiRequest::CancelBatchJob { name: name.to_string() }).await
    }

    #[instrument(skip_all, fields(name = name), err)]
    pub async fn delete(&self, name: &str) -> Result<DeleteResourceJob, Error> {
        self.client.execute(ApiRequest::DeleteBatchJob { name: name.to_string() }).await
    }

    pub fn list(&self, config: ListConfig) -> BoxStream<'static, Result<BatchJob, Error>> {
        self.client.paginate(config, |config| ApiRequest::ListBatchJobs { config })
    }

    pub fn wait(&self, name: &str, interval: Duration) -> impl Stream<Item = Result<BatchJob, Error>> + Send + 'static {
        let client = self.client.clone();
        let name = name.to_string();
        poll_until_ended(
            move || {
                let client = client.clone();
                let name = name.clone();
                async move { client.batches().get(&name).await }
            },
            interval,
        )
    }
}

/// Uploaded files. Gemini Developer API only.
#[derive(Debug, Clone, Copy)]
pub struct Files<'a> {
    client: &'a Client,
}

impl Files<'_> {
    #[instrument(skip_all, err)]
    pub async fn upload(&self, source: UploadSource, config: UploadFileConfig) -> Result<File, Error> {
        match (&self.client.uploader, self.client.backend()) {
            (_, BackendKind::Vertex) => Err(unsupported("files.upload", BackendKind::Vertex)),
            (Some(uploader), _) => uploader.upload(source, config).await,
            (None, kind) => Err(Error::Configuration { message: format!("no file uploader configured for {kind}") }),
        }
    }

    #[instrument(skip_all, fields(name = name), err)]
    pub async fn get(&self, name: &str) -> Result<File, Error> {
        self.client.execute(ApiRequest::GetFile { name: name.to_string() }).await
    }

    #[instrument(skip_all, fields(name = name), err)]
    pub async fn delete(&self, name: &str) -> Result<(), Error> {
        self.client.execute(ApiRequest::DeleteFile { name: name.to_string() }).await
    }

    pub fn list(&self, config: ListConfig) -> BoxStream<'static, Result<File, Error>> {
        self.client.paginate(config, |config| ApiRequest::ListFiles { config })
    }
}

async fn cancel(client: &Client, request: ApiRequest) -> Result<CancelOutcome, Error> {
    let operation = request.operation();
    match client.execute::<()>(request).await {
        Ok(()) => Ok(CancelOutcome::Requested),
        Err(err) if is_already_ended(&err) => {
            info!(operation, error = %err, "job already ended; nothing to cancel");
            Ok(CancelOutcome::AlreadyEnded)
        }
        Err(err) => {
            warn!(operation, error = %err, "cancel failed");
            Err(err)
        }
    }
}
