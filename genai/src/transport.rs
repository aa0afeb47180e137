//! The I/O boundary: moving bytes, authorizing requests and uploading files.
//!
//! Everything above this module is pure; retries, proxies and timeouts
//! belong to the [`Transport`] implementation.

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response};
use serde::Deserialize;
use serde_json::json;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, instrument};
use url::Url;

use crate::backend::BackendKind;
use crate::error::{
    BadResponseSnafu, DeserializeSnafu, Error, InvalidHeaderSnafu, IoSnafu, PerformRequestSnafu, ReadBodySnafu,
    SerializeSnafu, invalid_argument,
};
use crate::files::{File, UploadFileConfig, UploadSource};

/// A fully built HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: None }
    }

    pub(crate) fn with_header(mut self, name: &'static str, value: &str) -> Result<Self, Error> {
        let value = HeaderValue::from_str(value).context(InvalidHeaderSnafu { name })?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub(crate) fn with_json(mut self, body: &serde_json::Value) -> Result<Self, Error> {
        self.body = Some(serde_json::to_vec(body).context(SerializeSnafu)?);
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct StreamingResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, Result<Bytes, Error>>,
}

impl Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse").field("status", &self.status).finish_non_exhaustive()
    }
}

impl StreamingResponse {
    /// Drains the body; used to build an error from a failed streaming call.
    pub async fn collect(self) -> Result<HttpResponse, Error> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(HttpResponse { status: self.status, headers: self.headers, body: Bytes::from(chunks.concat()) })
    }
}

/// Sends HTTP requests. Non-2xx statuses are returned, not raised.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error>;

    /// Like [`Transport::send`] but yields the body as it arrives.
    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse, Error>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn execute(&self, request: HttpRequest) -> Result<Response, Error> {
        let url = request.url.clone();
        let mut builder = self.http_client.request(request.method, request.url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder.send().await.context(PerformRequestSnafu { url })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let response = self.execute(request).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.context(ReadBodySnafu)?;
        Ok(HttpResponse { status, headers, body })
    }

    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse, Error> {
        let response = self.execute(request).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map(|chunk| chunk.context(ReadBodySnafu)).boxed();
        Ok(StreamingResponse { status, headers, body })
    }
}

/// Turns an unauthenticated request into an authenticated one.
#[async_trait]
pub trait Credentials: Send + Sync + Debug {
    async fn authorize(&self, request: HttpRequest) -> Result<HttpRequest, Error>;
}

/// Gemini Developer API key, sent as `x-goog-api-key`.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

#[async_trait]
impl Credentials for ApiKey {
    async fn authorize(&self, mut request: HttpRequest) -> Result<HttpRequest, Error> {
        let mut value = HeaderValue::from_str(&self.0).context(InvalidHeaderSnafu { name: "x-goog-api-key" })?;
        value.set_sensitive(true);
        request.headers.insert(HeaderName::from_static("x-goog-api-key"), value);
        Ok(request)
    }
}

/// A pre-minted OAuth access token.
#[derive(Clone)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(****)")
    }
}

#[async_trait]
impl Credentials for BearerToken {
    async fn authorize(&self, mut request: HttpRequest) -> Result<HttpRequest, Error> {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {}", self.0)).context(InvalidHeaderSnafu { name: "authorization" })?;
        value.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, value);
        Ok(request)
    }
}

/// Uploads a file and returns the created resource.
#[async_trait]
pub trait FileUploader: Send + Sync + Debug {
    async fn upload(&self, source: UploadSource, config: UploadFileConfig) -> Result<File, Error>;
}

/// The Gemini Developer API resumable upload protocol over a [`Transport`].
#[derive(Debug, Clone)]
pub struct ResumableUploader {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn Credentials>,
    endpoint: Url,
}

impl ResumableUploader {
    /// `endpoint` is the upload collection, e.g.
    /// `https://generativelanguage.googleapis.com/upload/v1beta/files`.
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn Credentials>, endpoint: Url) -> Self {
        Self { transport, credentials, endpoint }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let request = self.credentials.authorize(request).await?;
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(Error::from_response(response.status, &response.body, BackendKind::Studio));
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    file: File,
}

#[async_trait]
impl FileUploader for ResumableUploader {
    #[instrument(skip_all, fields(display_name = config.display_name.as_deref()), err)]
    async fn upload(&self, source: UploadSource, config: UploadFileConfig) -> Result<File, Error> {
        let (data, guessed) = match source {
            UploadSource::Bytes(data) => (data, None),
            UploadSource::Path(path) => {
                let guessed = mime_guess::from_path(&path).first();
                (tokio::fs::read(&path).await.context(IoSnafu)?, guessed)
            }
        };
        let mime_type: mime::Mime = match (config.mime_type, guessed) {
            (Some(mime_type), _) => mime_type
                .parse()
                .map_err(|e| invalid_argument(format!("invalid mime_type '{mime_type}': {e}")))?,
            (None, Some(guessed)) => guessed,
            (None, None) => return Err(invalid_argument("mime_type is required when it cannot be guessed")),
        };
        let mime_type = mime_type.to_string();

        let metadata = json!({
            "file": {
                "name": config.name,
                "displayName": config.display_name,
                "mimeType": mime_type,
            }
        });
        let start = HttpRequest::new(Method::POST, self.endpoint.clone())
            .with_header("x-goog-upload-protocol", "resumable")?
            .with_header("x-goog-upload-command", "start")?
            .with_header("x-goog-upload-header-content-length", &data.len().to_string())?
            .with_header("x-goog-upload-header-content-type", &mime_type)?
            .with_json(&metadata)?;
        let started = self.send(start).await?;
        let upload_url = started
            .headers
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .context(BadResponseSnafu {
                code: started.status,
                description: Some("missing x-goog-upload-url header".to_string()),
            })?;
        let upload_url = Url::parse(upload_url)
            .map_err(|e| invalid_argument(format!("server returned an invalid upload URL: {e}")))?;
        debug!(size = data.len(), %mime_type, "upload session started");

        let mut finish = HttpRequest::new(Method::POST, upload_url)
            .with_header("x-goog-upload-command", "upload, finalize")?
            .with_header("x-goog-upload-offset", "0")?;
        finish.body = Some(data);
        let finished = self.send(finish).await?;
        let response: UploadResponse = serde_json::from_slice(&finished.body).context(DeserializeSnafu)?;
        Ok(response.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn api_key_sets_sensitive_header() {
        let request = HttpRequest::new(Method::GET, Url::parse("https://example.com/").unwrap());
        let request = ApiKey::new("secret").authorize(request).await.unwrap();
        let value = request.headers.get("x-goog-api-key").unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().unwrap(), "secret");
        assert_eq!(format!("{:?}", ApiKey::new("secret")), "ApiKey(****)");
    }

    #[tokio::test]
    async fn bearer_token_sets_authorization() {
        let request = HttpRequest::new(Method::GET, Url::parse("https://example.com/").unwrap());
        let request = BearerToken::new("t0k").authorize(request).await.unwrap();
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap().to_str().unwrap(), "Bearer t0k");
    }
}
