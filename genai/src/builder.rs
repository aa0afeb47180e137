use std::sync::{Arc, LazyLock};

use reqwest::Url;
use snafu::ResultExt;
use tracing::debug;

use crate::backend::{Backend, StudioBackend, VertexBackend};
use crate::client::Client;
use crate::common::{Clock, SystemClock};
use crate::error::*;
use crate::transport::{ApiKey, Credentials, FileUploader, ReqwestTransport, ResumableUploader, Transport};

static STUDIO_ROOT: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://generativelanguage.googleapis.com/")
        .expect("unreachable error: failed to parse default root URL")
});

const STUDIO_API_VERSION: &str = "v1beta";
const VERTEX_API_VERSION: &str = "v1beta1";
const DEFAULT_LOCATION: &str = "us-central1";

/// A builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    api_key: Option<String>,
    vertex: Option<(String, String)>,
    base_url: Option<Url>,
    api_version: Option<String>,
    credentials: Option<Arc<dyn Credentials>>,
    transport: Option<Arc<dyn Transport>>,
    client_builder: Option<reqwest::ClientBuilder>,
    clock: Option<Arc<dyn Clock>>,
    file_uploader: Option<Arc<dyn FileUploader>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `GOOGLE_API_KEY`, `GOOGLE_GENAI_USE_VERTEXAI`,
    /// `GOOGLE_CLOUD_PROJECT` and `GOOGLE_CLOUD_LOCATION`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());
        let mut builder = Self::new();
        if let Some(key) = var("GOOGLE_API_KEY") {
            builder = builder.with_api_key(key);
        }
        let use_vertex = var("GOOGLE_GENAI_USE_VERTEXAI")
            .is_some_and(|value| value == "1" || value.eq_ignore_ascii_case("true"));
        if use_vertex {
            builder = builder.with_vertex(
                var("GOOGLE_CLOUD_PROJECT").unwrap_or_default(),
                var("GOOGLE_CLOUD_LOCATION").unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            );
        }
        builder
    }

    /// Sets the API key. On Vertex AI it is only used when no other
    /// credentials are configured.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Targets Vertex AI in the given project and location.
    pub fn with_vertex(mut self, project: impl Into<String>, location: impl Into<String>) -> Self {
        self.vertex = Some((project.into(), location.into()));
        self
    }

    /// Overrides the host root. The API version is appended to it.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_credentials(mut self, credentials: impl Credentials + 'static) -> Self {
        self.credentials = Some(Arc::new(credentials));
        self
    }

    /// Replaces the HTTP transport entirely. Takes precedence over
    /// [`ClientBuilder::with_http_client`].
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets a custom `reqwest::ClientBuilder` for the default transport.
    pub fn with_http_client(mut self, client_builder: reqwest::ClientBuilder) -> Self {
        self.client_builder = Some(client_builder);
        self
    }

    /// Clock used to turn relative TTLs into absolute expiry times.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn with_file_uploader(mut self, uploader: impl FileUploader + 'static) -> Self {
        self.file_uploader = Some(Arc::new(uploader));
        self
    }

    pub fn build(self) -> Result<Client, Error> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let http_client =
                    self.client_builder.unwrap_or_default().build().context(BuildHttpClientSnafu)?;
                Arc::new(ReqwestTransport::new(http_client))
            }
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let api_key = self.api_key.map(|key| Arc::new(ApiKey::new(key)) as Arc<dyn Credentials>);

        // DECISION LOGIC:

        // 1. If Vertex config is present, use Vertex
        if let Some((project, location)) = self.vertex {
            if project.is_empty() {
                return ConfigurationSnafu { message: "Vertex AI requires a project" }.fail();
            }
            let credentials = self.credentials.or(api_key).ok_or_else(|| Error::Configuration {
                message: "Vertex AI requires credentials or an API key".to_string(),
            })?;
            let root = match self.base_url {
                Some(url) => url,
                None => VertexBackend::default_base_url(&location)?
                    .join("/")
                    .context(ConstructUrlSnafu { suffix: "/" })?,
            };
            let version = self.api_version.as_deref().unwrap_or(VERTEX_API_VERSION);
            let backend = VertexBackend::new(project, location)?
                .with_base_url(versioned(&root, version)?)
                .with_clock(clock);
            debug!(base_url = %backend.base_url(), "using Vertex AI");
            return Ok(Client::new(Arc::new(backend), transport, credentials, self.file_uploader));
        }

        // 2. Otherwise, use Studio
        let credentials = self.credentials.or(api_key).ok_or_else(|| Error::Configuration {
            message: "missing API key for the Gemini Developer API".to_string(),
        })?;
        let root = self.base_url.unwrap_or_else(|| STUDIO_ROOT.clone());
        let version = self.api_version.as_deref().unwrap_or(STUDIO_API_VERSION);
        let backend = StudioBackend::new().with_base_url(versioned(&root, version)?).with_clock(clock);
        let upload_suffix = format!("upload/{version}/files");
        let uploader = match self.file_uploader {
            Some(uploader) => uploader,
            None => {
                let endpoint = root.join(&upload_suffix).context(ConstructUrlSnafu { suffix: upload_suffix })?;
                Arc::new(ResumableUploader::new(transport.clone(), credentials.clone(), endpoint))
            }
        };
        debug!(base_url = %backend.base_url(), "using Gemini Developer API");
        Ok(Client::new(Arc::new(backend), transport, credentials, Some(uploader)))
    }
}

fn versioned(root: &Url, version: &str) -> Result<Url, Error> {
    let mut root = root.clone();
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    let suffix = format!("{}/", version.trim_matches('/'));
    root.join(&suffix).context(ConstructUrlSnafu { suffix })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;

    #[test]
    fn studio_requires_an_api_key() {
        let err = ClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }), "{err}");
    }

    #[test]
    fn vertex_requires_credentials() {
        let err = ClientBuilder::new().with_vertex("p", "us-central1").build().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }), "{err}");
    }

    #[test]
    fn vertex_requires_a_project() {
        let err = ClientBuilder::new().with_api_key("k").with_vertex("", "us-central1").build().unwrap_err();
        assert!(err.to_string().contains("project"), "{err}");
    }

    #[test]
    fn default_urls() {
        let client = ClientBuilder::new().with_api_key("k").build().unwrap();
        assert_eq!(client.backend(), BackendKind::Studio);
        assert_eq!(client.base_url().as_str(), "https://generativelanguage.googleapis.com/v1beta/");

        let client = ClientBuilder::new().with_api_key("k").with_vertex("p", "europe-west4").build().unwrap();
        assert_eq!(client.backend(), BackendKind::Vertex);
        assert_eq!(client.base_url().as_str(), "https://europe-west4-aiplatform.googleapis.com/v1beta1/");
    }

    #[test]
    fn base_url_and_version_compose() {
        let client = ClientBuilder::new()
            .with_api_key("k")
            .with_base_url(Url::parse("http://127.0.0.1:8080/proxy").unwrap())
            .with_api_version("v1")
            .build()
            .unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:8080/proxy/v1/");
    }
}
