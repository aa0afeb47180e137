//! # genai
//!
//! A typed request/response layer for Google's generative AI services that
//! speaks both the Gemini Developer API and Vertex AI behind one client.
//!
//! ```no_run
//! # async fn run() -> Result<(), genai::Error> {
//! let client = genai::Client::builder().with_api_key("...").build()?;
//! let response = client
//!     .models()
//!     .generate_content("gemini-2.0-flash", "Why is the sky blue?", Default::default())
//!     .await?;
//! println!("{}", response.text()?.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
mod builder;
pub mod cache;
mod client;
pub mod coerce;
pub mod common;
pub mod embedding;
mod error;
pub mod files;
pub mod generation;
pub mod images;
pub mod jobs;
pub mod model_info;
pub mod models;
pub mod resource;
pub mod schema;
pub mod tokens;
pub mod tools;
pub mod transport;
pub mod tuning;

pub use backend::{ApiRequest, Backend, BackendKind, Diagnostic, WireRequest};
pub use builder::ClientBuilder;
pub use client::{Batches, Caches, Client, Files, Models, ResponseStream, Tunings};
pub use coerce::{ContentItem, ContentUnion, PartUnion};
pub use error::{ApiStatus, Error};
pub use generation::{GenerateContentConfig, GenerateContentResponse, GenerationConfig};
pub use jobs::{CancelOutcome, Job, JobLifecycle, JobState};
pub use models::{Blob, Content, FileData, FunctionCall, FunctionResponse, Part, Role};
pub use schema::{Schema, Type};
pub use tools::{FunctionDeclaration, Tool, ToolConfig, function};
pub use transport::{ApiKey, BearerToken, Credentials, FileUploader, Transport};
