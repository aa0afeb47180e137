use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::backend::BackendKind;
use crate::error::ApiStatus;
use crate::jobs::{Job, JobState};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningExample {
    pub text_input: String,
    pub output: String,
}

/// Training data: a Cloud Storage JSONL file (Vertex AI) or inline
/// examples (Gemini Developer API).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TuningDataset {
    pub gcs_uri: Option<String>,
    pub examples: Option<Vec<TuningExample>>,
}

impl TuningDataset {
    pub fn gcs(uri: impl Into<String>) -> Self {
        Self { gcs_uri: Some(uri.into()), examples: None }
    }

    pub fn examples(examples: impl IntoIterator<Item = TuningExample>) -> Self {
        Self { gcs_uri: None, examples: Some(examples.into_iter().collect()) }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateTuningJobConfig {
    /// Vertex AI only.
    pub validation_dataset: Option<TuningDataset>,
    pub tuned_model_display_name: Option<String>,
    pub description: Option<String>,
    pub epoch_count: Option<i32>,
    pub learning_rate_multiplier: Option<f32>,
    /// Vertex AI only, e.g. `ADAPTER_SIZE_ONE`.
    pub adapter_size: Option<String>,
    /// Gemini Developer API only.
    pub batch_size: Option<i32>,
    /// Gemini Developer API only.
    pub learning_rate: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunedModel {
    /// Resource name of the tuned model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Endpoint serving the tuned model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// A tuning job. On the Gemini Developer API this is the tuned model
/// resource itself; its state vocabulary is `CREATING`/`ACTIVE`/`FAILED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningJob {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub state: JobState,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuned_model: Option<TunedModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuned_model_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervised_tuning_spec: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuning_data_stats: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip)]
    pub(crate) backend: Option<BackendKind>,
}

impl Job for TuningJob {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn state(&self) -> &JobState {
        &self.state
    }

    fn backend(&self) -> Option<BackendKind> {
        self.backend
    }
}

impl TuningJob {
    pub fn has_ended(&self) -> bool {
        Job::has_ended(self)
    }

    pub fn has_succeeded(&self) -> bool {
        Job::has_succeeded(self)
    }
}
