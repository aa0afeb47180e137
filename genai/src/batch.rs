use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::backend::BackendKind;
use crate::error::ApiStatus;
use crate::jobs::{Job, JobState};

/// Optional parameters for creating a batch prediction job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateBatchJobConfig {
    /// Defaults to `genai_batch_job_{timestamp}`.
    pub display_name: Option<String>,
    /// `gs://` prefix or `bq://` table for the predictions; derived from the
    /// source when absent.
    pub dest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs_uri: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bigquery_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobDestination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bigquery_uri: Option<String>,
}

impl BatchJobSource {
    /// Classifies a source URI: `gs://` is JSONL, `bq://` is BigQuery.
    pub(crate) fn from_uri(src: &str) -> Option<Self> {
        if src.starts_with("gs://") {
            Some(Self { format: Some("jsonl".into()), gcs_uri: Some(vec![src.to_string()]), bigquery_uri: None })
        } else if src.starts_with("bq://") {
            Some(Self { format: Some("bigquery".into()), gcs_uri: None, bigquery_uri: Some(src.to_string()) })
        } else {
            None
        }
    }
}

impl BatchJobDestination {
    pub(crate) fn from_uri(dest: &str) -> Option<Self> {
        if dest.starts_with("gs://") {
            Some(Self { format: Some("jsonl".into()), gcs_uri: Some(dest.to_string()), bigquery_uri: None })
        } else if dest.starts_with("bq://") {
            Some(Self { format: Some("bigquery".into()), gcs_uri: None, bigquery_uri: Some(dest.to_string()) })
        } else {
            None
        }
    }
}

/// A Vertex AI batch prediction job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiStatus>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<OffsetDateTime>,
    #[serde(default, with = "crate::common::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<BatchJobSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<BatchJobDestination>,
    #[serde(skip)]
    pub(crate) backend: Option<BackendKind>,
}

impl Job for BatchJob {
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

impl BatchJob {
    pub fn has_ended(&self) -> bool {
        Job::has_ended(self)
    }

    pub fn has_succeeded(&self) -> bool {
        Job::has_succeeded(self)
    }
}

/// The long-running operation returned by a delete call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResourceJob {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_format_follows_scheme() {
        let gcs = BatchJobSource::from_uri("gs://bucket/in.jsonl").unwrap();
        assert_eq!(gcs.format.as_deref(), Some("jsonl"));
        let bq = BatchJobSource::from_uri("bq://p.d.t").unwrap();
        assert_eq!(bq.format.as_deref(), Some("bigquery"));
        assert!(BatchJobSource::from_uri("s3://nope").is_none());
    }

    #[test]
    fn state_accessors_use_producing_backend() {
        let job = BatchJob {
            state: JobState::from("JOB_STATE_CANCELLED"),
            backend: Some(BackendKind::Vertex),
            ..Default::default()
        };
        assert!(job.has_ended());
        assert!(!job.has_succeeded());
    }
}
