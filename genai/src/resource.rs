//! Backend path resolution for logical resource names.
//!
//! Resolution is pure string validation and templating; nothing here talks to
//! the network. Names that cannot be classified are rejected rather than
//! passed through.

use std::sync::LazyLock;

use regex::Regex;

use crate::backend::BackendKind;
use crate::error::{Error, invalid_argument, unsupported};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Model,
    TuningJob,
    BatchJob,
    CachedContent,
    File,
}

/// The backend a name is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Studio,
    Vertex { project: &'a str, location: &'a str },
}

impl Target<'_> {
    pub fn kind(&self) -> BackendKind {
        match self {
            Target::Studio => BackendKind::Studio,
            Target::Vertex { .. } => BackendKind::Vertex,
        }
    }
}

const ID: &str = r"[A-Za-z0-9_][A-Za-z0-9._@-]*";

macro_rules! pattern {
    ($name:ident, $fmt:literal) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(&format!($fmt, id = ID)).expect("unreachable error: invalid resource pattern")
        });
    };
}

pattern!(BARE_ID, r"^{id}$");
pattern!(VERTEX_PREFIX, r"^projects/{id}/locations/{id}/");
pattern!(VERTEX_MODEL_FULL, r"^projects/{id}/locations/{id}/(publishers/{id}/models/{id}|models/{id}|endpoints/{id})$");
pattern!(VERTEX_MODEL_PUBLISHER, r"^publishers/{id}/models/{id}$");
pattern!(SHORT_PUBLISHER_MODEL, r"^{id}/{id}$");
pattern!(VERTEX_TUNING_FULL, r"^projects/{id}/locations/{id}/tuningJobs/{id}$");
pattern!(VERTEX_BATCH_FULL, r"^projects/{id}/locations/{id}/batchPredictionJobs/[0-9]+$");
pattern!(VERTEX_CACHE_FULL, r"^projects/{id}/locations/{id}/cachedContents/{id}$");
pattern!(STUDIO_FILE_URI, r"^https://generativelanguage\.googleapis\.com/[^/]+/(files/{id})$");

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("unreachable error: invalid resource pattern"));

fn prefixed<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    raw.strip_prefix(prefix).filter(|rest| BARE_ID.is_match(rest))
}

fn malformed(kind: ResourceKind, raw: &str) -> Error {
    invalid_argument(format!("invalid {kind} name: '{raw}'"))
}

/// Resolves `raw` to the path segment the target backend expects.
///
/// Vertex model names resolve to their publisher-relative form
/// (`publishers/google/models/x`); use [`vertex_full_path`] where the fully
/// qualified form is needed. Every other Vertex resource resolves fully
/// qualified.
pub fn resolve(kind: ResourceKind, raw: &str, target: Target<'_>) -> Result<String, Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(invalid_argument(format!("{kind} name must not be empty")));
    }
    match target {
        Target::Studio => resolve_studio(kind, raw),
        Target::Vertex { project, location } => resolve_vertex(kind, raw, project, location),
    }
}

fn resolve_studio(kind: ResourceKind, raw: &str) -> Result<String, Error> {
    if raw.starts_with("projects/") || raw.starts_with("publishers/") {
        return Err(invalid_argument(format!(
            "'{raw}' is a Vertex AI resource path and cannot be used with the Gemini Developer API"
        )));
    }
    let bare = BARE_ID.is_match(raw);
    match kind {
        ResourceKind::Model => {
            if prefixed(raw, "models/").is_some() || prefixed(raw, "tunedModels/").is_some() {
                Ok(raw.to_string())
            } else if bare {
                Ok(format!("models/{raw}"))
            } else {
                Err(malformed(kind, raw))
            }
        }
        ResourceKind::TuningJob => {
            if prefixed(raw, "tunedModels/").is_some() {
                Ok(raw.to_string())
            } else if bare {
                Ok(format!("tunedModels/{raw}"))
            } else {
                Err(malformed(kind, raw))
            }
        }
        ResourceKind::CachedContent => {
            if prefixed(raw, "cachedContents/").is_some() {
                Ok(raw.to_string())
            } else if bare {
                Ok(format!("cachedContents/{raw}"))
            } else {
                Err(malformed(kind, raw))
            }
        }
        ResourceKind::File => {
            if let Some(captures) = STUDIO_FILE_URI.captures(raw) {
                Ok(captures[1].to_string())
            } else if prefixed(raw, "files/").is_some() {
                Ok(raw.to_string())
            } else if bare {
                Ok(format!("files/{raw}"))
            } else {
                Err(malformed(kind, raw))
            }
        }
        ResourceKind::BatchJob => Err(unsupported(
            "batch jobs (only supported in the Vertex AI client)",
            BackendKind::Studio,
        )),
    }
}

fn resolve_vertex(kind: ResourceKind, raw: &str, project: &str, location: &str) -> Result<String, Error> {
    let scope = format!("projects/{project}/locations/{location}");
    let bare = BARE_ID.is_match(raw);
    match kind {
        ResourceKind::Model => {
            if raw.starts_with("projects/") {
                if VERTEX_MODEL_FULL.is_match(raw) {
                    Ok(raw.to_string())
                } else {
                    Err(malformed(kind, raw))
                }
            } else if VERTEX_MODEL_PUBLISHER.is_match(raw) || prefixed(raw, "models/").is_some() {
                Ok(raw.to_string())
            } else if bare {
                Ok(format!("publishers/google/models/{raw}"))
            } else if SHORT_PUBLISHER_MODEL.is_match(raw) {
                let (publisher, model) = raw.split_once('/').ok_or_else(|| malformed(kind, raw))?;
                Ok(format!("publishers/{publisher}/models/{model}"))
            } else {
                Err(malformed(kind, raw))
            }
        }
        ResourceKind::TuningJob => {
            if VERTEX_TUNING_FULL.is_match(raw) {
                Ok(raw.to_string())
            } else if let Some(id) = prefixed(raw, "tuningJobs/") {
                Ok(format!("{scope}/tuningJobs/{id}"))
            } else if bare {
                Ok(format!("{scope}/tuningJobs/{raw}"))
            } else {
                Err(malformed(kind, raw))
            }
        }
        ResourceKind::BatchJob => {
            let id = raw.strip_prefix("batchPredictionJobs/").unwrap_or(raw);
            if VERTEX_BATCH_FULL.is_match(raw) {
                Ok(raw.to_string())
            } else if DIGITS.is_match(id) {
                Ok(format!("{scope}/batchPredictionJobs/{id}"))
            } else {
                Err(invalid_argument(format!("Invalid batch job name: {raw}.")))
            }
        }
        ResourceKind::CachedContent => {
            if VERTEX_CACHE_FULL.is_match(raw) {
                Ok(raw.to_string())
            } else if let Some(id) = prefixed(raw, "cachedContents/") {
                Ok(format!("{scope}/cachedContents/{id}"))
            } else if bare {
                Ok(format!("{scope}/cachedContents/{raw}"))
            } else {
                Err(malformed(kind, raw))
            }
        }
        ResourceKind::File => Err(unsupported(
            "file operations (only supported in the Gemini Developer API)",
            BackendKind::Vertex,
        )),
    }
}

/// Qualifies a Vertex path with `projects/{p}/locations/{l}/` unless it is
/// already fully qualified.
pub fn vertex_full_path(path: &str, project: &str, location: &str) -> String {
    if VERTEX_PREFIX.is_match(path) {
        path.to_string()
    } else {
        format!("projects/{project}/locations/{location}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: Target<'static> = Target::Vertex { project: "p", location: "us-central1" };

    #[test]
    fn vertex_model_table() {
        let cases = [
            ("gemini-1.5-pro-002", "publishers/google/models/gemini-1.5-pro-002"),
            ("models/my-tuned", "models/my-tuned"),
            ("publishers/google/models/gemini-1.5-pro-002", "publishers/google/models/gemini-1.5-pro-002"),
            ("meta/llama3", "publishers/meta/models/llama3"),
            (
                "projects/p/locations/us-central1/publishers/google/models/x",
                "projects/p/locations/us-central1/publishers/google/models/x",
            ),
            ("textembedding-gecko@003", "publishers/google/models/textembedding-gecko@003"),
        ];
        for (raw, expected) in cases {
            assert_eq!(resolve(ResourceKind::Model, raw, VERTEX).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn vertex_rejects_malformed_paths() {
        for raw in ["projects/p/models", "a/b/c", "projects/p/locations/l/widgets/x", "has space"] {
            assert!(resolve(ResourceKind::Model, raw, VERTEX).unwrap_err().is_invalid_argument(), "{raw}");
        }
    }

    #[test]
    fn studio_model_table() {
        assert_eq!(resolve(ResourceKind::Model, "gemini-2.0-flash", Target::Studio).unwrap(), "models/gemini-2.0-flash");
        assert_eq!(resolve(ResourceKind::Model, "tunedModels/abc", Target::Studio).unwrap(), "tunedModels/abc");
        let err = resolve(ResourceKind::Model, "projects/p/locations/l/publishers/google/models/x", Target::Studio)
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(resolve(ResourceKind::Model, "publishers/google/models/x", Target::Studio).is_err());
    }

    #[test]
    fn batch_job_names() {
        assert_eq!(
            resolve(ResourceKind::BatchJob, "2803006536245313536", VERTEX).unwrap(),
            "projects/p/locations/us-central1/batchPredictionJobs/2803006536245313536"
        );
        let full = "projects/964831358985/locations/us-central1/batchPredictionJobs/2803006536245313536";
        assert_eq!(resolve(ResourceKind::BatchJob, full, VERTEX).unwrap(), full);

        let err = resolve(ResourceKind::BatchJob, "invalid_name", VERTEX).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("invalid_name"), "{err}");

        assert!(resolve(ResourceKind::BatchJob, "123", Target::Studio).unwrap_err().is_unsupported());
    }

    #[test]
    fn tuning_and_cache_names() {
        assert_eq!(
            resolve(ResourceKind::TuningJob, "42", VERTEX).unwrap(),
            "projects/p/locations/us-central1/tuningJobs/42"
        );
        assert_eq!(resolve(ResourceKind::TuningJob, "my-model", Target::Studio).unwrap(), "tunedModels/my-model");
        assert_eq!(
            resolve(ResourceKind::CachedContent, "cachedContents/abc", VERTEX).unwrap(),
            "projects/p/locations/us-central1/cachedContents/abc"
        );
        assert_eq!(resolve(ResourceKind::CachedContent, "abc", Target::Studio).unwrap(), "cachedContents/abc");
    }

    #[test]
    fn file_names() {
        assert_eq!(
            resolve(ResourceKind::File, "https://generativelanguage.googleapis.com/v1beta/files/xyz", Target::Studio)
                .unwrap(),
            "files/xyz"
        );
        assert_eq!(resolve(ResourceKind::File, "xyz", Target::Studio).unwrap(), "files/xyz");
        assert!(resolve(ResourceKind::File, "xyz", VERTEX).unwrap_err().is_unsupported());
    }

    #[test]
    fn full_path_prefixing() {
        assert_eq!(
            vertex_full_path("publishers/google/models/x", "p", "l"),
            "projects/p/locations/l/publishers/google/models/x"
        );
        assert_eq!(vertex_full_path("projects/q/locations/m/models/1", "p", "l"), "projects/q/locations/m/models/1");
    }
}
