//! Lifecycle of long-running jobs (tuning and batch prediction).
//!
//! The two backends report job state in unrelated vocabularies. [`JobState`]
//! carries the literal the backend sent; [`JobLifecycle`] is the abstract
//! state machine both vocabularies map onto. Terminal classification always
//! goes through the literal sets of the backend that produced the value.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::BackendKind;
use crate::error::Error;

pub const VERTEX_SUCCEEDED_STATES: &[&str] = &["JOB_STATE_SUCCEEDED"];
pub const VERTEX_ENDED_STATES: &[&str] =
    &["JOB_STATE_SUCCEEDED", "JOB_STATE_FAILED", "JOB_STATE_CANCELLED", "JOB_STATE_EXPIRED"];
pub const STUDIO_SUCCEEDED_STATES: &[&str] = &["ACTIVE"];
pub const STUDIO_ENDED_STATES: &[&str] = &["ACTIVE", "FAILED"];

/// "Succeeded" and "ended" literal sets of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStateSets {
    pub succeeded: &'static [&'static str],
    pub ended: &'static [&'static str],
}

impl JobStateSets {
    pub fn for_backend(backend: BackendKind) -> Self {
        match backend {
            BackendKind::Vertex => Self { succeeded: VERTEX_SUCCEEDED_STATES, ended: VERTEX_ENDED_STATES },
            BackendKind::Studio => Self { succeeded: STUDIO_SUCCEEDED_STATES, ended: STUDIO_ENDED_STATES },
        }
    }
}

/// A job state literal as reported by either backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    #[default]
    JobStateUnspecified,
    JobStateQueued,
    JobStatePending,
    JobStateRunning,
    JobStateSucceeded,
    JobStateFailed,
    JobStateCancelling,
    JobStateCancelled,
    JobStatePaused,
    JobStateExpired,
    JobStateUpdating,
    JobStatePartiallySucceeded,
    StateUnspecified,
    Creating,
    Active,
    Failed,
    /// A literal this version does not know.
    Unknown(String),
}

impl JobState {
    pub fn as_str(&self) -> &str {
        match self {
            JobState::JobStateUnspecified => "JOB_STATE_UNSPECIFIED",
            JobState::JobStateQueued => "JOB_STATE_QUEUED",
            JobState::JobStatePending => "JOB_STATE_PENDING",
            JobState::JobStateRunning => "JOB_STATE_RUNNING",
            JobState::JobStateSucceeded => "JOB_STATE_SUCCEEDED",
            JobState::JobStateFailed => "JOB_STATE_FAILED",
            JobState::JobStateCancelling => "JOB_STATE_CANCELLING",
            JobState::JobStateCancelled => "JOB_STATE_CANCELLED",
            JobState::JobStatePaused => "JOB_STATE_PAUSED",
            JobState::JobStateExpired => "JOB_STATE_EXPIRED",
            JobState::JobStateUpdating => "JOB_STATE_UPDATING",
            JobState::JobStatePartiallySucceeded => "JOB_STATE_PARTIALLY_SUCCEEDED",
            JobState::StateUnspecified => "STATE_UNSPECIFIED",
            JobState::Creating => "CREATING",
            JobState::Active => "ACTIVE",
            JobState::Failed => "FAILED",
            JobState::Unknown(raw) => raw,
        }
    }

    pub fn lifecycle(&self) -> JobLifecycle {
        match self {
            JobState::JobStateQueued => JobLifecycle::Queued,
            JobState::JobStatePending | JobState::Creating => JobLifecycle::Pending,
            JobState::JobStateRunning => JobLifecycle::Running,
            JobState::JobStateUpdating => JobLifecycle::Updating,
            JobState::JobStatePaused => JobLifecycle::Paused,
            JobState::JobStateCancelling => JobLifecycle::Cancelling,
            JobState::JobStateSucceeded | JobState::Active => JobLifecycle::Succeeded,
            JobState::JobStateFailed | JobState::Failed => JobLifecycle::Failed,
            JobState::JobStateCancelled => JobLifecycle::Cancelled,
            JobState::JobStateExpired => JobLifecycle::Expired,
            JobState::JobStatePartiallySucceeded => JobLifecycle::PartiallySucceeded,
            JobState::JobStateUnspecified | JobState::StateUnspecified | JobState::Unknown(_) => {
                JobLifecycle::Unspecified
            }
        }
    }

    /// Whether the literal is in the backend's "ended" set. Without a known
    /// backend the union of both sets is consulted.
    pub fn has_ended(&self, backend: Option<BackendKind>) -> bool {
        self.in_sets(backend, |sets| sets.ended)
    }

    pub fn has_succeeded(&self, backend: Option<BackendKind>) -> bool {
        self.in_sets(backend, |sets| sets.succeeded)
    }

    fn in_sets(&self, backend: Option<BackendKind>, pick: fn(JobStateSets) -> &'static [&'static str]) -> bool {
        let literal = self.as_str();
        match backend {
            Some(kind) => pick(JobStateSets::for_backend(kind)).contains(&literal),
            None => [BackendKind::Vertex, BackendKind::Studio]
                .into_iter()
                .any(|kind| pick(JobStateSets::for_backend(kind)).contains(&literal)),
        }
    }
}

impl From<String> for JobState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "JOB_STATE_UNSPECIFIED" => JobState::JobStateUnspecified,
            "JOB_STATE_QUEUED" => JobState::JobStateQueued,
            "JOB_STATE_PENDING" => JobState::JobStatePending,
            "JOB_STATE_RUNNING" => JobState::JobStateRunning,
            "JOB_STATE_SUCCEEDED" => JobState::JobStateSucceeded,
            "JOB_STATE_FAILED" => JobState::JobStateFailed,
            "JOB_STATE_CANCELLING" => JobState::JobStateCancelling,
            "JOB_STATE_CANCELLED" => JobState::JobStateCancelled,
            "JOB_STATE_PAUSED" => JobState::JobStatePaused,
            "JOB_STATE_EXPIRED" => JobState::JobStateExpired,
            "JOB_STATE_UPDATING" => JobState::JobStateUpdating,
            "JOB_STATE_PARTIALLY_SUCCEEDED" => JobState::JobStatePartiallySucceeded,
            "STATE_UNSPECIFIED" => JobState::StateUnspecified,
            "CREATING" => JobState::Creating,
            "ACTIVE" => JobState::Active,
            "FAILED" => JobState::Failed,
            _ => JobState::Unknown(raw),
        }
    }
}

impl From<&str> for JobState {
    fn from(raw: &str) -> Self {
        JobState::from(raw.to_string())
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-neutral job lifecycle.
///
/// `Queued -> Pending -> Running -> {Succeeded, Failed, Cancelled, Expired,
/// PartiallySucceeded}`; `Cancelling` is entered from `Pending` or `Running`
/// after a cancel request; `Updating` and `Paused` return to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum JobLifecycle {
    Unspecified,
    Queued,
    Pending,
    Running,
    Updating,
    Paused,
    Cancelling,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
    PartiallySucceeded,
}

impl JobLifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobLifecycle::Succeeded
                | JobLifecycle::Failed
                | JobLifecycle::Cancelled
                | JobLifecycle::Expired
                | JobLifecycle::PartiallySucceeded
        )
    }

    /// Whether observing `next` after `self` is a forward move.
    pub fn can_transition_to(self, next: JobLifecycle) -> bool {
        use JobLifecycle::*;
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        if next.is_terminal() || self == Unspecified {
            return true;
        }
        match (self, next) {
            (Queued, Pending | Running) => true,
            (Pending, Running | Cancelling) => true,
            (Running, Updating | Paused | Cancelling) => true,
            (Updating | Paused, Running | Cancelling) => true,
            _ => false,
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Requested,
    /// The job had already reached a terminal state.
    AlreadyEnded,
}

/// Whether a cancel error only says the job is already terminal.
pub(crate) fn is_already_ended(err: &Error) -> bool {
    let Error::FailedPrecondition { message } = err else {
        return false;
    };
    let message_upper = message.to_uppercase();
    message_upper.contains("TERMINAL")
        || VERTEX_ENDED_STATES.iter().chain(STUDIO_ENDED_STATES).any(|state| message_upper.contains(state))
}

/// Common surface of tuning and batch jobs.
pub trait Job {
    fn name(&self) -> Option<&str>;
    fn state(&self) -> &JobState;
    /// Backend that produced the value, if it came from a client call.
    fn backend(&self) -> Option<BackendKind>;

    fn has_ended(&self) -> bool {
        self.state().has_ended(self.backend())
    }

    fn has_succeeded(&self) -> bool {
        self.state().has_succeeded(self.backend())
    }

    fn lifecycle(&self) -> JobLifecycle {
        self.state().lifecycle()
    }
}

/// Re-fetches a job until it ends, yielding every snapshot.
///
/// The stream ends after the first terminal snapshot or the first error.
pub fn poll_until_ended<J, F, Fut>(mut get: F, interval: Duration) -> impl Stream<Item = Result<J, Error>>
where
    J: Job,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<J, Error>>,
{
    async_stream::try_stream! {
        let mut previous: Option<JobLifecycle> = None;
        loop {
            let job = get().await?;
            let lifecycle = job.lifecycle();
            if let Some(previous) = previous {
                if !previous.can_transition_to(lifecycle) {
                    warn!(%previous, %lifecycle, name = job.name(), "job state moved backwards");
                }
            }
            previous = Some(lifecycle);
            let ended = job.has_ended();
            debug!(state = %job.state(), ended, "polled job");
            yield job;
            if ended {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::collections::VecDeque;

    #[test]
    fn terminal_classification_per_backend() {
        let vertex = Some(BackendKind::Vertex);
        let studio = Some(BackendKind::Studio);

        let succeeded = JobState::from("JOB_STATE_SUCCEEDED");
        assert!(succeeded.has_ended(vertex));
        assert!(succeeded.has_succeeded(vertex));

        let active = JobState::from("ACTIVE");
        assert!(active.has_ended(studio));
        assert!(active.has_succeeded(studio));
        assert!(!active.has_ended(vertex));

        let running = JobState::from("JOB_STATE_RUNNING");
        assert!(!running.has_ended(vertex));
        assert!(!running.has_ended(None));

        assert!(JobState::from("FAILED").has_ended(None));
        assert!(!JobState::from("JOB_STATE_FAILED").has_succeeded(vertex));
    }

    #[test]
    fn unknown_literals_round_trip() {
        let state: JobState = serde_json::from_str("\"JOB_STATE_SOMETHING_NEW\"").unwrap();
        assert_eq!(state, JobState::Unknown("JOB_STATE_SOMETHING_NEW".into()));
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"JOB_STATE_SOMETHING_NEW\"");
        assert_eq!(state.lifecycle(), JobLifecycle::Unspecified);
    }

    #[test]
    fn lifecycle_is_monotonic() {
        use JobLifecycle::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Cancelling));
        assert!(Updating.can_transition_to(Running));
        assert!(!Queued.can_transition_to(Cancelling));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(Cancelling.can_transition_to(Cancelled));
    }

    #[test]
    fn failed_precondition_on_terminal_job_is_already_ended() {
        let err = Error::FailedPrecondition {
            message: "Job is in JOB_STATE_SUCCEEDED and cannot be cancelled".into(),
        };
        assert!(is_already_ended(&err));
        assert!(!is_already_ended(&Error::FailedPrecondition { message: "quota".into() }));
        assert!(!is_already_ended(&Error::NotFound { message: "JOB_STATE_FAILED".into() }));
    }

    #[derive(Debug)]
    struct Fake(JobState);

    impl Job for Fake {
        fn name(&self) -> Option<&str> {
            Some("jobs/1")
        }
        fn state(&self) -> &JobState {
            &self.0
        }
        fn backend(&self) -> Option<BackendKind> {
            Some(BackendKind::Vertex)
        }
    }

    #[tokio::test]
    async fn polling_stops_after_terminal_snapshot() {
        let mut states: VecDeque<&str> =
            ["JOB_STATE_PENDING", "JOB_STATE_RUNNING", "JOB_STATE_SUCCEEDED", "JOB_STATE_RUNNING"].into();
        let snapshots: Vec<Fake> = poll_until_ended(
            || {
                let next = states.pop_front().map(JobState::from);
                async move { Ok(Fake(next.unwrap_or_default())) }
            },
            Duration::from_millis(1),
        )
        .try_collect()
        .await
        .unwrap();
        let seen: Vec<_> = snapshots.iter().map(|f| f.0.as_str().to_string()).collect();
        assert_eq!(seen, ["JOB_STATE_PENDING", "JOB_STATE_RUNNING", "JOB_STATE_SUCCEEDED"]);
    }
}
