use shared::{
    domain::{BucketKey, CourseId, EntryId, PlanId},
    error::ApiError,
};
use thiserror::Error;

/// Failure of a single backend call.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("invalid api base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl BackendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Api(err) => Some(err.status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            BackendError::Decode(value.to_string())
        } else {
            BackendError::Transport(value.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(value: serde_json::Error) -> Self {
        BackendError::Decode(value.to_string())
    }
}

/// Errors surfaced by the plan editor.
///
/// Everything except [`PlanError::Backend`] is a validation short-circuit: no
/// request was sent and local state is untouched.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("not authenticated: no user identity is configured")]
    NotAuthenticated,
    #[error("no plan is open")]
    NoPlanOpen,
    #[error("plan {0} is not in the plan list")]
    UnknownPlan(PlanId),
    #[error("entry {0} is not part of the open plan")]
    UnknownEntry(EntryId),
    #[error("entry {0} is still waiting for server confirmation")]
    EntryNotConfirmed(EntryId),
    #[error("entry {0} already has a change in flight")]
    EntryBusy(EntryId),
    #[error("course {0} is already in the plan")]
    DuplicateCourse(CourseId),
    #[error("{0} is outside the plan grid")]
    OutsideGrid(BucketKey),
    #[error("plan name must not be empty")]
    EmptyPlanName,
    #[error("{action} failed: {source}")]
    Backend {
        action: &'static str,
        #[source]
        source: BackendError,
    },
}

impl PlanError {
    pub fn backend(action: &'static str, source: BackendError) -> Self {
        PlanError::Backend { action, source }
    }

    pub fn is_validation(&self) -> bool {
        !matches!(self, PlanError::Backend { .. })
    }
}
