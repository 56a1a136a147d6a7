//! Error kinds shared across every gateway and the orchestrator.
//!
//! One flat enum rather than per-crate error zoos: callers match on
//! kind, not on crate origin. Gateways still keep their own narrower
//! error types internally and convert into this one at the boundary
//! (mirrors the teacher's `BlobStoreError` → caller-facing conversion
//! idiom, generalized workspace-wide).

use crate::job::JobStatus;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AtlasError {
    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("fetch failed: {0}")]
    FetchFailed(FetchErrorKind),

    #[error("model call failed: {0}")]
    ModelCallFailed(ModelErrorKind),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("store failure: {0}")]
    StoreFailure(String),

    #[error("queue failure: {0}")]
    QueueFailure(String),

    #[error("broadcast failure: {0}")]
    BroadcastFailure(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl AtlasError {
    /// True for errors that `spec.md` §7 says are always surfaced to
    /// the caller of C9, never swallowed or retried locally.
    pub fn is_caller_fatal(&self) -> bool {
        matches!(
            self,
            AtlasError::ValidationError(_)
                | AtlasError::InvalidTransition { .. }
                | AtlasError::AlreadyExists
                | AtlasError::NotFound
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchErrorKind {
    #[error("rate limited (429)")]
    RateLimited,
    #[error("forbidden (403)")]
    Forbidden,
    #[error("unavailable (503)")]
    Unavailable,
    #[error("captcha challenge encountered")]
    Captcha,
    #[error("network error: {0}")]
    Network(String),
}

impl FetchErrorKind {
    /// Whether a caller should retry with the next rung of the
    /// escalation ladder, per §4.5's "annotated with retry hints".
    pub fn retry_hint(&self) -> bool {
        !matches!(self, FetchErrorKind::Forbidden)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelErrorKind {
    #[error("rate limited")]
    RateLimit,
    #[error("authentication failed")]
    Auth,
    #[error("model call timed out")]
    Timeout,
    #[error("model/tier unavailable")]
    Unavailable,
    #[error("model refused the request")]
    Refusal,
}

impl ModelErrorKind {
    /// Whether the model router's fallback chain should be tried
    /// before surfacing the error to the caller.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, ModelErrorKind::Auth)
    }
}
