use thiserror::Error;

/// Failure classes shared across the workspace.
///
/// Every crate-level error reports one of these so callers (the sync
/// orchestrator, the bulk coordinator, the HTTP layer) can decide between
/// retrying, asking the operator to reconnect, or rejecting the input.
/// Merge conflicts between two valid location records are resolved by the
/// deduplicator and never surface as an error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeout, 5xx, rate limit. Eligible for bounded retry with backoff.
    Transient,
    /// The provider rejected our authorization. Never retried; the operator
    /// must reauthorize.
    Permission,
    /// Malformed input rejected at the boundary. No retry, nothing persisted.
    Validation,
    /// The referenced entity does not exist.
    NotFound,
    /// Cooperative cancellation (session teardown, superseded job).
    Cancelled,
    /// Anything else: storage failures, unexpected payloads.
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// `true` when the caller should prompt the operator to reconnect the
    /// provider account.
    #[must_use]
    pub fn needs_reauthorization(self) -> bool {
        matches!(self, Self::Permission)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::Permission => "permission",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("malformed identifier \"{0}\": no entity number could be extracted")]
    MalformedIdentifier(String),

    #[error("invalid cursor \"{0}\"")]
    InvalidCursor(String),

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),

    #[error("reply text must not be empty")]
    EmptyReply,

    #[error("reply text is {len} characters; the provider limit is {max}")]
    ReplyTooLong { len: usize, max: usize },

    #[error("completeness weight for {signal} must be greater than zero")]
    InvalidWeight { signal: &'static str },

    #[error("unknown {field} value \"{value}\"")]
    UnknownVariant { field: &'static str, value: String },
}

impl CoreError {
    /// Every core error is an input problem caught at the boundary.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
