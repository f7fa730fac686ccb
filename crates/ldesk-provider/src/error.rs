use std::time::Duration;

use ldesk_core::ErrorKind;
use thiserror::Error;

/// Errors returned by the directory provider collaborators.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The call exceeded its time bound.
    #[error("provider request timed out")]
    Timeout,

    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider server error (HTTP {status})")]
    Server { status: u16 },

    /// The account lacks the authorization scope for this call.
    #[error("insufficient authorization: {0}")]
    InsufficientScope(String),

    #[error("not found at provider: {0}")]
    NotFound(String),

    /// Any other 4xx: the provider refused this exact request.
    #[error("provider rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid provider URL: {0}")]
    InvalidUrl(String),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The body parsed but lacks something every record needs.
    #[error("invalid provider payload for {context}: {reason}")]
    InvalidPayload { context: String, reason: String },

    /// A collaborator outside the HTTP provider failed (e.g. the reply
    /// suggestion service).
    #[error("{0}")]
    Unavailable(String),
}

impl ProviderError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout | Self::RateLimited { .. } | Self::Server { .. } | Self::Unavailable(_) => {
                ErrorKind::Transient
            }
            Self::Http(e) => {
                if e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
                {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Internal
                }
            }
            Self::InsufficientScope(_) => ErrorKind::Permission,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Rejected { .. } => ErrorKind::Validation,
            Self::InvalidUrl(_) | Self::Deserialize { .. } | Self::InvalidPayload { .. } => {
                ErrorKind::Internal
            }
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}
