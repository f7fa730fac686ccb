use std::sync::Arc;

use ldesk_core::{CoreError, ErrorKind, ReplyState, ReviewId};
use ldesk_db::DbError;
use ldesk_provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review {0} not found")]
    NotFound(ReviewId),

    /// The requested action is not a legal move from the review's state.
    #[error("cannot {action} review {id} while it is {from}")]
    IllegalTransition {
        id: ReviewId,
        from: ReplyState,
        action: &'static str,
    },

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("invalid label \"{0}\"")]
    InvalidLabel(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Storage failure. Shared so one failed read can be reported to every
    /// caller coalesced onto it.
    #[error(transparent)]
    Store(Arc<DbError>),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<DbError> for ReviewError {
    fn from(e: DbError) -> Self {
        Self::Store(Arc::new(e))
    }
}

impl ReviewError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::IllegalTransition { .. } | Self::Invalid(_) | Self::InvalidLabel(_) => {
                ErrorKind::Validation
            }
            Self::Provider(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// `true` when the operator must reconnect the provider account before
    /// this can succeed.
    #[must_use]
    pub fn reauthorize(&self) -> bool {
        self.kind().needs_reauthorization()
    }
}
