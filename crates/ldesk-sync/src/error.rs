use std::time::Duration;

use ldesk_core::{CoreError, ErrorKind, NormalizedId};
use ldesk_db::DbError;
use ldesk_provider::ProviderError;
use ldesk_reviews::ReviewError;
use thiserror::Error;

use crate::dedup::ReconcileError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    /// Reviews were requested for a location that has never been synced.
    #[error("location {0} is not stored; sync the location first")]
    UnknownLocation(NormalizedId),

    #[error("provider call exceeded {0:?}")]
    Timeout(Duration),

    #[error("sync cancelled")]
    Cancelled,
}

impl From<ReconcileError> for SyncError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Invalid(e) => Self::Invalid(e),
            ReconcileError::Store(e) => Self::Store(e),
        }
    }
}

impl SyncError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid(e) => e.kind(),
            Self::Provider(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Review(e) => e.kind(),
            Self::UnknownLocation(_) => ErrorKind::NotFound,
            Self::Timeout(_) => ErrorKind::Transient,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
