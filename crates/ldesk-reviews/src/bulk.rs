//! Applies one action to a selection of reviews with a bounded number of
//! concurrent workers.
//!
//! Every item succeeds or fails on its own and the report lists the ids that
//! failed, so a caller can resubmit just those. Batches are never retried
//! here.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use ldesk_core::{ErrorKind, ReviewId};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ReviewError;
use crate::lifecycle::LifecycleEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BulkAction {
    MarkRead,
    MarkUnread,
    /// Posts `text`, or a suggested reply per review when absent.
    ApproveAndPostReply {
        #[serde(default)]
        text: Option<String>,
    },
    AddLabel {
        label: String,
    },
}

impl BulkAction {
    fn name(&self) -> &'static str {
        match self {
            Self::MarkRead => "mark_read",
            Self::MarkUnread => "mark_unread",
            Self::ApproveAndPostReply { .. } => "approve_and_post_reply",
            Self::AddLabel { .. } => "add_label",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionBatch {
    pub items: BTreeSet<ReviewId>,
    pub action: BulkAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub id: ReviewId,
    pub kind: ErrorKind,
    pub message: String,
    /// Set when the provider account must be reconnected first.
    pub reauthorize: bool,
}

impl ItemFailure {
    fn from_error(id: ReviewId, err: &ReviewError) -> Self {
        Self {
            id,
            kind: err.kind(),
            message: err.to_string(),
            reauthorize: err.reauthorize(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    pub succeeded_ids: Vec<ReviewId>,
    pub failures: Vec<ItemFailure>,
}

impl BulkReport {
    #[must_use]
    pub fn failed_ids(&self) -> Vec<ReviewId> {
        self.failures.iter().map(|f| f.id).collect()
    }
}

#[derive(Debug, Clone)]
pub struct BulkCoordinator {
    lifecycle: Arc<LifecycleEngine>,
    max_workers: usize,
}

impl BulkCoordinator {
    #[must_use]
    pub fn new(lifecycle: Arc<LifecycleEngine>, max_workers: usize) -> Self {
        Self {
            lifecycle,
            max_workers: max_workers.max(1),
        }
    }

    /// Runs `batch.action` against every selected review.
    ///
    /// Once `cancel` fires, items that have not started are reported as
    /// cancelled failures. Items already running finish normally so a reply
    /// the provider accepted is always recorded.
    pub async fn run(&self, batch: SelectionBatch, cancel: &CancellationToken) -> BulkReport {
        let SelectionBatch { items, action } = batch;
        let total = items.len();
        info!(action = action.name(), items = total, "bulk action started");

        let action = &action;
        let mut results: Vec<(ReviewId, Result<(), ReviewError>)> = stream::iter(items)
            .map(|id| async move {
                if cancel.is_cancelled() {
                    return (id, Err(ReviewError::Cancelled));
                }
                (id, self.apply(id, action).await)
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;
        results.sort_by_key(|(id, _)| *id);

        let mut report = BulkReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.succeeded_ids.push(id),
                Err(e) => {
                    warn!(
                        action = action.name(),
                        review = %id,
                        kind = %e.kind(),
                        error = %e,
                        "bulk item failed"
                    );
                    report.failures.push(ItemFailure::from_error(id, &e));
                }
            }
        }
        report.succeeded = report.succeeded_ids.len();
        report.failed = report.failures.len();

        info!(
            action = action.name(),
            succeeded = report.succeeded,
            failed = report.failed,
            "bulk action finished"
        );
        report
    }

    async fn apply(&self, id: ReviewId, action: &BulkAction) -> Result<(), ReviewError> {
        match action {
            BulkAction::MarkRead => self.lifecycle.set_read(id, true).await?,
            BulkAction::MarkUnread => self.lifecycle.set_read(id, false).await?,
            BulkAction::ApproveAndPostReply { text } => {
                self.lifecycle.approve_and_post(id, text.as_deref()).await?
            }
            BulkAction::AddLabel { label } => self.lifecycle.add_label(id, label).await?,
        };
        Ok(())
    }
}

#[cfg(test)]
#[path = "bulk_test.rs"]
mod tests;
