//! Foreground sync commands.

use clap::Subcommand;
use ldesk_sync::{MergeDecision, SyncJob, SyncOrchestrator, SyncOutcome, SyncStatus, SyncTarget};

/// Sub-commands available under `sync`.
#[derive(Debug, Subcommand)]
pub enum SyncCommands {
    /// Fetch one location and reconcile it into the store
    Location {
        /// Any identifier shape, e.g. `accounts/7/locations/42` or `42`
        id: String,
    },
    /// Fetch every review of a stored location
    Reviews {
        /// Location identifier
        id: String,
    },
}

impl SyncCommands {
    fn target(&self) -> (SyncTarget, &str) {
        match self {
            Self::Location { id } => (SyncTarget::Location, id),
            Self::Reviews { id } => (SyncTarget::Reviews, id),
        }
    }
}

/// Requests the sync and waits until it succeeds or fails for good.
///
/// # Errors
///
/// Returns an error for a malformed identifier or a job that ends `failed`.
pub(crate) async fn run_sync(
    sync: &SyncOrchestrator,
    command: &SyncCommands,
) -> anyhow::Result<SyncJob> {
    let (target, id) = command.target();
    tracing::info!(?target, id, "sync requested");
    let job = sync.request_sync(target, id)?.wait().await;

    if job.status == SyncStatus::Succeeded {
        tracing::info!(entity = %job.entity, attempts = job.attempt, "sync finished");
        return Ok(job);
    }

    let message = job
        .last_error
        .as_ref()
        .map_or_else(|| "no error recorded".to_owned(), |e| e.message.clone());
    tracing::error!(
        entity = %job.entity,
        attempts = job.attempt,
        error = %message,
        "sync failed"
    );
    if job.last_error.as_ref().is_some_and(|e| e.reauthorize) {
        anyhow::bail!(
            "sync of {} failed: {message}; reconnect the provider account and retry",
            job.entity
        );
    }
    anyhow::bail!(
        "sync of {} failed after {} attempt(s): {message}",
        job.entity,
        job.attempt
    )
}

/// One-line summary of a settled job.
pub(crate) fn describe(job: &SyncJob) -> String {
    match job.outcome {
        Some(SyncOutcome::Location { decision }) => {
            let detail = match decision {
                MergeDecision::Inserted => "new record stored",
                MergeDecision::Replaced => "stored record replaced",
                MergeDecision::Kept => "stored record kept",
            };
            format!("{} synced: {detail}", job.entity)
        }
        Some(SyncOutcome::Reviews(s)) => format!(
            "{} synced: {} page(s), {} fetched, {} new, {} updated, {} unchanged",
            job.entity, s.pages, s.fetched, s.inserted, s.updated, s.unchanged
        ),
        None => format!("{} is {:?}", job.entity, job.status),
    }
}
