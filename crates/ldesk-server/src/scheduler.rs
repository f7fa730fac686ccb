//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! periodic sync of every stored location.

use ldesk_sync::SyncOrchestrator;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is rejected, or the scheduler fails to start.
pub async fn build_scheduler(
    sync: SyncOrchestrator,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_sync_job(&scheduler, sync, cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Requests a location and a review sync for every stored location on
/// each tick of `cron`. Jobs already running for an entity are joined, not
/// duplicated.
async fn register_sync_job(
    scheduler: &JobScheduler,
    sync: SyncOrchestrator,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let sync = sync.clone();

        Box::pin(async move {
            tracing::info!("scheduler: starting periodic sync");
            match sync.sync_all().await {
                Ok(requested) => {
                    tracing::info!(requested, "scheduler: periodic sync requested");
                }
                Err(e) => {
                    tracing::error!(error = %e, "scheduler: failed to list locations for sync");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: periodic sync registered");
    Ok(())
}
