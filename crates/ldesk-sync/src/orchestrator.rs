//! Per-entity sync jobs.
//!
//! ```text
//! idle ──request──▶ syncing ──ok──▶ succeeded (entry dropped, back to idle)
//!                    │   ▲
//!          transient │   │ back-off elapsed
//!                    ▼   │
//!                   failed (next_retry_at set) ──budget spent / permanent──▶ failed
//! ```
//!
//! The registry holds at most one job per entity. A request for an entity
//! that is already syncing attaches to the running job; a request for an
//! entity whose job failed (or is waiting to retry) supersedes it. Jobs take
//! a worker permit for each attempt, every provider call is bounded by the
//! configured timeout, and cancellation always settles the job as failed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ldesk_core::{
    normalize_location_id, AppConfig, CompletenessWeights, CoreError, ErrorKind, NormalizedId,
};
use ldesk_provider::{DirectoryClient, ProviderError, ReviewSource};
use ldesk_reviews::{IngestOutcome, LifecycleEngine};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dedup::{Deduplicator, MergeDecision};
use crate::error::SyncError;
use crate::retry::RetryPolicy;

/// Review pages fetched per job before giving up on a runaway page token.
const MAX_REVIEW_PAGES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTarget {
    /// The location's directory listing.
    Location,
    /// The location's reviews.
    Reviews,
}

impl std::fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Location => "location",
            Self::Reviews => "reviews",
        })
    }
}

impl std::str::FromStr for SyncTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "location" | "locations" => Ok(Self::Location),
            "review" | "reviews" => Ok(Self::Reviews),
            other => Err(CoreError::UnknownVariant {
                field: "sync target",
                value: other.to_owned(),
            }),
        }
    }
}

/// Registry key: what is synced, for which location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntityRef {
    pub target: SyncTarget,
    pub id: NormalizedId,
}

impl EntityRef {
    /// # Errors
    ///
    /// [`CoreError::MalformedIdentifier`] if `raw_id` has no entity number.
    pub fn parse(target: SyncTarget, raw_id: &str) -> Result<Self, CoreError> {
        Ok(Self {
            target,
            id: normalize_location_id(raw_id)?,
        })
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.target, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    pub reauthorize: bool,
}

impl From<&SyncError> for JobError {
    fn from(e: &SyncError) -> Self {
        let kind = e.kind();
        Self {
            kind,
            message: e.to_string(),
            reauthorize: kind.needs_reauthorization(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewSyncSummary {
    pub pages: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncOutcome {
    Location { decision: MergeDecision },
    Reviews(ReviewSyncSummary),
}

/// Snapshot of one entity's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncJob {
    pub entity: EntityRef,
    pub status: SyncStatus,
    pub attempt: u32,
    pub last_error: Option<JobError>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub outcome: Option<SyncOutcome>,
}

impl SyncJob {
    #[must_use]
    pub fn idle(entity: EntityRef) -> Self {
        Self {
            entity,
            status: SyncStatus::Idle,
            attempt: 0,
            last_error: None,
            next_retry_at: None,
            outcome: None,
        }
    }

    /// `true` once the job will not change on its own.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        match self.status {
            SyncStatus::Idle | SyncStatus::Succeeded => true,
            SyncStatus::Failed => self.next_retry_at.is_none(),
            SyncStatus::Syncing => false,
        }
    }
}

/// A caller's view of a requested job.
#[derive(Debug)]
pub struct JobHandle {
    rx: watch::Receiver<SyncJob>,
    /// The request attached to a job that was already running.
    pub coalesced: bool,
}

impl JobHandle {
    #[must_use]
    pub fn snapshot(&self) -> SyncJob {
        self.rx.borrow().clone()
    }

    /// Waits until the job succeeds or fails for good.
    pub async fn wait(mut self) -> SyncJob {
        let settled = self
            .rx
            .wait_for(SyncJob::is_settled)
            .await
            .map(|job| job.clone());
        settled.unwrap_or_else(|_| self.rx.borrow().clone())
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub retry: RetryPolicy,
    /// Upper bound on every provider call.
    pub call_timeout: Duration,
    /// Jobs allowed to talk to the provider at once.
    pub max_concurrent: usize,
    pub weights: CompletenessWeights,
}

impl SyncSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            retry: RetryPolicy::from_app_config(config),
            call_timeout: Duration::from_secs(config.provider_timeout_secs),
            max_concurrent: config.sync_max_concurrent,
            weights: config.completeness_weights,
        }
    }
}

struct JobEntry {
    generation: u64,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SyncJob>>,
}

struct Inner {
    lifecycle: Arc<LifecycleEngine>,
    directory: Arc<dyn DirectoryClient>,
    reviews: Arc<dyn ReviewSource>,
    dedup: Deduplicator,
    settings: SyncSettings,
    workers: Semaphore,
    jobs: Mutex<HashMap<EntityRef, JobEntry>>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

/// Cheap to clone; clones share the registry and worker pool.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Builds an orchestrator writing through `lifecycle`'s store.
    #[must_use]
    pub fn new(
        lifecycle: Arc<LifecycleEngine>,
        directory: Arc<dyn DirectoryClient>,
        reviews: Arc<dyn ReviewSource>,
        settings: SyncSettings,
    ) -> Self {
        let dedup = Deduplicator::new(Arc::clone(lifecycle.store()), settings.weights);
        Self {
            inner: Arc::new(Inner {
                lifecycle,
                directory,
                reviews,
                dedup,
                workers: Semaphore::new(settings.max_concurrent.max(1)),
                settings,
                jobs: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Starts a sync for `raw_id`, or attaches to the one already running.
    ///
    /// Location syncs fetch with `raw_id` as given; review syncs page the
    /// stored location's reviews.
    ///
    /// # Errors
    ///
    /// [`SyncError::Invalid`] if `raw_id` has no entity number.
    pub fn request_sync(&self, target: SyncTarget, raw_id: &str) -> Result<JobHandle, SyncError> {
        let entity = EntityRef::parse(target, raw_id)?;
        let mut jobs = self.inner.jobs();

        if let Some(entry) = jobs.get(&entity) {
            let (status, settled) = {
                let job = entry.state.borrow();
                (job.status, job.is_settled())
            };
            if status == SyncStatus::Syncing {
                debug!(entity = %entity, "sync already running; attaching");
                return Ok(JobHandle {
                    rx: entry.state.subscribe(),
                    coalesced: true,
                });
            }
            if !settled {
                info!(entity = %entity, "superseding job waiting to retry");
            }
            entry.cancel.cancel();
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.inner.shutdown.child_token();
        let (tx, rx) = watch::channel(SyncJob {
            status: SyncStatus::Syncing,
            ..SyncJob::idle(entity.clone())
        });
        let state = Arc::new(tx);
        jobs.insert(
            entity.clone(),
            JobEntry {
                generation,
                cancel: cancel.clone(),
                state: Arc::clone(&state),
            },
        );
        drop(jobs);

        info!(entity = %entity, "sync requested");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.run_job(entity, raw_id.to_owned(), generation, cancel, state));
        Ok(JobHandle { rx, coalesced: false })
    }

    /// The entity's current job, or an idle snapshot when none exists.
    #[must_use]
    pub fn sync_status(&self, entity: &EntityRef) -> SyncJob {
        self.inner
            .jobs()
            .get(entity)
            .map_or_else(|| SyncJob::idle(entity.clone()), |e| e.state.borrow().clone())
    }

    /// Cancels the entity's unsettled job. Returns `false` if there was none.
    pub fn cancel_sync(&self, entity: &EntityRef) -> bool {
        let jobs = self.inner.jobs();
        match jobs.get(entity) {
            Some(entry) if !entry.state.borrow().is_settled() => {
                info!(entity = %entity, "sync cancellation requested");
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancels both of a location's jobs and drops them from the registry,
    /// settled or not. Waiters still observe the final state. Returns the
    /// number of entries removed.
    pub fn forget_location(&self, id: &NormalizedId) -> usize {
        let mut jobs = self.inner.jobs();
        let mut removed = 0;
        for target in [SyncTarget::Location, SyncTarget::Reviews] {
            let key = EntityRef {
                target,
                id: id.clone(),
            };
            if let Some(entry) = jobs.remove(&key) {
                entry.cancel.cancel();
                removed += 1;
            }
        }
        if removed > 0 {
            info!(location = %id, jobs = removed, "sync jobs forgotten");
        }
        removed
    }

    /// Requests a location and a review sync for every stored location.
    /// Returns the number of jobs started or joined.
    ///
    /// # Errors
    ///
    /// [`SyncError::Store`] if the locations cannot be listed.
    pub async fn sync_all(&self) -> Result<usize, SyncError> {
        let locations = self.inner.lifecycle.store().list_locations().await?;
        let mut requested = 0usize;
        for location in &locations {
            for (target, raw) in [
                (SyncTarget::Location, location.external_id.as_str()),
                (SyncTarget::Reviews, location.normalized_id.as_str()),
            ] {
                match self.request_sync(target, raw) {
                    Ok(_) => requested += 1,
                    Err(e) => warn!(location = %location.normalized_id, error = %e, "skipping sync"),
                }
            }
        }
        info!(locations = locations.len(), jobs = requested, "periodic sync requested");
        Ok(requested)
    }

    /// Cancels every job and makes later requests fail immediately.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    fn jobs(&self) -> MutexGuard<'_, HashMap<EntityRef, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_job(
        self: Arc<Self>,
        entity: EntityRef,
        raw_id: String,
        generation: u64,
        cancel: CancellationToken,
        state: Arc<watch::Sender<SyncJob>>,
    ) {
        let policy = self.settings.retry;
        let mut attempt = 0u32;
        let result = loop {
            attempt += 1;
            state.send_modify(|job| {
                job.status = SyncStatus::Syncing;
                job.attempt = attempt;
                job.next_retry_at = None;
            });
            debug!(entity = %entity, attempt, "sync attempt started");

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(SyncError::Cancelled),
                r = self.attempt(&entity, &raw_id) => r,
            };

            match result {
                Ok(outcome) => break Ok(outcome),
                Err(e) if policy.should_retry(e.kind(), attempt) => {
                    let delay = policy.delay_for(attempt);
                    let retry_at =
                        Utc::now() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
                    warn!(
                        entity = %entity,
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "sync attempt failed; retrying after back-off"
                    );
                    state.send_modify(|job| {
                        job.status = SyncStatus::Failed;
                        job.last_error = Some(JobError::from(&e));
                        job.next_retry_at = Some(retry_at);
                    });
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break Err(SyncError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(outcome) => {
                info!(entity = %entity, attempt, ?outcome, "sync succeeded");
                // Retire before publishing so waiters observe the entity idle.
                {
                    let mut jobs = self.jobs();
                    if jobs.get(&entity).is_some_and(|e| e.generation == generation) {
                        jobs.remove(&entity);
                    }
                }
                state.send_modify(|job| {
                    job.status = SyncStatus::Succeeded;
                    job.last_error = None;
                    job.next_retry_at = None;
                    job.outcome = Some(outcome);
                });
            }
            Err(e) => {
                if matches!(e, SyncError::Cancelled) {
                    warn!(entity = %entity, attempt, "sync cancelled");
                } else {
                    error!(entity = %entity, attempt, kind = %e.kind(), error = %e, "sync failed");
                }
                state.send_modify(|job| {
                    job.status = SyncStatus::Failed;
                    job.last_error = Some(JobError::from(&e));
                    job.next_retry_at = None;
                });
            }
        }
    }

    async fn attempt(&self, entity: &EntityRef, raw_id: &str) -> Result<SyncOutcome, SyncError> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| SyncError::Cancelled)?;
        match entity.target {
            SyncTarget::Location => {
                let record = self.call(self.directory.fetch_location(raw_id)).await?;
                // Reconciling under another id would race that entity's own job.
                if record.normalized_id != entity.id {
                    return Err(ProviderError::InvalidPayload {
                        context: entity.to_string(),
                        reason: format!(
                            "provider returned location {} instead",
                            record.normalized_id
                        ),
                    }
                    .into());
                }
                let decision = self.dedup.reconcile(record).await?;
                Ok(SyncOutcome::Location { decision })
            }
            SyncTarget::Reviews => self.sync_reviews(&entity.id).await.map(SyncOutcome::Reviews),
        }
    }

    async fn sync_reviews(&self, id: &NormalizedId) -> Result<ReviewSyncSummary, SyncError> {
        let location = self
            .lifecycle
            .store()
            .get_location(id)
            .await?
            .ok_or_else(|| SyncError::UnknownLocation(id.clone()))?;

        let mut summary = ReviewSyncSummary::default();
        let mut page_token: Option<String> = None;
        loop {
            let batch = self
                .call(
                    self.reviews
                        .list_reviews(&location.external_id, page_token.as_deref()),
                )
                .await?;
            summary.pages += 1;

            for incoming in batch.reviews {
                summary.fetched += 1;
                match self.lifecycle.ingest(incoming).await? {
                    IngestOutcome::Inserted(_) => summary.inserted += 1,
                    IngestOutcome::Updated(_) => summary.updated += 1,
                    IngestOutcome::Unchanged(_) => summary.unchanged += 1,
                }
            }

            match batch.next_page_token {
                None => break,
                Some(next)
                    if summary.pages < MAX_REVIEW_PAGES
                        && page_token.as_deref() != Some(next.as_str()) =>
                {
                    page_token = Some(next);
                }
                Some(_) => {
                    warn!(location = %id, pages = summary.pages, "stopping review paging early");
                    break;
                }
            }
        }
        Ok(summary)
    }

    async fn call<T, F>(&self, call: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let limit = self.settings.call_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SyncError::Timeout(limit)),
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
