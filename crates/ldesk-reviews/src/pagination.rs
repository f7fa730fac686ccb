//! Filtered, cursor-paginated review reads.
//!
//! Pages follow the store's display order. Each page carries aggregate
//! counters over the whole filtered set (cursor ignored), cached per
//! predicate until the store's revision moves. Identical queries issued
//! while one is in flight share its single store read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use ldesk_core::{Cursor, FilterQuery, ReviewAggregates, ReviewPredicate, ReviewRecord};
use ldesk_db::{DbError, Store};
use serde::Serialize;
use tracing::debug;

use crate::error::ReviewError;

pub const MAX_PAGE_SIZE: usize = 100;
const AGGREGATE_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPage {
    pub items: Vec<ReviewRecord>,
    /// Present when more records follow this page.
    #[serde(serialize_with = "serialize_cursor")]
    pub next_cursor: Option<Cursor>,
    pub aggregates: ReviewAggregates,
}

fn serialize_cursor<S: serde::Serializer>(
    cursor: &Option<Cursor>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match cursor {
        Some(c) => serializer.serialize_some(&c.encode()),
        None => serializer.serialize_none(),
    }
}

type PageFuture = Shared<BoxFuture<'static, Result<ReviewPage, Arc<DbError>>>>;
type ReadKey = (FilterQuery, usize, u64);

struct Inner {
    store: Arc<dyn Store>,
    default_page_size: usize,
    aggregates: Mutex<HashMap<ReviewPredicate, (u64, ReviewAggregates)>>,
    in_flight: Mutex<HashMap<ReadKey, PageFuture>>,
}

/// Retires a caller's in-flight entry when the caller finishes or is
/// dropped mid-read, unless a newer read has replaced it already.
struct InFlightEntry<'a> {
    inner: &'a Inner,
    key: ReadKey,
    read: PageFuture,
}

impl Drop for InFlightEntry<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(&self.key)
            .is_some_and(|f| f.ptr_eq(&self.read))
        {
            in_flight.remove(&self.key);
        }
    }
}

/// Cheap to clone; clones share caches and in-flight reads.
#[derive(Clone)]
pub struct PaginationEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PaginationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationEngine")
            .field("default_page_size", &self.inner.default_page_size)
            .finish_non_exhaustive()
    }
}

/// Clamps a requested page size into `1..=MAX_PAGE_SIZE`.
#[must_use]
pub fn clamp_page_size(requested: usize) -> usize {
    requested.clamp(1, MAX_PAGE_SIZE)
}

impl PaginationEngine {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, default_page_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                default_page_size: clamp_page_size(default_page_size),
                aggregates: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns one page of reviews matching `query`.
    ///
    /// # Errors
    ///
    /// [`ReviewError::Store`] if the store read fails. Callers coalesced onto
    /// a failed read all receive that failure.
    pub async fn query(
        &self,
        query: FilterQuery,
        page_size: Option<usize>,
    ) -> Result<ReviewPage, ReviewError> {
        let limit = page_size.map_or(self.inner.default_page_size, clamp_page_size);
        // Keyed by revision too, so a query issued after a write never
        // joins a read that started before it.
        let key = (query, limit, self.inner.store.revision().await?);

        let read = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = in_flight.get(&key) {
                debug!("coalescing identical review query");
                existing.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let (query, limit, _) = key.clone();
                let read = async move { inner.load_page(&query, limit).await.map_err(Arc::new) }
                    .boxed()
                    .shared();
                in_flight.insert(key.clone(), read.clone());
                read
            }
        };

        let entry = InFlightEntry {
            inner: &self.inner,
            key,
            read,
        };
        let result = entry.read.clone().await;
        drop(entry);

        result.map_err(ReviewError::Store)
    }

    /// Counters over every review matching `predicate`.
    ///
    /// # Errors
    ///
    /// [`ReviewError::Store`] if the store read fails.
    pub async fn aggregates(
        &self,
        predicate: &ReviewPredicate,
    ) -> Result<ReviewAggregates, ReviewError> {
        Ok(self.inner.aggregates(predicate).await?)
    }
}

impl Inner {
    async fn load_page(&self, query: &FilterQuery, limit: usize) -> Result<ReviewPage, DbError> {
        let mut items = self.store.query_reviews(query, limit + 1).await?;
        let has_more = items.len() > limit;
        items.truncate(limit);
        let next_cursor = if has_more {
            items.last().map(Cursor::for_record)
        } else {
            None
        };
        let aggregates = self.aggregates(&query.predicate()).await?;
        Ok(ReviewPage {
            items,
            next_cursor,
            aggregates,
        })
    }

    async fn aggregates(&self, predicate: &ReviewPredicate) -> Result<ReviewAggregates, DbError> {
        // Read the revision first: a write landing during the computation
        // leaves the entry stale and the next call recomputes.
        let revision = self.store.revision().await?;
        {
            let cache = self.aggregates.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((cached_at, aggregates)) = cache.get(predicate) {
                if *cached_at == revision {
                    return Ok(*aggregates);
                }
            }
        }

        let aggregates = self.store.aggregate_reviews(predicate).await?;
        let mut cache = self.aggregates.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.len() >= AGGREGATE_CACHE_CAPACITY {
            cache.retain(|_, (cached_at, _)| *cached_at == revision);
        }
        cache.insert(predicate.clone(), (revision, aggregates));
        Ok(aggregates)
    }
}

#[cfg(test)]
#[path = "pagination_test.rs"]
mod tests;
