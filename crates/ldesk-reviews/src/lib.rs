//! Review workflows: reply lifecycle, the filtered read path, and bulk
//! actions.
//!
//! All writes go through [`LifecycleEngine`], which serializes work per
//! review and only records a reply once the provider acknowledges it.
//! [`PaginationEngine`] serves cursor pages with aggregate counters, and
//! [`BulkCoordinator`] fans one action out over a selection.

pub mod bulk;
mod error;
pub mod lifecycle;
mod locks;
pub mod pagination;

pub use bulk::{BulkAction, BulkCoordinator, BulkReport, ItemFailure, SelectionBatch};
pub use error::ReviewError;
pub use lifecycle::{next_state, IngestOutcome, LifecycleEngine, ReplyEvent};
pub use pagination::{clamp_page_size, PaginationEngine, ReviewPage, MAX_PAGE_SIZE};
