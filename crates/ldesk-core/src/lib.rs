//! Domain model shared by every `ldesk` crate.
//!
//! Holds the location and review records, the identity normalizer and
//! completeness scorer that drive location reconciliation, the filter/cursor
//! value objects used by the review read path, the error taxonomy, and the
//! environment-driven application configuration.

mod app_config;
pub mod completeness;
mod config;
pub mod error;
pub mod filter;
pub mod identity;
pub mod location;
pub mod review;

pub use app_config::{AppConfig, Environment};
pub use completeness::{completeness_score, CompletenessWeights};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{ConfigError, CoreError, ErrorKind};
pub use filter::{review_order, Cursor, FilterQuery, ReviewPredicate};
pub use identity::{normalize_location_id, NormalizedId};
pub use location::{
    Coordinates, LocationFields, LocationMetadata, LocationRecord, OpeningPeriod, ServiceItem,
};
pub use review::{
    validate_rating, IncomingReview, ProviderReply, ReplyState, ReviewAggregates, ReviewId,
    ReviewRecord, Sentiment,
};
