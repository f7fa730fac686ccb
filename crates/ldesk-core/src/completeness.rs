//! Field-fill score for a location record.
//!
//! The score is additive over independent presence signals and is the
//! deduplicator's tie-breaker, so it must be deterministic and strictly
//! monotonic: every weight is positive, so adding a signal always raises the
//! score and removing one always lowers it. Service items contribute per item
//! up to a cap; items past the cap add nothing.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::location::{LocationFields, LocationMetadata};

// ---------------------------------------------------------------------------
// Default weights (sum to exactly 100 with a full set of service items)
// ---------------------------------------------------------------------------

pub const W_NAME: u32 = 10;
pub const W_DESCRIPTION: u32 = 15;
/// At least one regular opening period.
pub const W_REGULAR_HOURS: u32 = 15;
/// Per service item, up to [`SERVICE_ITEM_CAP`] items.
pub const W_SERVICE_ITEM: u32 = 3;
pub const SERVICE_ITEM_CAP: u32 = 5;
/// Latitude and longitude present.
pub const W_COORDINATES: u32 = 5;
pub const W_CATEGORY: u32 = 10;
pub const W_PHONE: u32 = 10;
pub const W_WEBSITE: u32 = 5;
pub const W_ADDRESS: u32 = 10;
/// Provider-side ownership verification.
pub const W_VERIFIED: u32 = 5;

const _: () = assert!(
    W_NAME
        + W_DESCRIPTION
        + W_REGULAR_HOURS
        + W_SERVICE_ITEM * SERVICE_ITEM_CAP
        + W_COORDINATES
        + W_CATEGORY
        + W_PHONE
        + W_WEBSITE
        + W_ADDRESS
        + W_VERIFIED
        == 100,
    "default completeness weights must sum to exactly 100"
);

/// Per-signal weights. Configurable because the relative value of signals is
/// a product decision, not a property of the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessWeights {
    pub name: u32,
    pub description: u32,
    pub regular_hours: u32,
    pub service_item: u32,
    pub service_item_cap: u32,
    pub coordinates: u32,
    pub category: u32,
    pub phone: u32,
    pub website: u32,
    pub address: u32,
    pub verified: u32,
}

impl Default for CompletenessWeights {
    fn default() -> Self {
        Self {
            name: W_NAME,
            description: W_DESCRIPTION,
            regular_hours: W_REGULAR_HOURS,
            service_item: W_SERVICE_ITEM,
            service_item_cap: SERVICE_ITEM_CAP,
            coordinates: W_COORDINATES,
            category: W_CATEGORY,
            phone: W_PHONE,
            website: W_WEBSITE,
            address: W_ADDRESS,
            verified: W_VERIFIED,
        }
    }
}

impl CompletenessWeights {
    /// Rejects zero weights, which would break monotonicity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidWeight`] naming the first zero weight.
    pub fn validate(&self) -> Result<(), CoreError> {
        let checks = [
            ("name", self.name),
            ("description", self.description),
            ("regular_hours", self.regular_hours),
            ("service_item", self.service_item),
            ("service_item_cap", self.service_item_cap),
            ("coordinates", self.coordinates),
            ("category", self.category),
            ("phone", self.phone),
            ("website", self.website),
            ("address", self.address),
            ("verified", self.verified),
        ];
        match checks.iter().find(|(_, w)| *w == 0) {
            Some((signal, _)) => Err(CoreError::InvalidWeight { signal }),
            None => Ok(()),
        }
    }

    /// Highest score reachable under these weights.
    #[must_use]
    pub fn max_score(&self) -> u32 {
        self.name
            + self.description
            + self.regular_hours
            + self.service_item.saturating_mul(self.service_item_cap)
            + self.coordinates
            + self.category
            + self.phone
            + self.website
            + self.address
            + self.verified
    }
}

/// Computes the completeness score of a location's fields and metadata.
#[must_use]
pub fn completeness_score(
    fields: &LocationFields,
    metadata: &LocationMetadata,
    weights: &CompletenessWeights,
) -> u32 {
    let mut score = 0u32;
    let mut add = |present: bool, weight: u32| {
        if present {
            score = score.saturating_add(weight);
        }
    };

    add(filled(fields.name.as_deref()), weights.name);
    add(filled(fields.address.as_deref()), weights.address);
    add(filled(fields.phone.as_deref()), weights.phone);
    add(filled(fields.website.as_deref()), weights.website);
    add(filled(fields.category.as_deref()), weights.category);
    add(filled(metadata.description.as_deref()), weights.description);
    add(!metadata.regular_hours.is_empty(), weights.regular_hours);
    add(metadata.coordinates.is_some(), weights.coordinates);
    add(metadata.verified, weights.verified);

    let items = u32::try_from(metadata.service_items.len()).unwrap_or(u32::MAX);
    score.saturating_add(
        items
            .min(weights.service_item_cap)
            .saturating_mul(weights.service_item),
    )
}

fn filled(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}
