use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::completeness::{completeness_score, CompletenessWeights};
use crate::error::CoreError;
use crate::identity::{normalize_location_id, NormalizedId};

/// Operator-facing listing fields. Every field is optional because the
/// provider omits whatever the merchant never filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFields {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One opening window of the regular weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningPeriod {
    pub open_day: String,
    pub open_time: String,
    pub close_day: String,
    pub close_time: String,
}

/// A service the location offers. The provider sends either a reference to
/// one of its predefined service types or a merchant-written label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceItem {
    Structured { service_type_id: String },
    FreeForm { label: String },
}

/// Signals extracted from the provider payload, plus the payload itself.
///
/// `raw` is the untouched provider document (a superset of everything typed
/// here and in [`LocationFields`]); it is persisted as-is so nothing the
/// provider sends is lost when the typed view lags behind its schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationMetadata {
    pub description: Option<String>,
    #[serde(default)]
    pub regular_hours: Vec<OpeningPeriod>,
    #[serde(default)]
    pub service_items: Vec<ServiceItem>,
    pub coordinates: Option<Coordinates>,
    /// Provider-side ownership verification ("voice of merchant").
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Identifier exactly as the provider returned it.
    pub external_id: String,
    pub normalized_id: NormalizedId,
    pub fields: LocationFields,
    pub metadata: LocationMetadata,
    pub completeness_score: u32,
    pub updated_at: DateTime<Utc>,
}

impl LocationRecord {
    /// Builds a record from freshly fetched data, deriving the normalized id
    /// and completeness score.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedIdentifier`] if `external_id` carries no
    /// entity number.
    pub fn from_fetch(
        external_id: impl Into<String>,
        fields: LocationFields,
        metadata: LocationMetadata,
        updated_at: DateTime<Utc>,
        weights: &CompletenessWeights,
    ) -> Result<Self, CoreError> {
        let external_id = external_id.into();
        let normalized_id = normalize_location_id(&external_id)?;
        let completeness_score = completeness_score(&fields, &metadata, weights);
        Ok(Self {
            external_id,
            normalized_id,
            fields,
            metadata,
            completeness_score,
            updated_at,
        })
    }

    /// Re-derives `normalized_id` and `completeness_score` from the record's
    /// own content.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedIdentifier`] if `external_id` carries no
    /// entity number.
    pub fn refresh_derived(&mut self, weights: &CompletenessWeights) -> Result<(), CoreError> {
        self.normalized_id = normalize_location_id(&self.external_id)?;
        self.completeness_score = completeness_score(&self.fields, &self.metadata, weights);
        Ok(())
    }

    /// Display label used in logs and listings.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.fields.name.as_deref().unwrap_or(self.normalized_id.as_str())
    }
}
