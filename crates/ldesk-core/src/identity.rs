//! Canonical keys for provider location identifiers.
//!
//! The directory provider refers to the same location either by its bare
//! entity number (`"123"`), by a location resource path (`"locations/123"`),
//! or by a path nested under the owning account
//! (`"accounts/9/locations/123"`). Reconciliation keys every record by the
//! bare entity number so all three shapes compare equal.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Provider-format-independent key of a location (the bare entity number).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedId(String);

impl NormalizedId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a value that is already known to be a bare entity number, such
    /// as a key read back from storage.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedIdentifier`] if `raw` is not all digits.
    pub fn from_stored(raw: &str) -> Result<Self, CoreError> {
        if is_entity_number(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(CoreError::MalformedIdentifier(raw.to_owned()))
        }
    }
}

impl std::fmt::Display for NormalizedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extracts the bare entity number from a provider location identifier.
///
/// Accepted shapes (surrounding whitespace and slashes are ignored):
/// - `"123"`
/// - `"locations/123"`
/// - `"accounts/9/locations/123"`
///
/// When the path contains a `locations` collection segment, the segment
/// right after the last occurrence is the entity number; otherwise the whole
/// input must be a single numeric segment.
///
/// # Errors
///
/// Returns [`CoreError::MalformedIdentifier`] when no numeric entity segment
/// can be found.
pub fn normalize_location_id(raw: &str) -> Result<NormalizedId, CoreError> {
    let malformed = || CoreError::MalformedIdentifier(raw.to_owned());

    let segments: Vec<&str> = raw
        .trim()
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let candidate = match segments.iter().rposition(|s| *s == "locations") {
        Some(idx) => segments.get(idx + 1).copied().ok_or_else(malformed)?,
        None if segments.len() == 1 => segments[0],
        None => return Err(malformed()),
    };

    if is_entity_number(candidate) {
        Ok(NormalizedId(candidate.to_owned()))
    } else {
        Err(malformed())
    }
}

fn is_entity_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
