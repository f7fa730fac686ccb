//! Normalization of provider payloads into domain records.

use chrono::{DateTime, Utc};
use ldesk_core::{
    validate_rating, CompletenessWeights, Coordinates, IncomingReview, LocationFields,
    LocationMetadata, LocationRecord, NormalizedId, OpeningPeriod, ProviderReply, ServiceItem,
};

use crate::error::ProviderError;
use crate::types::{AddressPayload, LocationPayload, ReviewPayload, ServiceItemPayload, StarRating};

/// Builds a [`LocationRecord`] from a location document.
///
/// The document's own `name` is the external id when present; otherwise the
/// identifier the caller asked for is used.
///
/// # Errors
///
/// - [`ProviderError::Deserialize`] if `raw` is not a JSON object.
/// - [`ProviderError::InvalidPayload`] if no entity number can be extracted
///   from the identifier.
pub fn location_from_payload(
    raw: serde_json::Value,
    requested_id: &str,
    weights: &CompletenessWeights,
    fetched_at: DateTime<Utc>,
) -> Result<LocationRecord, ProviderError> {
    let payload: LocationPayload =
        serde_json::from_value(raw.clone()).map_err(|e| ProviderError::Deserialize {
            context: format!("location {requested_id}"),
            source: e,
        })?;

    let external_id = non_blank(payload.name.clone()).unwrap_or_else(|| requested_id.to_owned());

    let phone = payload
        .phone_numbers
        .as_ref()
        .and_then(|p| p.primary_phone.clone())
        .or(payload.primary_phone.clone());
    let category = payload
        .categories
        .as_ref()
        .and_then(|c| c.primary_category.clone())
        .or(payload.primary_category.clone())
        .and_then(|c| c.display_name.or(c.name));

    let fields = LocationFields {
        name: non_blank(payload.title.clone()),
        address: payload.storefront_address.as_ref().and_then(format_address),
        phone: non_blank(phone),
        website: non_blank(payload.website_uri.clone()),
        category: non_blank(category),
    };

    let metadata = LocationMetadata {
        description: non_blank(payload.profile.as_ref().and_then(|p| p.description.clone())),
        regular_hours: payload
            .regular_hours
            .as_ref()
            .map(|h| {
                h.periods
                    .iter()
                    .map(|p| OpeningPeriod {
                        open_day: p.open_day.clone(),
                        open_time: p.open_time.render(),
                        close_day: p.close_day.clone(),
                        close_time: p.close_time.render(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        service_items: payload
            .service_items
            .iter()
            .filter_map(|v| serde_json::from_value::<ServiceItemPayload>(v.clone()).ok())
            .map(|item| match item {
                ServiceItemPayload::Structured { structured } => ServiceItem::Structured {
                    service_type_id: structured.service_type_id,
                },
                ServiceItemPayload::FreeForm { free_form } => ServiceItem::FreeForm {
                    label: free_form.label.display_name,
                },
            })
            .collect(),
        coordinates: payload.latlng.map(|ll| Coordinates {
            latitude: ll.latitude,
            longitude: ll.longitude,
        }),
        verified: payload
            .metadata
            .as_ref()
            .and_then(|m| m.has_voice_of_merchant)
            .or(payload.verified)
            .unwrap_or(false),
        raw,
    };

    LocationRecord::from_fetch(external_id, fields, metadata, fetched_at, weights).map_err(|e| {
        ProviderError::InvalidPayload {
            context: format!("location {requested_id}"),
            reason: e.to_string(),
        }
    })
}

/// Builds an [`IncomingReview`] from one entry of a review listing.
///
/// # Errors
///
/// - [`ProviderError::Deserialize`] if `raw` is not a review object.
/// - [`ProviderError::InvalidPayload`] if it has no id, no valid star
///   rating, or no parseable creation time.
pub fn review_from_payload(
    raw: &serde_json::Value,
    location_external_id: &str,
    location_id: &NormalizedId,
) -> Result<IncomingReview, ProviderError> {
    let payload: ReviewPayload =
        serde_json::from_value(raw.clone()).map_err(|e| ProviderError::Deserialize {
            context: format!("review of {location_external_id}"),
            source: e,
        })?;
    let invalid = |reason: String| ProviderError::InvalidPayload {
        context: format!("review of {location_external_id}"),
        reason,
    };

    let external_review_id = match (non_blank(payload.name), non_blank(payload.review_id)) {
        (Some(name), _) => name,
        (None, Some(id)) => format!(
            "{}/reviews/{id}",
            location_external_id.trim_matches('/')
        ),
        (None, None) => return Err(invalid("missing review id".to_owned())),
    };

    let rating = payload
        .star_rating
        .as_ref()
        .and_then(StarRating::value)
        .ok_or_else(|| invalid(format!("{external_review_id}: missing star rating")))
        .and_then(|r| validate_rating(r).map_err(|e| invalid(format!("{external_review_id}: {e}"))))?;

    let review_timestamp = payload
        .create_time
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or_else(|| invalid(format!("{external_review_id}: missing or invalid createTime")))?;

    let reviewer_name = match payload.reviewer {
        Some(r) if !r.is_anonymous => non_blank(r.display_name).unwrap_or_default(),
        _ => String::new(),
    };

    let sentiment = payload
        .sentiment
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    let provider_reply = payload.review_reply.and_then(|reply| {
        let text = non_blank(reply.comment)?;
        let timestamp = reply
            .update_time
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(review_timestamp);
        Some(ProviderReply { text, timestamp })
    });

    Ok(IncomingReview {
        external_review_id,
        location_id: location_id.clone(),
        reviewer_name,
        rating,
        text: non_blank(payload.comment),
        sentiment,
        review_timestamp,
        provider_reply,
    })
}

/// Parses an RFC 3339 timestamp (the provider's only time encoding).
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn format_address(address: &AddressPayload) -> Option<String> {
    match address {
        AddressPayload::Text(s) => non_blank(Some(s.clone())),
        AddressPayload::Postal(p) => {
            let mut parts: Vec<String> = p
                .address_lines
                .iter()
                .map(|l| l.trim().to_owned())
                .filter(|l| !l.is_empty())
                .collect();
            let region = [&p.locality, &p.administrative_area, &p.postal_code]
                .into_iter()
                .filter_map(|part| non_blank(part.clone()))
                .collect::<Vec<_>>()
                .join(" ");
            if !region.is_empty() {
                parts.push(region);
            }
            if let Some(code) = non_blank(p.region_code.clone()) {
                parts.push(code);
            }
            (!parts.is_empty()).then(|| parts.join(", "))
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
