//! Serde types for the provider's JSON payloads.
//!
//! The provider's documents are loosely shaped: fields go missing, a few
//! appear under more than one name, and some have more than one encoding.
//! Every field here is optional and the alternative encodings are untagged
//! enums, so one odd field never rejects a whole record.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct LocationPayload {
    pub name: Option<String>,
    #[serde(alias = "locationName")]
    pub title: Option<String>,
    #[serde(alias = "address")]
    pub storefront_address: Option<AddressPayload>,
    pub phone_numbers: Option<PhoneNumbers>,
    pub primary_phone: Option<String>,
    #[serde(alias = "websiteUrl")]
    pub website_uri: Option<String>,
    pub categories: Option<Categories>,
    pub primary_category: Option<Category>,
    pub profile: Option<Profile>,
    pub regular_hours: Option<BusinessHours>,
    pub service_items: Vec<serde_json::Value>,
    #[serde(alias = "latLng")]
    pub latlng: Option<LatLng>,
    pub metadata: Option<PayloadMetadata>,
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum AddressPayload {
    Text(String),
    Postal(PostalAddress),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PostalAddress {
    pub address_lines: Vec<String>,
    pub locality: Option<String>,
    pub administrative_area: Option<String>,
    pub postal_code: Option<String>,
    pub region_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PhoneNumbers {
    pub primary_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Categories {
    pub primary_category: Option<Category>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Category {
    pub display_name: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Profile {
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct BusinessHours {
    pub periods: Vec<TimePeriod>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TimePeriod {
    pub open_day: String,
    pub open_time: TimeOfDay,
    pub close_day: String,
    pub close_time: TimeOfDay,
}

/// `"09:30"` or `{"hours": 9, "minutes": 30}`; zero parts may be omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TimeOfDay {
    Text(String),
    Parts {
        #[serde(default)]
        hours: u8,
        #[serde(default)]
        minutes: u8,
    },
}

impl TimeOfDay {
    pub(crate) fn render(&self) -> String {
        match self {
            Self::Text(s) => s.trim().to_owned(),
            Self::Parts { hours, minutes } => format!("{hours:02}:{minutes:02}"),
        }
    }
}

/// The service-item shapes we understand. Anything else stays in the raw
/// payload only.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ServiceItemPayload {
    Structured {
        #[serde(rename = "structuredServiceItem")]
        structured: StructuredItem,
    },
    FreeForm {
        #[serde(rename = "freeFormServiceItem")]
        free_form: FreeFormItem,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StructuredItem {
    pub service_type_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FreeFormItem {
    pub label: ItemLabel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemLabel {
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PayloadMetadata {
    pub has_voice_of_merchant: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ReviewListPayload {
    /// Kept raw so a single malformed review can be skipped.
    pub reviews: Vec<serde_json::Value>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ReviewPayload {
    pub name: Option<String>,
    pub review_id: Option<String>,
    pub reviewer: Option<Reviewer>,
    pub star_rating: Option<StarRating>,
    pub comment: Option<String>,
    pub create_time: Option<String>,
    pub sentiment: Option<String>,
    pub review_reply: Option<ReplyPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Reviewer {
    pub display_name: Option<String>,
    pub is_anonymous: bool,
}

/// `"FOUR"` or `4`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StarRating {
    Number(i64),
    Word(String),
}

impl StarRating {
    pub(crate) fn value(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Word(w) => match w.trim().to_ascii_uppercase().as_str() {
                "ONE" => Some(1),
                "TWO" => Some(2),
                "THREE" => Some(3),
                "FOUR" => Some(4),
                "FIVE" => Some(5),
                other => other.parse().ok(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ReplyPayload {
    pub comment: Option<String>,
    pub update_time: Option<String>,
}
