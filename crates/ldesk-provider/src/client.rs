//! HTTP client for the directory provider's REST API.
//!
//! Wraps `reqwest` with bearer authentication, status classification into
//! [`ProviderError`] classes and lenient payload normalization. Resource
//! paths are the provider's own identifiers (`accounts/7/locations/42`,
//! `.../reviews/abc`) joined onto the base URL.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ldesk_core::{normalize_location_id, CompletenessWeights, LocationRecord};
use reqwest::{Client, Response, StatusCode, Url};

use crate::contract::{DirectoryClient, ReplyAck, ReplySubmitter, ReviewBatch, ReviewSource};
use crate::error::ProviderError;
use crate::normalize::{location_from_payload, parse_timestamp, review_from_payload};
use crate::types::{ReplyPayload, ReviewListPayload};

/// Provider client implementing every HTTP-backed collaborator contract.
///
/// Use [`HttpProvider::new`] with the configured base URL; tests point it at
/// a wiremock server.
pub struct HttpProvider {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
    weights: CompletenessWeights,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("base_url", &self.base_url.as_str())
            .field("access_token", &self.access_token.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl HttpProvider {
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ProviderError::InvalidUrl`] if `base_url`
    /// does not parse.
    pub fn new(
        base_url: &str,
        access_token: Option<String>,
        timeout_secs: u64,
        weights: CompletenessWeights,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("ldesk/0.1 (listing-sync)")
            .build()?;

        // Exactly one trailing slash so joins append rather than replace the
        // last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| ProviderError::InvalidUrl(format!("'{base_url}': {e}")))?;

        Ok(Self {
            client,
            base_url,
            access_token,
            weights,
        })
    }

    /// Resolves a provider resource path against the base URL. Bare entity
    /// numbers are addressed as `locations/<n>`.
    fn resource_url(&self, resource: &str, suffix: &str) -> Result<Url, ProviderError> {
        let resource = resource.trim().trim_matches('/');
        let path = if !resource.is_empty() && resource.bytes().all(|b| b.is_ascii_digit()) {
            format!("locations/{resource}{suffix}")
        } else {
            format!("{resource}{suffix}")
        };
        self.base_url
            .join(&path)
            .map_err(|e| ProviderError::InvalidUrl(format!("'{path}': {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request, classifies non-2xx statuses and parses the body as
    /// JSON.
    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;
        let response = check_status(response, context).await?;
        let body = response.text().await.map_err(ProviderError::from_reqwest)?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }
}

#[async_trait]
impl DirectoryClient for HttpProvider {
    async fn fetch_location(&self, external_id: &str) -> Result<LocationRecord, ProviderError> {
        let url = self.resource_url(external_id, "")?;
        let body = self
            .send_json(self.client.get(url), &format!("location {external_id}"))
            .await?;
        location_from_payload(body, external_id, &self.weights, Utc::now())
    }
}

#[async_trait]
impl ReviewSource for HttpProvider {
    async fn list_reviews(
        &self,
        location_external_id: &str,
        page_token: Option<&str>,
    ) -> Result<ReviewBatch, ProviderError> {
        let location_id =
            normalize_location_id(location_external_id).map_err(|e| ProviderError::InvalidPayload {
                context: format!("reviews of {location_external_id}"),
                reason: e.to_string(),
            })?;
        let mut url = self.resource_url(location_external_id, "/reviews")?;
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let context = format!("reviews of {location_external_id}");
        let body = self.send_json(self.client.get(url), &context).await?;
        let listing: ReviewListPayload =
            serde_json::from_value(body).map_err(|e| ProviderError::Deserialize {
                context: context.clone(),
                source: e,
            })?;

        let mut reviews = Vec::with_capacity(listing.reviews.len());
        for raw in &listing.reviews {
            match review_from_payload(raw, location_external_id, &location_id) {
                Ok(review) => reviews.push(review),
                Err(e) => {
                    tracing::warn!(location = %location_id, error = %e, "skipping malformed review");
                }
            }
        }

        Ok(ReviewBatch {
            reviews,
            next_page_token: listing.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl ReplySubmitter for HttpProvider {
    async fn submit_reply(
        &self,
        review_external_id: &str,
        text: &str,
    ) -> Result<ReplyAck, ProviderError> {
        let url = self.resource_url(review_external_id, "/reply")?;
        let body = self
            .send_json(
                self.client
                    .put(url)
                    .json(&serde_json::json!({ "comment": text })),
                &format!("reply to {review_external_id}"),
            )
            .await?;
        let reply: ReplyPayload = serde_json::from_value(body).unwrap_or_default();
        let timestamp = reply
            .update_time
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        Ok(ReplyAck { timestamp })
    }
}

/// Maps a non-2xx response onto the error taxonomy.
async fn check_status(response: Response, context: &str) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::InsufficientScope(message)
        }
        StatusCode::NOT_FOUND => ProviderError::NotFound(context.to_owned()),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after },
        s if s.is_server_error() => ProviderError::Server {
            status: s.as_u16(),
        },
        s => ProviderError::Rejected {
            status: s.as_u16(),
            message,
        },
    })
}

/// Pulls `error.message` out of a JSON error body, or returns a trimmed
/// prefix of the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: &str) -> HttpProvider {
        HttpProvider::new(base_url, None, 30, CompletenessWeights::default())
            .expect("client construction should not fail")
    }

    #[test]
    fn resource_url_joins_compound_paths() {
        let client = test_client("https://provider.example/v4");
        let url = client
            .resource_url("accounts/7/locations/42", "/reviews")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://provider.example/v4/accounts/7/locations/42/reviews"
        );
    }

    #[test]
    fn resource_url_expands_bare_numbers() {
        let client = test_client("https://provider.example/v4/");
        let url = client.resource_url("42", "").unwrap();
        assert_eq!(url.as_str(), "https://provider.example/v4/locations/42");
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(
            error_message(r#"{"error":{"code":400,"message":"comment too long"}}"#),
            "comment too long"
        );
        assert_eq!(error_message("  plain failure \n"), "plain failure");
    }

    #[test]
    fn debug_redacts_token() {
        let client = HttpProvider::new(
            "https://provider.example",
            Some("ya29.secret".to_owned()),
            30,
            CompletenessWeights::default(),
        )
        .unwrap();
        assert!(!format!("{client:?}").contains("ya29.secret"));
    }
}
