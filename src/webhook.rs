//! Stripe webhook verification and dispatch.
//!
//! Signatures are verified against the endpoint secret using HMAC-SHA256
//! over `"{timestamp}.{payload}"`, with a constant-time comparison and a
//! five minute timestamp tolerance. Verified events are routed to the sync
//! engine by event type; unknown types are ignored so new Stripe event
//! kinds never break the endpoint.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::sync::{SyncEngine, UpsertOutcome};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age, in seconds, of a signed event.
const TIMESTAMP_TOLERANCE_SECONDS: i64 = 300;

/// A Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
    pub created: u64,
}

/// The `data` envelope of a webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// What the dispatcher did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event mapped to an upsert.
    Processed(UpsertOutcome),
    /// The event deleted a local record.
    Deleted,
    /// Unknown event type, missing object id, or no matching local record.
    Ignored,
}

/// Verifies webhook signatures and routes events into the sync engine.
pub struct WebhookHandler {
    engine: Arc<SyncEngine>,
    webhook_secret: SecretString,
}

impl WebhookHandler {
    /// Create a handler with the endpoint's signing secret.
    pub fn new(engine: Arc<SyncEngine>, webhook_secret: SecretString) -> Self {
        Self {
            engine,
            webhook_secret,
        }
    }

    /// Verify a `stripe-signature` header against the raw request body and
    /// deserialize the event.
    pub fn verify_signature(&self, payload: &[u8], signature_header: &str) -> Result<WebhookEvent> {
        let (timestamp, provided_signature) = parse_signature_header(signature_header)?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;
        if age.abs() > TIMESTAMP_TOLERANCE_SECONDS {
            return Err(Error::WebhookTimestampExpired { age_seconds: age });
        }

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let expected_signature = self.compute_signature(&signed_payload)?;

        let expected_bytes = hex::decode(&expected_signature)
            .map_err(|_| Error::InvalidWebhookSignature)?;
        let provided_bytes =
            hex::decode(provided_signature).map_err(|_| Error::InvalidWebhookSignature)?;

        if expected_bytes.ct_eq(&provided_bytes).unwrap_u8() != 1 {
            return Err(Error::InvalidWebhookSignature);
        }

        serde_json::from_slice(payload).map_err(|e| Error::InvalidWebhookPayload {
            message: e.to_string(),
        })
    }

    fn compute_signature(&self, signed_payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.expose_secret().as_bytes())
            .map_err(|_| Error::internal("Invalid webhook secret"))?;
        mac.update(signed_payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Route a verified event into the sync engine.
    pub async fn handle_event(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let object_id = event
            .data
            .object
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if object_id.is_empty() {
            tracing::warn!(
                target: "stripe_catalog_sync",
                event_id = %event.id,
                event_type = %event.event_type,
                "Webhook event object has no id, ignoring"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        let outcome = match event.event_type.as_str() {
            "product.created" | "product.updated" => {
                let payload = parse_object(event)?;
                WebhookOutcome::Processed(self.engine.upsert_product(&payload).await?)
            }
            "product.deleted" => {
                if self.engine.delete_local_product(object_id).await? {
                    WebhookOutcome::Deleted
                } else {
                    WebhookOutcome::Ignored
                }
            }
            "price.created" | "price.updated" => {
                let payload = parse_object(event)?;
                WebhookOutcome::Processed(self.engine.upsert_price(&payload).await?)
            }
            "price.deleted" => {
                if self.engine.delete_local_price(object_id).await? {
                    WebhookOutcome::Deleted
                } else {
                    WebhookOutcome::Ignored
                }
            }
            "coupon.created" | "coupon.updated" => {
                let payload = parse_object(event)?;
                WebhookOutcome::Processed(self.engine.upsert_coupon(&payload).await?)
            }
            "coupon.deleted" => {
                if self.engine.delete_local_coupon(object_id).await? {
                    WebhookOutcome::Deleted
                } else {
                    WebhookOutcome::Ignored
                }
            }
            "promotion_code.created" | "promotion_code.updated" => {
                let payload = parse_object(event)?;
                WebhookOutcome::Processed(self.engine.upsert_promotion_code(&payload).await?)
            }
            other => {
                tracing::debug!(
                    target: "stripe_catalog_sync",
                    event_id = %event.id,
                    event_type = %other,
                    "Ignoring unhandled webhook event type"
                );
                WebhookOutcome::Ignored
            }
        };

        tracing::info!(
            target: "stripe_catalog_sync",
            event_id = %event.id,
            event_type = %event.event_type,
            outcome = ?outcome,
            "Processed webhook event"
        );
        Ok(outcome)
    }
}

fn parse_signature_header(header: &str) -> Result<(i64, &str)> {
    let mut timestamp: Option<i64> = None;
    let mut signature: Option<&str> = None;

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = value.parse().ok();
            }
            "v1" => {
                signature = Some(value);
            }
            _ => {}
        }
    }

    match (timestamp, signature) {
        (Some(t), Some(s)) => Ok((t, s)),
        _ => Err(Error::bad_request("Malformed stripe-signature header")),
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(event: &WebhookEvent) -> Result<T> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::warn!(
            target: "stripe_catalog_sync",
            event_id = %event.id,
            event_type = %event.event_type,
            error = %e,
            "Webhook event object does not match the expected shape"
        );
        Error::InvalidWebhookPayload {
            message: e.to_string(),
        }
    })
}
