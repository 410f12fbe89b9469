//! HTTP surface: read-only catalog routes plus the webhook endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::client::StripeCatalogClient;
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::store::CatalogStore;
use crate::sync::SyncEngine;
use crate::webhook::WebhookHandler;

/// Shared state behind the plugin's routes.
#[derive(Clone)]
pub struct PluginState {
    pub store: Arc<dyn CatalogStore>,
    pub engine: Arc<SyncEngine>,
    /// Absent when no webhook secret is configured; the endpoint then
    /// answers 503.
    pub webhook: Option<Arc<WebhookHandler>>,
    pub config: Arc<PluginConfig>,
}

impl PluginState {
    /// Wire up the engine and webhook handler over a store and client.
    pub fn new(
        store: Arc<dyn CatalogStore>,
        client: Arc<dyn StripeCatalogClient>,
        config: PluginConfig,
    ) -> Self {
        let engine = Arc::new(SyncEngine::new(store.clone(), client));
        let webhook = config
            .webhook_secret
            .clone()
            .map(|secret| Arc::new(WebhookHandler::new(engine.clone(), secret)));
        Self {
            store,
            engine,
            webhook,
            config: Arc::new(config),
        }
    }
}

/// Build the plugin router.
pub fn router(state: PluginState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/stripe-products", get(list_products))
        .route("/stripe-products/:id", get(get_product))
        .route("/stripe-prices", get(list_prices))
        .route("/stripe-prices/:id", get(get_price))
        .route("/stripe-coupons", get(list_coupons))
        .route("/stripe-coupons/:id", get(get_coupon))
        .route("/stripe-promotion-codes", get(list_promotion_codes))
        .route("/stripe-promotion-codes/:id", get(get_promotion_code))
        .route("/webhooks/stripe", post(receive_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status(State(state): State<PluginState>) -> impl IntoResponse {
    Json(json!({
        "message": "Stripe catalog sync is running.",
        "cron": {
            "enabled": state.config.cron.enabled,
            "expression": state.config.cron.expression,
        },
    }))
}

async fn list_products(State(state): State<PluginState>) -> Result<impl IntoResponse> {
    let records = state.store.list_products().await?;
    Ok(Json(records))
}

async fn get_product(
    State(state): State<PluginState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let record = state
        .store
        .get_product(&id)
        .await?
        .ok_or_else(|| Error::not_found("Stripe product not found"))?;
    Ok(Json(record))
}

async fn list_prices(State(state): State<PluginState>) -> Result<impl IntoResponse> {
    let records = state.store.list_prices().await?;
    Ok(Json(records))
}

async fn get_price(
    State(state): State<PluginState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let record = state
        .store
        .get_price(&id)
        .await?
        .ok_or_else(|| Error::not_found("Stripe price not found"))?;
    Ok(Json(record))
}

async fn list_coupons(State(state): State<PluginState>) -> Result<impl IntoResponse> {
    let records = state.store.list_coupons().await?;
    Ok(Json(records))
}

async fn get_coupon(
    State(state): State<PluginState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let record = state
        .store
        .get_coupon(&id)
        .await?
        .ok_or_else(|| Error::not_found("Stripe coupon not found"))?;
    Ok(Json(record))
}

async fn list_promotion_codes(State(state): State<PluginState>) -> Result<impl IntoResponse> {
    let records = state.store.list_promotion_codes().await?;
    Ok(Json(records))
}

async fn get_promotion_code(
    State(state): State<PluginState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let record = state
        .store
        .get_promotion_code(&id)
        .await?
        .ok_or_else(|| Error::not_found("Stripe promotion code not found"))?;
    Ok(Json(record))
}

async fn receive_webhook(
    State(state): State<PluginState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let Some(handler) = state.webhook.as_ref() else {
        return Err(Error::service_unavailable(
            "Webhook secret is not configured.",
        ));
    };

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::bad_request("Missing stripe-signature header."))?;

    if body.is_empty() {
        return Err(Error::bad_request("Empty webhook payload."));
    }

    let event = handler.verify_signature(&body, signature).map_err(|e| {
        tracing::warn!(
            target: "stripe_catalog_sync",
            error = %e,
            "Rejected webhook delivery"
        );
        Error::bad_request("Invalid Stripe signature.")
    })?;

    handler.handle_event(&event).await.map_err(|e| {
        tracing::error!(
            target: "stripe_catalog_sync",
            error = %e,
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook event processing failed"
        );
        Error::internal("Webhook event processing failed.")
    })?;

    Ok(Json(json!({ "received": true })))
}
