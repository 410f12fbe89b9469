use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use stripe_catalog_sync::client::test::RecordingCatalogClient;
use stripe_catalog_sync::hooks::ProductDraft;
use stripe_catalog_sync::store::test::InMemoryCatalogStore;
use stripe_catalog_sync::{router, CatalogStore, PluginConfig, PluginState};

const WEBHOOK_SECRET: &str = "whsec_integration_test";

fn state_with_webhook() -> (PluginState, InMemoryCatalogStore, RecordingCatalogClient) {
    let store = InMemoryCatalogStore::new();
    let client = RecordingCatalogClient::new();
    let config = PluginConfig::builder()
        .with_webhook_secret(WEBHOOK_SECRET)
        .build()
        .unwrap();
    let state = PluginState::new(Arc::new(store.clone()), Arc::new(client.clone()), config);
    (state, store, client)
}

fn state_without_webhook() -> PluginState {
    let config = PluginConfig::builder().build().unwrap();
    PluginState::new(
        Arc::new(InMemoryCatalogStore::new()),
        Arc::new(RecordingCatalogClient::new()),
        config,
    )
}

fn sign(payload: &[u8]) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn event_body(event_type: &str, object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_integration_1",
        "type": event_type,
        "data": { "object": object },
        "created": 1_700_000_000u64,
    }))
    .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_status_route_reports_cron_settings() {
    let (state, _store, _client) = state_with_webhook();
    let app = router(state);

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["cron"]["enabled"], json!(false));
    assert_eq!(body["cron"]["expression"], json!("0 */10 * * * *"));
}

#[tokio::test]
async fn test_product_routes_list_and_fetch() {
    let (state, store, client) = state_with_webhook();
    // Seed through the lifecycle service, sharing the state's store.
    let service = stripe_catalog_sync::CatalogService::new(Arc::new(store), Arc::new(client));
    let record = service
        .create_product(ProductDraft::new("Integration widget"))
        .await
        .unwrap()
        .id;
    let app = router(state);

    let response = app
        .clone()
        .oneshot(Request::get("/stripe-products").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/stripe-products/{}", record))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::get("/stripe-products/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_without_secret_is_unavailable() {
    let app = router(state_without_webhook());

    let response = app
        .oneshot(
            Request::post("/webhooks/stripe")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_webhook_requires_signature_header() {
    let (state, _store, _client) = state_with_webhook();
    let app = router(state);

    let payload = event_body("product.created", json!({"id": "prod_1"}));
    let response = app
        .oneshot(
            Request::post("/webhooks/stripe")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let (state, store, _client) = state_with_webhook();
    let app = router(state);

    let payload = event_body("product.created", json!({"id": "prod_1"}));
    let response = app
        .oneshot(
            Request::post("/webhooks/stripe")
                .header("stripe-signature", "t=1,v1=deadbeef")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.product_count(), 0);
}

#[tokio::test]
async fn test_webhook_processes_signed_product_event() {
    let (state, store, _client) = state_with_webhook();
    let app = router(state);

    let payload = event_body(
        "product.created",
        json!({"id": "prod_hook_1", "name": "From webhook"}),
    );
    let signature = sign(&payload);
    let response = app
        .oneshot(
            Request::post("/webhooks/stripe")
                .header("stripe-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["received"], json!(true));

    let record = store
        .find_product_by_stripe_id("prod_hook_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.name, "From webhook");
}

#[tokio::test]
async fn test_webhook_ignores_unknown_event_types() {
    let (state, _store, _client) = state_with_webhook();
    let app = router(state);

    let payload = event_body("invoice.paid", json!({"id": "in_1"}));
    let signature = sign(&payload);
    let response = app
        .oneshot(
            Request::post("/webhooks/stripe")
                .header("stripe-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
