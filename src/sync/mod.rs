//! Remote-to-local sync engine.
//!
//! Each Stripe entity implements [`EntitySync`], a descriptor that tells the
//! engine how to match a Stripe payload to a local record, how to turn the
//! payload into a local draft, and how to page the full remote collection.
//! One generic [`SyncEngine::upsert`] drives the webhook dispatcher, the bulk
//! pass and the initial migration alike.
//!
//! All local writes made by the engine go through the
//! [`CatalogService`](crate::hooks::CatalogService) inside
//! [`run_with_sync_context`], so the lifecycle hooks see the sync marker and
//! do not echo the changes back to Stripe.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::client::{CouponRef, ListParams, Page, ProductRef, StripeCatalogClient};
use crate::context::run_with_sync_context;
use crate::error::Result;
use crate::hooks::CatalogService;
use crate::store::CatalogStore;

mod entities;

pub use entities::{CouponSync, PriceSync, ProductSync, PromotionCodeSync};

pub(crate) use entities::product_draft_from_payload;

/// Page size used by bulk passes and the initial migration.
const SYNC_PAGE_LIMIT: u64 = 100;

/// What an upsert did with an incoming payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No local record matched the Stripe id; one was created.
    Created,
    /// A local record matched and was updated in place.
    Updated,
    /// The payload was ignored (missing id or unresolvable dependency).
    Skipped,
}

/// Per-entity sync descriptor.
///
/// `draft` may return `Ok(None)` when the payload cannot be mapped to a local
/// record (for example a price whose product cannot be resolved); the engine
/// records that as [`UpsertOutcome::Skipped`].
#[async_trait]
pub trait EntitySync {
    /// Stripe object name, used in logs.
    const OBJECT: &'static str;

    /// Wire shape of the Stripe payload.
    type Payload: DeserializeOwned + Send + Sync;
    /// Local create/update input.
    type Draft: Send;

    fn remote_id(payload: &Self::Payload) -> &str;

    async fn draft(engine: &SyncEngine, payload: &Self::Payload) -> Result<Option<Self::Draft>>;

    async fn find_local_id(engine: &SyncEngine, remote_id: &str) -> Result<Option<String>>;

    async fn create(engine: &SyncEngine, draft: Self::Draft) -> Result<()>;

    async fn update(engine: &SyncEngine, local_id: &str, draft: Self::Draft) -> Result<()>;

    async fn list_page(engine: &SyncEngine, params: ListParams) -> Result<Page<Self::Payload>>;
}

/// Counters for one entity kind in a bulk pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounters {
    /// Payloads fetched from Stripe.
    pub fetched: u64,
    /// Payloads that resulted in a local create or update.
    pub changed: u64,
}

/// Result of a full bulk pass, per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub products: EntityCounters,
    pub prices: EntityCounters,
    pub coupons: EntityCounters,
    pub promotion_codes: EntityCounters,
}

/// Drives remote-to-local synchronization.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn CatalogStore>,
    client: Arc<dyn StripeCatalogClient>,
    service: CatalogService,
}

impl SyncEngine {
    /// Create an engine over the given store and client.
    pub fn new(store: Arc<dyn CatalogStore>, client: Arc<dyn StripeCatalogClient>) -> Self {
        let service = CatalogService::new(store.clone(), client.clone());
        Self {
            store,
            client,
            service,
        }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub(crate) fn client(&self) -> &Arc<dyn StripeCatalogClient> {
        &self.client
    }

    pub(crate) fn service(&self) -> &CatalogService {
        &self.service
    }

    /// Create or update the local record matching a Stripe payload.
    pub async fn upsert<E: EntitySync>(&self, payload: &E::Payload) -> Result<UpsertOutcome> {
        let remote_id = E::remote_id(payload);
        if remote_id.is_empty() {
            tracing::warn!(
                target: "stripe_catalog_sync",
                object = E::OBJECT,
                "Skipping payload without an id"
            );
            return Ok(UpsertOutcome::Skipped);
        }

        let Some(draft) = E::draft(self, payload).await? else {
            return Ok(UpsertOutcome::Skipped);
        };

        match E::find_local_id(self, remote_id).await? {
            Some(local_id) => {
                run_with_sync_context(E::update(self, &local_id, draft)).await?;
                tracing::debug!(
                    target: "stripe_catalog_sync",
                    object = E::OBJECT,
                    stripe_id = %remote_id,
                    local_id = %local_id,
                    "Updated local record from Stripe payload"
                );
                Ok(UpsertOutcome::Updated)
            }
            None => {
                run_with_sync_context(E::create(self, draft)).await?;
                tracing::debug!(
                    target: "stripe_catalog_sync",
                    object = E::OBJECT,
                    stripe_id = %remote_id,
                    "Created local record from Stripe payload"
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }

    pub async fn upsert_product(
        &self,
        payload: &<ProductSync as EntitySync>::Payload,
    ) -> Result<UpsertOutcome> {
        self.upsert::<ProductSync>(payload).await
    }

    pub async fn upsert_price(
        &self,
        payload: &<PriceSync as EntitySync>::Payload,
    ) -> Result<UpsertOutcome> {
        self.upsert::<PriceSync>(payload).await
    }

    pub async fn upsert_coupon(
        &self,
        payload: &<CouponSync as EntitySync>::Payload,
    ) -> Result<UpsertOutcome> {
        self.upsert::<CouponSync>(payload).await
    }

    pub async fn upsert_promotion_code(
        &self,
        payload: &<PromotionCodeSync as EntitySync>::Payload,
    ) -> Result<UpsertOutcome> {
        self.upsert::<PromotionCodeSync>(payload).await
    }

    /// Remove the local product matching a Stripe id. Returns whether a
    /// record was deleted.
    pub async fn delete_local_product(&self, stripe_id: &str) -> Result<bool> {
        let Some(record) = self.store.find_product_by_stripe_id(stripe_id).await? else {
            return Ok(false);
        };
        run_with_sync_context(self.service.delete_product(&record.id)).await?;
        Ok(true)
    }

    /// Remove the local price matching a Stripe id. Returns whether a record
    /// was deleted.
    pub async fn delete_local_price(&self, stripe_id: &str) -> Result<bool> {
        let Some(record) = self.store.find_price_by_stripe_id(stripe_id).await? else {
            return Ok(false);
        };
        run_with_sync_context(self.service.delete_price(&record.id)).await?;
        Ok(true)
    }

    /// Remove the local coupon matching a Stripe id. Returns whether a
    /// record was deleted.
    pub async fn delete_local_coupon(&self, stripe_id: &str) -> Result<bool> {
        let Some(record) = self.store.find_coupon_by_stripe_id(stripe_id).await? else {
            return Ok(false);
        };
        run_with_sync_context(self.service.delete_coupon(&record.id)).await?;
        Ok(true)
    }

    /// Resolve a product reference to a local id, pulling the product from
    /// Stripe and upserting it when it is not known locally yet.
    ///
    /// Returns `None` when the reference cannot be resolved (deleted stub,
    /// retrieval failure). Failures are logged, not propagated, so a broken
    /// dependency skips one record instead of failing the whole pass.
    pub(crate) async fn ensure_product(&self, reference: &ProductRef) -> Option<String> {
        let remote_id = reference.id();
        if remote_id.is_empty() {
            return None;
        }

        match self.store.find_product_by_stripe_id(remote_id).await {
            Ok(Some(record)) => return Some(record.id),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    target: "stripe_catalog_sync",
                    error = %e,
                    stripe_product_id = %remote_id,
                    "Product lookup failed while resolving a reference"
                );
                return None;
            }
        }

        let payload = match reference {
            ProductRef::Object(payload) => (**payload).clone(),
            ProductRef::Id(id) => match self.client.retrieve_product(id).await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(
                        target: "stripe_catalog_sync",
                        error = %e,
                        stripe_product_id = %id,
                        "Failed to retrieve referenced product from Stripe"
                    );
                    return None;
                }
            },
        };

        if payload.deleted {
            tracing::warn!(
                target: "stripe_catalog_sync",
                stripe_product_id = %remote_id,
                "Referenced product is deleted on Stripe, skipping"
            );
            return None;
        }

        if let Err(e) = self.upsert::<ProductSync>(&payload).await {
            tracing::error!(
                target: "stripe_catalog_sync",
                error = %e,
                stripe_product_id = %remote_id,
                "Failed to upsert referenced product"
            );
            return None;
        }

        match self.store.find_product_by_stripe_id(remote_id).await {
            Ok(record) => record.map(|r| r.id),
            Err(_) => None,
        }
    }

    /// Resolve a coupon reference to a local id, pulling the coupon from
    /// Stripe and upserting it when it is not known locally yet.
    pub(crate) async fn ensure_coupon(&self, reference: &CouponRef) -> Option<String> {
        let remote_id = reference.id();
        if remote_id.is_empty() {
            return None;
        }

        match self.store.find_coupon_by_stripe_id(remote_id).await {
            Ok(Some(record)) => return Some(record.id),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    target: "stripe_catalog_sync",
                    error = %e,
                    stripe_coupon_id = %remote_id,
                    "Coupon lookup failed while resolving a reference"
                );
                return None;
            }
        }

        let payload = match reference {
            CouponRef::Object(payload) => (**payload).clone(),
            CouponRef::Id(id) => match self.client.retrieve_coupon(id).await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(
                        target: "stripe_catalog_sync",
                        error = %e,
                        stripe_coupon_id = %id,
                        "Failed to retrieve referenced coupon from Stripe"
                    );
                    return None;
                }
            },
        };

        if payload.deleted {
            tracing::warn!(
                target: "stripe_catalog_sync",
                stripe_coupon_id = %remote_id,
                "Referenced coupon is deleted on Stripe, skipping"
            );
            return None;
        }

        if let Err(e) = self.upsert::<CouponSync>(&payload).await {
            tracing::error!(
                target: "stripe_catalog_sync",
                error = %e,
                stripe_coupon_id = %remote_id,
                "Failed to upsert referenced coupon"
            );
            return None;
        }

        match self.store.find_coupon_by_stripe_id(remote_id).await {
            Ok(record) => record.map(|r| r.id),
            Err(_) => None,
        }
    }

    /// Page the full remote collection of one entity kind and upsert each
    /// payload. The first per-item error aborts the pass.
    async fn sync_entity<E: EntitySync>(&self) -> Result<EntityCounters> {
        let mut counters = EntityCounters::default();
        let mut starting_after: Option<String> = None;

        loop {
            let params = ListParams {
                limit: Some(SYNC_PAGE_LIMIT),
                starting_after: starting_after.clone(),
            };
            let page = E::list_page(self, params).await?;
            let last_id = page.data.last().map(|p| E::remote_id(p).to_string());

            for payload in &page.data {
                counters.fetched += 1;
                match self.upsert::<E>(payload).await? {
                    UpsertOutcome::Created | UpsertOutcome::Updated => counters.changed += 1,
                    UpsertOutcome::Skipped => {}
                }
            }

            if !page.has_more {
                break;
            }
            match last_id {
                Some(id) => starting_after = Some(id),
                None => break,
            }
        }

        tracing::info!(
            target: "stripe_catalog_sync",
            object = E::OBJECT,
            fetched = counters.fetched,
            changed = counters.changed,
            "Bulk sync pass finished"
        );
        Ok(counters)
    }

    /// Run a full bulk pass over all entity kinds, products first so that
    /// price and coupon references resolve without extra retrievals.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let report = SyncReport {
            products: self.sync_entity::<ProductSync>().await?,
            prices: self.sync_entity::<PriceSync>().await?,
            coupons: self.sync_entity::<CouponSync>().await?,
            promotion_codes: self.sync_entity::<PromotionCodeSync>().await?,
        };
        Ok(report)
    }

    /// [`sync_all`](Self::sync_all) for fire-and-forget callers such as the
    /// cron job; errors are logged instead of propagated.
    pub async fn sync_all_logged(&self) {
        match self.sync_all().await {
            Ok(report) => {
                tracing::info!(
                    target: "stripe_catalog_sync",
                    products = report.products.changed,
                    prices = report.prices.changed,
                    coupons = report.coupons.changed,
                    promotion_codes = report.promotion_codes.changed,
                    "Scheduled Stripe sync completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    target: "stripe_catalog_sync",
                    error = %e,
                    "Scheduled Stripe sync failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test::RecordingCatalogClient;
    use crate::client::{CouponPayload, PricePayload, ProductPayload, PromotionCodePayload};
    use crate::store::test::InMemoryCatalogStore;
    use crate::store::CouponDuration;

    fn engine() -> (SyncEngine, InMemoryCatalogStore, RecordingCatalogClient) {
        let store = InMemoryCatalogStore::new();
        let client = RecordingCatalogClient::new();
        let engine = SyncEngine::new(Arc::new(store.clone()), Arc::new(client.clone()));
        (engine, store, client)
    }

    fn product_payload(id: &str, name: &str) -> ProductPayload {
        ProductPayload {
            id: id.to_string(),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn price_payload(id: &str, product_id: &str) -> PricePayload {
        PricePayload {
            id: id.to_string(),
            product: Some(ProductRef::Id(product_id.to_string())),
            currency: Some("usd".to_string()),
            unit_amount: Some(1500),
            ..Default::default()
        }
    }

    fn coupon_payload(id: &str) -> CouponPayload {
        CouponPayload {
            id: id.to_string(),
            duration: Some(CouponDuration::Once),
            percent_off: Some(10.0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_product_creates_then_updates_same_record() {
        let (engine, store, client) = engine();

        let outcome = engine
            .upsert_product(&product_payload("prod_1", "Widget"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        let first = store
            .find_product_by_stripe_id("prod_1")
            .await
            .unwrap()
            .unwrap();

        let outcome = engine
            .upsert_product(&product_payload("prod_1", "Widget v2"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        let second = store
            .find_product_by_stripe_id("prod_1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Widget v2");
        // Sync-originated writes must not call back into Stripe.
        assert_eq!(client.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_upsert_skips_payload_without_id() {
        let (engine, store, _client) = engine();

        let outcome = engine
            .upsert_product(&product_payload("", "Anonymous"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped);
        assert_eq!(store.product_count(), 0);
    }

    #[tokio::test]
    async fn test_upsert_price_pulls_unknown_product_first() {
        let (engine, store, client) = engine();
        client.seed_remote_products(vec![product_payload("prod_9", "Pulled")]);

        let outcome = engine
            .upsert_price(&price_payload("price_1", "prod_9"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let product = store
            .find_product_by_stripe_id("prod_9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.name, "Pulled");
        let price = store
            .find_price_by_stripe_id("price_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(price.product_id, product.id);
        assert_eq!(price.currency, "USD");
    }

    #[tokio::test]
    async fn test_upsert_price_with_unresolvable_product_is_skipped() {
        let (engine, store, client) = engine();
        client.fail_retrieval_of("prod_gone");

        let outcome = engine
            .upsert_price(&price_payload("price_1", "prod_gone"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped);
        assert_eq!(store.price_count(), 0);
    }

    #[tokio::test]
    async fn test_upsert_price_with_embedded_product_object_avoids_retrieval() {
        let (engine, store, client) = engine();

        let mut payload = price_payload("price_1", "unused");
        payload.product = Some(ProductRef::Object(Box::new(product_payload(
            "prod_inline",
            "Inline",
        ))));
        engine.upsert_price(&payload).await.unwrap();

        assert!(store
            .find_product_by_stripe_id("prod_inline")
            .await
            .unwrap()
            .is_some());
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_upsert_promotion_code_pulls_coupon_from_payload_ref() {
        let (engine, store, client) = engine();
        client.seed_remote_coupons(vec![coupon_payload("co_5")]);

        let payload = PromotionCodePayload {
            id: "promo_1".to_string(),
            code: Some("SPRING25".to_string()),
            coupon: Some(CouponRef::Id("co_5".to_string())),
            ..Default::default()
        };
        let outcome = engine.upsert_promotion_code(&payload).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let coupon = store
            .find_coupon_by_stripe_id("co_5")
            .await
            .unwrap()
            .unwrap();
        let code = store
            .find_promotion_code_by_stripe_id("promo_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code.coupon_id, coupon.id);
        assert_eq!(code.code, "SPRING25");
    }

    #[tokio::test]
    async fn test_delete_local_product_by_stripe_id() {
        let (engine, store, client) = engine();

        engine
            .upsert_product(&product_payload("prod_1", "Widget"))
            .await
            .unwrap();
        assert!(engine.delete_local_product("prod_1").await.unwrap());
        assert!(!engine.delete_local_product("prod_1").await.unwrap());
        assert_eq!(store.product_count(), 0);
        // Deletes under the sync guard stay local.
        assert_eq!(client.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_sync_all_counts_fetched_and_changed() {
        let (engine, store, client) = engine();
        client.seed_remote_products(vec![
            product_payload("prod_1", "One"),
            product_payload("prod_2", "Two"),
        ]);
        client.seed_remote_prices(vec![price_payload("price_1", "prod_1")]);
        client.seed_remote_coupons(vec![coupon_payload("co_1")]);

        let report = engine.sync_all().await.unwrap();

        assert_eq!(report.products, EntityCounters { fetched: 2, changed: 2 });
        assert_eq!(report.prices, EntityCounters { fetched: 1, changed: 1 });
        assert_eq!(report.coupons, EntityCounters { fetched: 1, changed: 1 });
        assert_eq!(report.promotion_codes, EntityCounters::default());
        assert_eq!(store.product_count(), 2);

        // A second pass changes nothing new but still counts updates.
        let report = engine.sync_all().await.unwrap();
        assert_eq!(report.products, EntityCounters { fetched: 2, changed: 2 });
    }
}
