//! Remote catalog client seam.
//!
//! [`StripeCatalogClient`] abstracts the Stripe API surface the plugin needs:
//! create/update/delete/retrieve plus paginated listing per entity type. The
//! payload structs mirror Stripe's wire JSON, so the webhook dispatcher can
//! deserialize event objects straight into them and the live client maps SDK
//! types into the same shapes.
//!
//! Prices and promotion codes cannot be hard-deleted in Stripe; "delete" for
//! those is an update with `active = false`, so the trait has no delete
//! operation for them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{
    BillingScheme, CouponDuration, PriceCustomUnitAmount, PriceRecurring, PriceTier,
    PromotionCodeRestrictions, TaxBehavior, TiersMode, PriceType,
};

// ============================================================================
// Wire payloads
// ============================================================================

/// A product as Stripe sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPayload {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tax_code: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    /// Stripe returns a deleted stub (`{id, deleted: true}`) when a
    /// referenced product no longer exists.
    #[serde(default)]
    pub deleted: bool,
}

/// A reference to a product: a bare id or an embedded object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductRef {
    Id(String),
    Object(Box<ProductPayload>),
}

impl ProductRef {
    /// The referenced Stripe product id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object(payload) => &payload.id,
        }
    }
}

/// A price as Stripe sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricePayload {
    pub id: String,
    #[serde(default)]
    pub product: Option<ProductRef>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub billing_scheme: Option<BillingScheme>,
    /// Unix timestamp.
    #[serde(default)]
    pub created: Option<i64>,
    /// Lowercase ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub custom_unit_amount: Option<PriceCustomUnitAmount>,
    #[serde(default)]
    pub livemode: Option<bool>,
    #[serde(default)]
    pub lookup_key: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub recurring: Option<PriceRecurring>,
    #[serde(default)]
    pub tax_behavior: Option<TaxBehavior>,
    #[serde(default)]
    pub tiers: Option<Vec<PriceTier>>,
    #[serde(default)]
    pub tiers_mode: Option<TiersMode>,
    #[serde(default, rename = "type")]
    pub price_type: Option<PriceType>,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub unit_amount_decimal: Option<String>,
}

/// Products a coupon applies to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppliesToPayload {
    #[serde(default)]
    pub products: Vec<String>,
}

/// A coupon as Stripe sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouponPayload {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub duration: Option<CouponDuration>,
    #[serde(default)]
    pub duration_in_months: Option<i64>,
    #[serde(default)]
    pub amount_off: Option<i64>,
    #[serde(default)]
    pub percent_off: Option<f64>,
    /// Lowercase ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Unix timestamp.
    #[serde(default)]
    pub redeem_by: Option<i64>,
    #[serde(default)]
    pub max_redemptions: Option<i64>,
    #[serde(default)]
    pub times_redeemed: Option<i64>,
    #[serde(default)]
    pub applies_to: Option<AppliesToPayload>,
    #[serde(default)]
    pub livemode: Option<bool>,
    #[serde(default)]
    pub valid: Option<bool>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    /// Unix timestamp.
    #[serde(default)]
    pub created: Option<i64>,
    /// Deleted stub flag, as on products.
    #[serde(default)]
    pub deleted: bool,
}

/// A reference to a coupon: a bare id or an embedded object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CouponRef {
    Id(String),
    Object(Box<CouponPayload>),
}

impl CouponRef {
    /// The referenced Stripe coupon id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object(payload) => &payload.id,
        }
    }
}

/// A reference that may arrive as a bare id or an expanded object; only the
/// id is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdRef {
    Id(String),
    Object { id: String },
}

impl IdRef {
    /// The referenced id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object { id } => id,
        }
    }
}

/// A promotion code as Stripe sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromotionCodePayload {
    pub id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub coupon: Option<CouponRef>,
    #[serde(default)]
    pub customer: Option<IdRef>,
    /// Unix timestamp.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub livemode: Option<bool>,
    #[serde(default)]
    pub max_redemptions: Option<i64>,
    #[serde(default)]
    pub times_redeemed: Option<i64>,
    #[serde(default)]
    pub restrictions: Option<PromotionCodeRestrictions>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    /// Unix timestamp.
    #[serde(default)]
    pub created: Option<i64>,
}

// ============================================================================
// Request parameters
// ============================================================================

/// Parameters for creating a product.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductCreateParams {
    pub name: String,
    pub description: Option<String>,
    pub active: Option<bool>,
    pub tax_code: Option<String>,
    pub images: Vec<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Parameters for creating a price.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceCreateParams {
    /// Stripe product id the price belongs to.
    pub product: String,
    /// Lowercase ISO currency code.
    pub currency: String,
    pub active: Option<bool>,
    pub billing_scheme: Option<BillingScheme>,
    pub lookup_key: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub nickname: Option<String>,
    pub recurring: Option<PriceRecurring>,
    pub tax_behavior: Option<TaxBehavior>,
    pub tiers: Option<Vec<PriceTier>>,
    pub tiers_mode: Option<TiersMode>,
    pub unit_amount: Option<i64>,
    pub unit_amount_decimal: Option<String>,
}

/// Parameters for a partial price update. `None` means the field is not part
/// of this update; `Some(empty map)` clears the remote metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceUpdateParams {
    pub active: Option<bool>,
    pub lookup_key: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub nickname: Option<String>,
    pub tax_behavior: Option<TaxBehavior>,
}

impl PriceUpdateParams {
    /// True when no field is set, in which case the remote call is skipped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_none()
            && self.lookup_key.is_none()
            && self.metadata.is_none()
            && self.nickname.is_none()
            && self.tax_behavior.is_none()
    }
}

/// Parameters for creating a coupon.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponCreateParams {
    pub duration: CouponDuration,
    pub name: Option<String>,
    pub amount_off: Option<i64>,
    pub percent_off: Option<f64>,
    /// Lowercase ISO currency code.
    pub currency: Option<String>,
    pub duration_in_months: Option<i64>,
    pub max_redemptions: Option<i64>,
    /// Unix timestamp.
    pub redeem_by: Option<i64>,
    /// Stripe product ids the coupon applies to.
    pub applies_to_products: Vec<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Parameters for a partial coupon update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CouponUpdateParams {
    pub name: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl CouponUpdateParams {
    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.metadata.is_none()
    }
}

/// Parameters for creating a promotion code.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionCodeCreateParams {
    /// Stripe coupon id the code belongs to.
    pub coupon: String,
    pub code: String,
    pub active: Option<bool>,
    /// Stripe customer id the code is restricted to.
    pub customer: Option<String>,
    /// Unix timestamp.
    pub expires_at: Option<i64>,
    pub max_redemptions: Option<i64>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub restrictions: Option<PromotionCodeRestrictions>,
}

/// Parameters for a partial promotion code update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionCodeUpdateParams {
    pub active: Option<bool>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl PromotionCodeUpdateParams {
    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_none() && self.metadata.is_none()
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Parameters for a paginated listing call.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Page size; Stripe caps this at 100.
    pub limit: Option<u64>,
    /// Cursor: the id of the last item on the previous page.
    pub starting_after: Option<String>,
}

/// One page of a remote listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub has_more: bool,
}

// ============================================================================
// Client trait
// ============================================================================

/// Stripe API operations the plugin performs.
///
/// Implemented for production by [`LiveCatalogClient`] and for tests by
/// [`RecordingCatalogClient`].
///
/// [`LiveCatalogClient`]: crate::live_client::LiveCatalogClient
/// [`RecordingCatalogClient`]: test::RecordingCatalogClient
#[async_trait]
pub trait StripeCatalogClient: Send + Sync {
    // Products

    async fn create_product(&self, params: ProductCreateParams) -> Result<ProductPayload>;
    async fn delete_product(&self, id: &str) -> Result<()>;
    async fn retrieve_product(&self, id: &str) -> Result<ProductPayload>;
    async fn list_products(&self, params: ListParams) -> Result<Page<ProductPayload>>;

    // Prices (no hard delete; archive via update with active=false)

    async fn create_price(&self, params: PriceCreateParams) -> Result<PricePayload>;
    async fn update_price(&self, id: &str, params: PriceUpdateParams) -> Result<PricePayload>;
    async fn list_prices(&self, params: ListParams) -> Result<Page<PricePayload>>;

    // Coupons

    async fn create_coupon(&self, params: CouponCreateParams) -> Result<CouponPayload>;
    async fn update_coupon(&self, id: &str, params: CouponUpdateParams) -> Result<CouponPayload>;
    async fn delete_coupon(&self, id: &str) -> Result<()>;
    async fn retrieve_coupon(&self, id: &str) -> Result<CouponPayload>;
    async fn list_coupons(&self, params: ListParams) -> Result<Page<CouponPayload>>;

    // Promotion codes (no hard delete; deactivate via update with active=false)

    async fn create_promotion_code(
        &self,
        params: PromotionCodeCreateParams,
    ) -> Result<PromotionCodePayload>;
    async fn update_promotion_code(
        &self,
        id: &str,
        params: PromotionCodeUpdateParams,
    ) -> Result<PromotionCodePayload>;
    async fn list_promotion_codes(&self, params: ListParams) -> Result<Page<PromotionCodePayload>>;
}

/// Recording client for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::Error;

    /// Test double that records every outbound call and serves canned remote
    /// listings.
    ///
    /// Create calls return payloads with deterministic generated ids
    /// (`prod_mock_1`, `price_mock_2`, ...). Seed `remote_*` collections to
    /// drive retrieve/list behavior.
    #[derive(Default, Clone)]
    pub struct RecordingCatalogClient {
        inner: Arc<RecordingInner>,
    }

    #[derive(Default)]
    struct RecordingInner {
        id_counter: AtomicU64,
        calls: Mutex<Vec<String>>,

        product_creates: Mutex<Vec<ProductCreateParams>>,
        product_deletes: Mutex<Vec<String>>,
        price_creates: Mutex<Vec<PriceCreateParams>>,
        price_updates: Mutex<Vec<(String, PriceUpdateParams)>>,
        coupon_creates: Mutex<Vec<CouponCreateParams>>,
        coupon_updates: Mutex<Vec<(String, CouponUpdateParams)>>,
        coupon_deletes: Mutex<Vec<String>>,
        promotion_code_creates: Mutex<Vec<PromotionCodeCreateParams>>,
        promotion_code_updates: Mutex<Vec<(String, PromotionCodeUpdateParams)>>,

        remote_products: Mutex<Vec<ProductPayload>>,
        remote_prices: Mutex<Vec<PricePayload>>,
        remote_coupons: Mutex<Vec<CouponPayload>>,
        remote_promotion_codes: Mutex<Vec<PromotionCodePayload>>,

        failing_retrievals: Mutex<HashSet<String>>,
    }

    impl RecordingCatalogClient {
        /// Create a new recording client with no canned data.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn next_id(&self, prefix: &str) -> String {
            let n = self.inner.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("{}_mock_{}", prefix, n)
        }

        fn record(&self, op: &str) {
            self.inner.calls.lock().unwrap().push(op.to_string());
        }

        /// Total number of outbound calls made, listings included.
        pub fn total_calls(&self) -> usize {
            self.inner.calls.lock().unwrap().len()
        }

        /// Number of mutating calls (create/update/delete) made.
        pub fn mutating_calls(&self) -> usize {
            self.inner
                .calls
                .lock()
                .unwrap()
                .iter()
                .filter(|op| !op.starts_with("list_") && !op.starts_with("retrieve_"))
                .count()
        }

        /// Recorded product create calls.
        pub fn product_creates(&self) -> Vec<ProductCreateParams> {
            self.inner.product_creates.lock().unwrap().clone()
        }

        /// Recorded product delete calls.
        pub fn product_deletes(&self) -> Vec<String> {
            self.inner.product_deletes.lock().unwrap().clone()
        }

        /// Recorded price create calls.
        pub fn price_creates(&self) -> Vec<PriceCreateParams> {
            self.inner.price_creates.lock().unwrap().clone()
        }

        /// Recorded price update calls.
        pub fn price_updates(&self) -> Vec<(String, PriceUpdateParams)> {
            self.inner.price_updates.lock().unwrap().clone()
        }

        /// Recorded coupon create calls.
        pub fn coupon_creates(&self) -> Vec<CouponCreateParams> {
            self.inner.coupon_creates.lock().unwrap().clone()
        }

        /// Recorded coupon update calls.
        pub fn coupon_updates(&self) -> Vec<(String, CouponUpdateParams)> {
            self.inner.coupon_updates.lock().unwrap().clone()
        }

        /// Recorded coupon delete calls.
        pub fn coupon_deletes(&self) -> Vec<String> {
            self.inner.coupon_deletes.lock().unwrap().clone()
        }

        /// Recorded promotion code create calls.
        pub fn promotion_code_creates(&self) -> Vec<PromotionCodeCreateParams> {
            self.inner.promotion_code_creates.lock().unwrap().clone()
        }

        /// Recorded promotion code update calls.
        pub fn promotion_code_updates(&self) -> Vec<(String, PromotionCodeUpdateParams)> {
            self.inner.promotion_code_updates.lock().unwrap().clone()
        }

        /// Seed the canned remote product listing.
        pub fn seed_remote_products(&self, products: Vec<ProductPayload>) {
            self.inner.remote_products.lock().unwrap().extend(products);
        }

        /// Seed the canned remote price listing.
        pub fn seed_remote_prices(&self, prices: Vec<PricePayload>) {
            self.inner.remote_prices.lock().unwrap().extend(prices);
        }

        /// Seed the canned remote coupon listing.
        pub fn seed_remote_coupons(&self, coupons: Vec<CouponPayload>) {
            self.inner.remote_coupons.lock().unwrap().extend(coupons);
        }

        /// Seed the canned remote promotion code listing.
        pub fn seed_remote_promotion_codes(&self, codes: Vec<PromotionCodePayload>) {
            self.inner
                .remote_promotion_codes
                .lock()
                .unwrap()
                .extend(codes);
        }

        /// Make retrieval of the given remote id fail with a server error.
        pub fn fail_retrieval_of(&self, id: impl Into<String>) {
            self.inner.failing_retrievals.lock().unwrap().insert(id.into());
        }

        fn check_retrieval(&self, id: &str, operation: &str) -> Result<()> {
            if self.inner.failing_retrievals.lock().unwrap().contains(id) {
                return Err(Error::StripeApi {
                    operation: operation.to_string(),
                    message: "Injected failure".to_string(),
                    code: None,
                    http_status: Some(500),
                });
            }
            Ok(())
        }
    }

    fn not_found(operation: &str, kind: &str, id: &str) -> Error {
        Error::StripeApi {
            operation: operation.to_string(),
            message: format!("No such {}: '{}'", kind, id),
            code: Some("resource_missing".to_string()),
            http_status: Some(404),
        }
    }

    fn paginate<T: Clone>(
        items: &[T],
        params: &ListParams,
        id_of: impl Fn(&T) -> &str,
    ) -> Page<T> {
        let start = match params.starting_after.as_deref() {
            Some(cursor) => items
                .iter()
                .position(|item| id_of(item) == cursor)
                .map_or(items.len(), |i| i + 1),
            None => 0,
        };
        let limit = params.limit.unwrap_or(10) as usize;
        let end = (start + limit).min(items.len());
        Page {
            data: items[start..end].to_vec(),
            has_more: end < items.len(),
        }
    }

    #[async_trait]
    impl StripeCatalogClient for RecordingCatalogClient {
        async fn create_product(&self, params: ProductCreateParams) -> Result<ProductPayload> {
            self.record("create_product");
            let payload = ProductPayload {
                id: self.next_id("prod"),
                name: Some(params.name.clone()),
                description: params.description.clone(),
                images: params.images.clone(),
                tax_code: params.tax_code.clone(),
                active: params.active,
                metadata: params.metadata.clone(),
                deleted: false,
            };
            self.inner.product_creates.lock().unwrap().push(params);
            Ok(payload)
        }

        async fn delete_product(&self, id: &str) -> Result<()> {
            self.record("delete_product");
            self.inner.product_deletes.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn retrieve_product(&self, id: &str) -> Result<ProductPayload> {
            self.record("retrieve_product");
            self.check_retrieval(id, "retrieve_product")?;
            self.inner
                .remote_products
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| not_found("retrieve_product", "product", id))
        }

        async fn list_products(&self, params: ListParams) -> Result<Page<ProductPayload>> {
            self.record("list_products");
            let items = self.inner.remote_products.lock().unwrap().clone();
            Ok(paginate(&items, &params, |p| p.id.as_str()))
        }

        async fn create_price(&self, params: PriceCreateParams) -> Result<PricePayload> {
            self.record("create_price");
            let payload = PricePayload {
                id: self.next_id("price"),
                product: Some(ProductRef::Id(params.product.clone())),
                active: params.active,
                billing_scheme: params.billing_scheme,
                currency: Some(params.currency.clone()),
                lookup_key: params.lookup_key.clone(),
                metadata: params.metadata.clone(),
                nickname: params.nickname.clone(),
                recurring: params.recurring.clone(),
                tax_behavior: params.tax_behavior,
                tiers: params.tiers.clone(),
                tiers_mode: params.tiers_mode,
                unit_amount: params.unit_amount,
                unit_amount_decimal: params.unit_amount_decimal.clone(),
                ..Default::default()
            };
            self.inner.price_creates.lock().unwrap().push(params);
            Ok(payload)
        }

        async fn update_price(&self, id: &str, params: PriceUpdateParams) -> Result<PricePayload> {
            self.record("update_price");
            let payload = PricePayload {
                id: id.to_string(),
                active: params.active,
                ..Default::default()
            };
            self.inner
                .price_updates
                .lock()
                .unwrap()
                .push((id.to_string(), params));
            Ok(payload)
        }

        async fn list_prices(&self, params: ListParams) -> Result<Page<PricePayload>> {
            self.record("list_prices");
            let items = self.inner.remote_prices.lock().unwrap().clone();
            Ok(paginate(&items, &params, |p| p.id.as_str()))
        }

        async fn create_coupon(&self, params: CouponCreateParams) -> Result<CouponPayload> {
            self.record("create_coupon");
            let payload = CouponPayload {
                id: self.next_id("co"),
                name: params.name.clone(),
                duration: Some(params.duration),
                duration_in_months: params.duration_in_months,
                amount_off: params.amount_off,
                percent_off: params.percent_off,
                currency: params.currency.clone(),
                redeem_by: params.redeem_by,
                max_redemptions: params.max_redemptions,
                applies_to: if params.applies_to_products.is_empty() {
                    None
                } else {
                    Some(AppliesToPayload {
                        products: params.applies_to_products.clone(),
                    })
                },
                metadata: params.metadata.clone(),
                ..Default::default()
            };
            self.inner.coupon_creates.lock().unwrap().push(params);
            Ok(payload)
        }

        async fn update_coupon(
            &self,
            id: &str,
            params: CouponUpdateParams,
        ) -> Result<CouponPayload> {
            self.record("update_coupon");
            let payload = CouponPayload {
                id: id.to_string(),
                name: params.name.clone(),
                ..Default::default()
            };
            self.inner
                .coupon_updates
                .lock()
                .unwrap()
                .push((id.to_string(), params));
            Ok(payload)
        }

        async fn delete_coupon(&self, id: &str) -> Result<()> {
            self.record("delete_coupon");
            self.inner.coupon_deletes.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn retrieve_coupon(&self, id: &str) -> Result<CouponPayload> {
            self.record("retrieve_coupon");
            self.check_retrieval(id, "retrieve_coupon")?;
            self.inner
                .remote_coupons
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| not_found("retrieve_coupon", "coupon", id))
        }

        async fn list_coupons(&self, params: ListParams) -> Result<Page<CouponPayload>> {
            self.record("list_coupons");
            let items = self.inner.remote_coupons.lock().unwrap().clone();
            Ok(paginate(&items, &params, |c| c.id.as_str()))
        }

        async fn create_promotion_code(
            &self,
            params: PromotionCodeCreateParams,
        ) -> Result<PromotionCodePayload> {
            self.record("create_promotion_code");
            let payload = PromotionCodePayload {
                id: self.next_id("promo"),
                code: Some(params.code.clone()),
                active: params.active,
                coupon: Some(CouponRef::Id(params.coupon.clone())),
                customer: params.customer.clone().map(IdRef::Id),
                expires_at: params.expires_at,
                max_redemptions: params.max_redemptions,
                restrictions: params.restrictions.clone(),
                metadata: params.metadata.clone(),
                ..Default::default()
            };
            self.inner
                .promotion_code_creates
                .lock()
                .unwrap()
                .push(params);
            Ok(payload)
        }

        async fn update_promotion_code(
            &self,
            id: &str,
            params: PromotionCodeUpdateParams,
        ) -> Result<PromotionCodePayload> {
            self.record("update_promotion_code");
            let payload = PromotionCodePayload {
                id: id.to_string(),
                active: params.active,
                ..Default::default()
            };
            self.inner
                .promotion_code_updates
                .lock()
                .unwrap()
                .push((id.to_string(), params));
            Ok(payload)
        }

        async fn list_promotion_codes(
            &self,
            params: ListParams,
        ) -> Result<Page<PromotionCodePayload>> {
            self.record("list_promotion_codes");
            let items = self.inner.remote_promotion_codes.lock().unwrap().clone();
            Ok(paginate(&items, &params, |c| c.id.as_str()))
        }
    }

}
