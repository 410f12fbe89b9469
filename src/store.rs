//! Local record storage.
//!
//! The host application owns the actual persistence; this module defines the
//! record types, the [`CatalogStore`] trait the plugin writes through, and an
//! in-memory implementation for tests and lightweight hosts.
//!
//! Every record pairs a store-assigned local id with a unique Stripe id.
//! Once set, the Stripe id is the record's sync identity and never changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metadata::MetadataEntry;

// ============================================================================
// Catalog vocabulary
// ============================================================================

/// How a price charges: a flat per-unit amount or tiered amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingScheme {
    PerUnit,
    Tiered,
}

/// Tax behavior of a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBehavior {
    Inclusive,
    Exclusive,
    Unspecified,
}

/// How tiered pricing is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiersMode {
    Graduated,
    Volume,
}

/// One-time or recurring price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    OneTime,
    Recurring,
}

/// Recurring billing interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringInterval {
    Day,
    Week,
    Month,
    Year,
}

/// Recurring usage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    Licensed,
    Metered,
}

/// Coupon duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponDuration {
    Forever,
    Once,
    Repeating,
}

// ============================================================================
// Price components
// ============================================================================

/// Recurring billing settings on a price.
///
/// The shape matches Stripe's `price.recurring` object, so it doubles as the
/// wire representation in webhook payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecurring {
    pub interval: RecurringInterval,
    #[serde(default)]
    pub interval_count: Option<u64>,
    #[serde(default)]
    pub meter: Option<String>,
    #[serde(default)]
    pub trial_period_days: Option<u32>,
    #[serde(default)]
    pub usage_type: Option<UsageType>,
}

/// Customer-chosen amount settings on a price.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCustomUnitAmount {
    #[serde(default)]
    pub maximum: Option<i64>,
    #[serde(default)]
    pub minimum: Option<i64>,
    #[serde(default)]
    pub preset: Option<i64>,
}

impl PriceCustomUnitAmount {
    /// True when every field is absent, in which case the component is
    /// dropped rather than stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maximum.is_none() && self.minimum.is_none() && self.preset.is_none()
    }
}

/// One tier of a tiered price. `up_to` is `None` for the open-ended tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    #[serde(default)]
    pub flat_amount: Option<i64>,
    #[serde(default)]
    pub flat_amount_decimal: Option<String>,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub unit_amount_decimal: Option<String>,
    #[serde(default)]
    pub up_to: Option<i64>,
}

/// Redemption restrictions on a promotion code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionCodeRestrictions {
    #[serde(default)]
    pub first_time_transaction: Option<bool>,
    #[serde(default)]
    pub minimum_amount: Option<i64>,
    #[serde(default)]
    pub minimum_amount_currency: Option<String>,
}

impl PromotionCodeRestrictions {
    /// True when every field is absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_time_transaction.is_none()
            && self.minimum_amount.is_none()
            && self.minimum_amount_currency.is_none()
    }
}

// ============================================================================
// Records
// ============================================================================

/// Tax code applied to products that do not specify one ("General - Tangible
/// Goods").
pub const DEFAULT_TAX_CODE: &str = "txcd_10000000";

/// A locally stored product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Store-assigned local id.
    pub id: String,
    /// Stripe product id; unique and immutable once set.
    pub stripe_product_id: Option<String>,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub tax_code: String,
    pub active: bool,
    pub metadata: Vec<MetadataEntry>,
}

/// A locally stored price, linked to one local product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Store-assigned local id.
    pub id: String,
    /// Stripe price id; unique and immutable once set.
    pub stripe_price_id: Option<String>,
    /// Local id of the product this price belongs to.
    pub product_id: String,
    pub active: bool,
    pub billing_scheme: Option<BillingScheme>,
    /// Creation timestamp as ISO 8601.
    pub created: Option<String>,
    /// Uppercase ISO currency code.
    pub currency: String,
    pub custom_unit_amount: Option<PriceCustomUnitAmount>,
    pub livemode: bool,
    pub lookup_key: Option<String>,
    pub metadata: Vec<MetadataEntry>,
    pub nickname: Option<String>,
    pub recurring: Option<PriceRecurring>,
    pub tax_behavior: Option<TaxBehavior>,
    pub tiers: Option<Vec<PriceTier>>,
    pub tiers_mode: Option<TiersMode>,
    pub price_type: Option<PriceType>,
    pub unit_amount: Option<i64>,
    pub unit_amount_decimal: Option<String>,
}

/// A locally stored coupon, applying to zero or more local products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponRecord {
    /// Store-assigned local id.
    pub id: String,
    /// Stripe coupon id; unique and immutable once set.
    pub stripe_coupon_id: Option<String>,
    pub name: Option<String>,
    pub duration: CouponDuration,
    pub duration_in_months: Option<i64>,
    pub amount_off: Option<i64>,
    pub percent_off: Option<f64>,
    /// Uppercase ISO currency code.
    pub currency: Option<String>,
    /// Redemption deadline as ISO 8601.
    pub redeem_by: Option<String>,
    pub max_redemptions: Option<i64>,
    pub times_redeemed: Option<i64>,
    /// Local ids of the products this coupon applies to.
    pub applies_to_product_ids: Vec<String>,
    pub livemode: bool,
    pub valid: Option<bool>,
    pub metadata: Vec<MetadataEntry>,
    /// Creation timestamp as ISO 8601.
    pub created: Option<String>,
}

/// A locally stored promotion code, linked to one local coupon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionCodeRecord {
    /// Store-assigned local id.
    pub id: String,
    /// Stripe promotion code id; unique and immutable once set.
    pub stripe_promotion_code_id: Option<String>,
    pub code: String,
    pub active: bool,
    /// Local id of the coupon this code belongs to.
    pub coupon_id: String,
    /// Stripe customer id the code is restricted to, if any.
    pub customer: Option<String>,
    /// Expiry as ISO 8601.
    pub expires_at: Option<String>,
    pub livemode: bool,
    pub max_redemptions: Option<i64>,
    pub times_redeemed: Option<i64>,
    pub restrictions: Option<PromotionCodeRestrictions>,
    pub metadata: Vec<MetadataEntry>,
    /// Creation timestamp as ISO 8601.
    pub created: Option<String>,
}

/// Persisted flag recording the one-time initial product import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    /// When the import completed, ISO 8601.
    pub completed_at: String,
    /// Remote products seen during the import.
    pub product_count: u64,
    /// Local records created during the import.
    pub created_count: u64,
}

// ============================================================================
// Store trait
// ============================================================================

/// Storage seam for local catalog records.
///
/// Implement this against your database. Inserts must reject a duplicate
/// Stripe id (it is the sync identity); updates and deletes are keyed by the
/// local id. An in-memory implementation is provided for testing.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // Products

    async fn find_product_by_stripe_id(&self, stripe_id: &str) -> Result<Option<ProductRecord>>;
    async fn get_product(&self, id: &str) -> Result<Option<ProductRecord>>;
    async fn list_products(&self) -> Result<Vec<ProductRecord>>;
    async fn insert_product(&self, record: ProductRecord) -> Result<()>;
    async fn update_product(&self, record: ProductRecord) -> Result<()>;
    async fn delete_product(&self, id: &str) -> Result<()>;

    // Prices

    async fn find_price_by_stripe_id(&self, stripe_id: &str) -> Result<Option<PriceRecord>>;
    async fn get_price(&self, id: &str) -> Result<Option<PriceRecord>>;
    async fn list_prices(&self) -> Result<Vec<PriceRecord>>;
    async fn insert_price(&self, record: PriceRecord) -> Result<()>;
    async fn update_price(&self, record: PriceRecord) -> Result<()>;
    async fn delete_price(&self, id: &str) -> Result<()>;

    // Coupons

    async fn find_coupon_by_stripe_id(&self, stripe_id: &str) -> Result<Option<CouponRecord>>;
    async fn get_coupon(&self, id: &str) -> Result<Option<CouponRecord>>;
    async fn list_coupons(&self) -> Result<Vec<CouponRecord>>;
    async fn insert_coupon(&self, record: CouponRecord) -> Result<()>;
    async fn update_coupon(&self, record: CouponRecord) -> Result<()>;
    async fn delete_coupon(&self, id: &str) -> Result<()>;

    // Promotion codes

    async fn find_promotion_code_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> Result<Option<PromotionCodeRecord>>;
    async fn get_promotion_code(&self, id: &str) -> Result<Option<PromotionCodeRecord>>;
    async fn list_promotion_codes(&self) -> Result<Vec<PromotionCodeRecord>>;
    async fn insert_promotion_code(&self, record: PromotionCodeRecord) -> Result<()>;
    async fn update_promotion_code(&self, record: PromotionCodeRecord) -> Result<()>;
    async fn delete_promotion_code(&self, id: &str) -> Result<()>;

    // Migration flag

    /// Read the persisted initial-import state, if the import has run.
    async fn migration_state(&self) -> Result<Option<MigrationState>>;

    /// Persist the initial-import state.
    async fn set_migration_state(&self, state: MigrationState) -> Result<()>;
}

/// In-memory store for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    use super::*;
    use crate::error::Error;

    /// In-memory catalog store.
    ///
    /// Wraps data in `Arc` for cheap cloning. Enforces the unique-Stripe-id
    /// constraint on inserts like a real database would.
    #[derive(Default, Clone)]
    pub struct InMemoryCatalogStore {
        inner: Arc<InMemoryCatalogStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryCatalogStoreInner {
        products: RwLock<HashMap<String, ProductRecord>>,
        prices: RwLock<HashMap<String, PriceRecord>>,
        coupons: RwLock<HashMap<String, CouponRecord>>,
        promotion_codes: RwLock<HashMap<String, PromotionCodeRecord>>,
        migration_state: RwLock<Option<MigrationState>>,
    }

    impl InMemoryCatalogStore {
        /// Create a new empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of product records (for testing).
        pub fn product_count(&self) -> usize {
            self.inner.products.read().unwrap().len()
        }

        /// Number of price records (for testing).
        pub fn price_count(&self) -> usize {
            self.inner.prices.read().unwrap().len()
        }

        /// Number of coupon records (for testing).
        pub fn coupon_count(&self) -> usize {
            self.inner.coupons.read().unwrap().len()
        }

        /// Number of promotion code records (for testing).
        pub fn promotion_code_count(&self) -> usize {
            self.inner.promotion_codes.read().unwrap().len()
        }
    }

    fn duplicate_stripe_id(kind: &str, stripe_id: &str) -> Error {
        Error::store(format!(
            "duplicate Stripe {} id: {}",
            kind, stripe_id
        ))
    }

    fn missing_record(kind: &str, id: &str) -> Error {
        Error::store(format!("no {} record with id {}", kind, id))
    }

    #[async_trait]
    impl CatalogStore for InMemoryCatalogStore {
        async fn find_product_by_stripe_id(
            &self,
            stripe_id: &str,
        ) -> Result<Option<ProductRecord>> {
            let products = self.inner.products.read().unwrap();
            Ok(products
                .values()
                .find(|p| p.stripe_product_id.as_deref() == Some(stripe_id))
                .cloned())
        }

        async fn get_product(&self, id: &str) -> Result<Option<ProductRecord>> {
            Ok(self.inner.products.read().unwrap().get(id).cloned())
        }

        async fn list_products(&self) -> Result<Vec<ProductRecord>> {
            let mut all: Vec<ProductRecord> =
                self.inner.products.read().unwrap().values().cloned().collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(all)
        }

        async fn insert_product(&self, record: ProductRecord) -> Result<()> {
            let mut products = self.inner.products.write().unwrap();
            if let Some(stripe_id) = record.stripe_product_id.as_deref() {
                if products
                    .values()
                    .any(|p| p.stripe_product_id.as_deref() == Some(stripe_id))
                {
                    return Err(duplicate_stripe_id("product", stripe_id));
                }
            }
            products.insert(record.id.clone(), record);
            Ok(())
        }

        async fn update_product(&self, record: ProductRecord) -> Result<()> {
            let mut products = self.inner.products.write().unwrap();
            if !products.contains_key(&record.id) {
                return Err(missing_record("product", &record.id));
            }
            products.insert(record.id.clone(), record);
            Ok(())
        }

        async fn delete_product(&self, id: &str) -> Result<()> {
            self.inner.products.write().unwrap().remove(id);
            Ok(())
        }

        async fn find_price_by_stripe_id(&self, stripe_id: &str) -> Result<Option<PriceRecord>> {
            let prices = self.inner.prices.read().unwrap();
            Ok(prices
                .values()
                .find(|p| p.stripe_price_id.as_deref() == Some(stripe_id))
                .cloned())
        }

        async fn get_price(&self, id: &str) -> Result<Option<PriceRecord>> {
            Ok(self.inner.prices.read().unwrap().get(id).cloned())
        }

        async fn list_prices(&self) -> Result<Vec<PriceRecord>> {
            let mut all: Vec<PriceRecord> =
                self.inner.prices.read().unwrap().values().cloned().collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(all)
        }

        async fn insert_price(&self, record: PriceRecord) -> Result<()> {
            let mut prices = self.inner.prices.write().unwrap();
            if let Some(stripe_id) = record.stripe_price_id.as_deref() {
                if prices
                    .values()
                    .any(|p| p.stripe_price_id.as_deref() == Some(stripe_id))
                {
                    return Err(duplicate_stripe_id("price", stripe_id));
                }
            }
            prices.insert(record.id.clone(), record);
            Ok(())
        }

        async fn update_price(&self, record: PriceRecord) -> Result<()> {
            let mut prices = self.inner.prices.write().unwrap();
            if !prices.contains_key(&record.id) {
                return Err(missing_record("price", &record.id));
            }
            prices.insert(record.id.clone(), record);
            Ok(())
        }

        async fn delete_price(&self, id: &str) -> Result<()> {
            self.inner.prices.write().unwrap().remove(id);
            Ok(())
        }

        async fn find_coupon_by_stripe_id(&self, stripe_id: &str) -> Result<Option<CouponRecord>> {
            let coupons = self.inner.coupons.read().unwrap();
            Ok(coupons
                .values()
                .find(|c| c.stripe_coupon_id.as_deref() == Some(stripe_id))
                .cloned())
        }

        async fn get_coupon(&self, id: &str) -> Result<Option<CouponRecord>> {
            Ok(self.inner.coupons.read().unwrap().get(id).cloned())
        }

        async fn list_coupons(&self) -> Result<Vec<CouponRecord>> {
            let mut all: Vec<CouponRecord> =
                self.inner.coupons.read().unwrap().values().cloned().collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(all)
        }

        async fn insert_coupon(&self, record: CouponRecord) -> Result<()> {
            let mut coupons = self.inner.coupons.write().unwrap();
            if let Some(stripe_id) = record.stripe_coupon_id.as_deref() {
                if coupons
                    .values()
                    .any(|c| c.stripe_coupon_id.as_deref() == Some(stripe_id))
                {
                    return Err(duplicate_stripe_id("coupon", stripe_id));
                }
            }
            coupons.insert(record.id.clone(), record);
            Ok(())
        }

        async fn update_coupon(&self, record: CouponRecord) -> Result<()> {
            let mut coupons = self.inner.coupons.write().unwrap();
            if !coupons.contains_key(&record.id) {
                return Err(missing_record("coupon", &record.id));
            }
            coupons.insert(record.id.clone(), record);
            Ok(())
        }

        async fn delete_coupon(&self, id: &str) -> Result<()> {
            self.inner.coupons.write().unwrap().remove(id);
            Ok(())
        }

        async fn find_promotion_code_by_stripe_id(
            &self,
            stripe_id: &str,
        ) -> Result<Option<PromotionCodeRecord>> {
            let codes = self.inner.promotion_codes.read().unwrap();
            Ok(codes
                .values()
                .find(|c| c.stripe_promotion_code_id.as_deref() == Some(stripe_id))
                .cloned())
        }

        async fn get_promotion_code(&self, id: &str) -> Result<Option<PromotionCodeRecord>> {
            Ok(self.inner.promotion_codes.read().unwrap().get(id).cloned())
        }

        async fn list_promotion_codes(&self) -> Result<Vec<PromotionCodeRecord>> {
            let mut all: Vec<PromotionCodeRecord> = self
                .inner
                .promotion_codes
                .read()
                .unwrap()
                .values()
                .cloned()
                .collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(all)
        }

        async fn insert_promotion_code(&self, record: PromotionCodeRecord) -> Result<()> {
            let mut codes = self.inner.promotion_codes.write().unwrap();
            if let Some(stripe_id) = record.stripe_promotion_code_id.as_deref() {
                if codes
                    .values()
                    .any(|c| c.stripe_promotion_code_id.as_deref() == Some(stripe_id))
                {
                    return Err(duplicate_stripe_id("promotion code", stripe_id));
                }
            }
            codes.insert(record.id.clone(), record);
            Ok(())
        }

        async fn update_promotion_code(&self, record: PromotionCodeRecord) -> Result<()> {
            let mut codes = self.inner.promotion_codes.write().unwrap();
            if !codes.contains_key(&record.id) {
                return Err(missing_record("promotion code", &record.id));
            }
            codes.insert(record.id.clone(), record);
            Ok(())
        }

        async fn delete_promotion_code(&self, id: &str) -> Result<()> {
            self.inner.promotion_codes.write().unwrap().remove(id);
            Ok(())
        }

        async fn migration_state(&self) -> Result<Option<MigrationState>> {
            Ok(self.inner.migration_state.read().unwrap().clone())
        }

        async fn set_migration_state(&self, state: MigrationState) -> Result<()> {
            *self.inner.migration_state.write().unwrap() = Some(state);
            Ok(())
        }
    }

}
