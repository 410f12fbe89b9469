//! Lifecycle service: the local write surface.
//!
//! Every local create/update/delete goes through [`CatalogService`], which
//! translates the change into the matching Stripe call before persisting it:
//!
//! - creates push to Stripe first and insert locally only on success, so a
//!   failed remote create leaves no local record behind; the remote call is
//!   skipped when the draft already carries a Stripe id (that is how
//!   sync-originated creates avoid echoing back to Stripe);
//! - updates and deletes skip the remote call when the sync-context guard is
//!   active;
//! - updates push only the fields present in the patch, and skip the call
//!   entirely when none of the remotely relevant fields changed;
//! - the `replace_*` methods overwrite a record wholesale from a draft built
//!   out of an authoritative Stripe payload, clearing fields the payload no
//!   longer carries; they never push back to Stripe;
//! - prices and promotion codes are deactivated remotely, never hard-deleted,
//!   because Stripe does not allow deleting them.
//!
//! The sync engine calls create and delete under
//! [`run_with_sync_context`](crate::context::run_with_sync_context), so the
//! guard, not a parallel code path, is what suppresses the echo there.

use std::sync::Arc;

use crate::client::{
    CouponCreateParams, CouponUpdateParams, PriceCreateParams, PriceUpdateParams,
    ProductCreateParams, PromotionCodeCreateParams, PromotionCodeUpdateParams,
    StripeCatalogClient,
};
use crate::context::is_running_in_sync_context;
use crate::error::{Error, Result};
use crate::metadata::{to_stripe_metadata, MetadataEntry};
use crate::store::{
    BillingScheme, CatalogStore, CouponDuration, CouponRecord, PriceCustomUnitAmount,
    PriceRecord, PriceRecurring, PriceTier, PriceType, ProductRecord, PromotionCodeRecord,
    PromotionCodeRestrictions, TaxBehavior, TiersMode, DEFAULT_TAX_CODE,
};
use crate::timefmt::iso_to_unix;

// ============================================================================
// Drafts (create inputs)
// ============================================================================

/// Input for creating a local product.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    /// Pre-set Stripe id; when present the remote create is skipped.
    pub stripe_product_id: Option<String>,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub tax_code: String,
    pub active: bool,
    pub metadata: Vec<MetadataEntry>,
}

impl ProductDraft {
    /// New draft with defaults matching the local schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stripe_product_id: None,
            name: name.into(),
            description: String::new(),
            image_url: String::new(),
            tax_code: DEFAULT_TAX_CODE.to_string(),
            active: true,
            metadata: Vec::new(),
        }
    }
}

/// Input for creating a local price.
#[derive(Debug, Clone)]
pub struct PriceDraft {
    /// Pre-set Stripe id; when present the remote create is skipped.
    pub stripe_price_id: Option<String>,
    /// Local id of the product this price belongs to.
    pub product_id: String,
    /// Uppercase ISO currency code; sent lowercased to Stripe.
    pub currency: String,
    pub active: bool,
    pub billing_scheme: Option<BillingScheme>,
    pub created: Option<String>,
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

impl PriceDraft {
    /// New draft for a per-unit price with defaults.
    pub fn new(product_id: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            stripe_price_id: None,
            product_id: product_id.into(),
            currency: currency.into(),
            active: true,
            billing_scheme: None,
            created: None,
            custom_unit_amount: None,
            livemode: false,
            lookup_key: None,
            metadata: Vec::new(),
            nickname: None,
            recurring: None,
            tax_behavior: None,
            tiers: None,
            tiers_mode: None,
            price_type: None,
            unit_amount: None,
            unit_amount_decimal: None,
        }
    }
}

/// Input for creating a local coupon.
#[derive(Debug, Clone)]
pub struct CouponDraft {
    /// Pre-set Stripe id; when present the remote create is skipped.
    pub stripe_coupon_id: Option<String>,
    pub name: Option<String>,
    pub duration: CouponDuration,
    pub duration_in_months: Option<i64>,
    pub amount_off: Option<i64>,
    pub percent_off: Option<f64>,
    /// Uppercase ISO currency code; sent lowercased to Stripe.
    pub currency: Option<String>,
    /// ISO 8601 redemption deadline.
    pub redeem_by: Option<String>,
    pub max_redemptions: Option<i64>,
    pub times_redeemed: Option<i64>,
    /// Local ids of the products the coupon applies to.
    pub applies_to_product_ids: Vec<String>,
    pub livemode: bool,
    pub valid: Option<bool>,
    pub metadata: Vec<MetadataEntry>,
    pub created: Option<String>,
}

impl CouponDraft {
    /// New draft with the given duration and defaults elsewhere.
    pub fn new(duration: CouponDuration) -> Self {
        Self {
            stripe_coupon_id: None,
            name: None,
            duration,
            duration_in_months: None,
            amount_off: None,
            percent_off: None,
            currency: None,
            redeem_by: None,
            max_redemptions: None,
            times_redeemed: None,
            applies_to_product_ids: Vec::new(),
            livemode: false,
            valid: None,
            metadata: Vec::new(),
            created: None,
        }
    }
}

/// Input for creating a local promotion code.
#[derive(Debug, Clone)]
pub struct PromotionCodeDraft {
    /// Pre-set Stripe id; when present the remote create is skipped.
    pub stripe_promotion_code_id: Option<String>,
    pub code: String,
    pub active: bool,
    /// Local id of the coupon this code belongs to.
    pub coupon_id: String,
    pub customer: Option<String>,
    /// ISO 8601 expiry.
    pub expires_at: Option<String>,
    pub livemode: bool,
    pub max_redemptions: Option<i64>,
    pub times_redeemed: Option<i64>,
    pub restrictions: Option<PromotionCodeRestrictions>,
    pub metadata: Vec<MetadataEntry>,
    pub created: Option<String>,
}

impl PromotionCodeDraft {
    /// New draft with defaults.
    pub fn new(code: impl Into<String>, coupon_id: impl Into<String>) -> Self {
        Self {
            stripe_promotion_code_id: None,
            code: code.into(),
            active: true,
            coupon_id: coupon_id.into(),
            customer: None,
            expires_at: None,
            livemode: false,
            max_redemptions: None,
            times_redeemed: None,
            restrictions: None,
            metadata: Vec::new(),
            created: None,
        }
    }
}

// ============================================================================
// Updates (patch inputs)
// ============================================================================

/// Partial product update. `None` fields are left untouched.
///
/// Product edits never push to Stripe; the remote side owns product state
/// after creation and feeds changes back through webhooks.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub tax_code: Option<String>,
    pub active: Option<bool>,
    pub metadata: Option<Vec<MetadataEntry>>,
}

/// Partial price update. `None` fields are left untouched.
///
/// Of these, only `active`, `metadata`, `nickname`, `lookup_key` and
/// `tax_behavior` are pushed to Stripe; the rest are local-only fields.
#[derive(Debug, Clone, Default)]
pub struct PriceUpdate {
    pub active: Option<bool>,
    pub billing_scheme: Option<BillingScheme>,
    pub created: Option<String>,
    pub currency: Option<String>,
    pub custom_unit_amount: Option<PriceCustomUnitAmount>,
    pub livemode: Option<bool>,
    pub lookup_key: Option<String>,
    pub metadata: Option<Vec<MetadataEntry>>,
    pub nickname: Option<String>,
    pub product_id: Option<String>,
    pub recurring: Option<PriceRecurring>,
    pub tax_behavior: Option<TaxBehavior>,
    pub tiers: Option<Vec<PriceTier>>,
    pub tiers_mode: Option<TiersMode>,
    pub price_type: Option<PriceType>,
    pub unit_amount: Option<i64>,
    pub unit_amount_decimal: Option<String>,
}

/// Partial coupon update. Only `name` and `metadata` are pushed to Stripe;
/// Stripe does not allow changing anything else on a coupon.
#[derive(Debug, Clone, Default)]
pub struct CouponUpdate {
    pub name: Option<String>,
    pub duration: Option<CouponDuration>,
    pub duration_in_months: Option<i64>,
    pub amount_off: Option<i64>,
    pub percent_off: Option<f64>,
    pub currency: Option<String>,
    pub redeem_by: Option<String>,
    pub max_redemptions: Option<i64>,
    pub times_redeemed: Option<i64>,
    pub applies_to_product_ids: Option<Vec<String>>,
    pub livemode: Option<bool>,
    pub valid: Option<bool>,
    pub metadata: Option<Vec<MetadataEntry>>,
    pub created: Option<String>,
}

/// Partial promotion code update. Only `active` and `metadata` are pushed to
/// Stripe.
#[derive(Debug, Clone, Default)]
pub struct PromotionCodeUpdate {
    pub active: Option<bool>,
    pub code: Option<String>,
    pub coupon_id: Option<String>,
    pub customer: Option<String>,
    pub expires_at: Option<String>,
    pub livemode: Option<bool>,
    pub max_redemptions: Option<i64>,
    pub times_redeemed: Option<i64>,
    pub restrictions: Option<PromotionCodeRestrictions>,
    pub metadata: Option<Vec<MetadataEntry>>,
    pub created: Option<String>,
}

// ============================================================================
// Service
// ============================================================================

/// Translates local catalog writes into Stripe calls and persists them.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    client: Arc<dyn StripeCatalogClient>,
}

fn none_if_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn new_local_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl CatalogService {
    /// Create a service over the given store and client.
    pub fn new(store: Arc<dyn CatalogStore>, client: Arc<dyn StripeCatalogClient>) -> Self {
        Self { store, client }
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    /// Create a local product, creating its Stripe counterpart first unless
    /// the draft already carries a Stripe id.
    pub async fn create_product(&self, draft: ProductDraft) -> Result<ProductRecord> {
        let stripe_product_id = match draft.stripe_product_id.clone() {
            Some(id) => id,
            None => {
                let params = ProductCreateParams {
                    name: draft.name.clone(),
                    description: none_if_empty(&draft.description),
                    active: Some(draft.active),
                    tax_code: none_if_empty(&draft.tax_code),
                    images: if draft.image_url.is_empty() {
                        Vec::new()
                    } else {
                        vec![draft.image_url.clone()]
                    },
                    metadata: to_stripe_metadata(&draft.metadata),
                };
                let created = self.client.create_product(params).await.map_err(|e| {
                    tracing::error!(
                        target: "stripe_catalog_sync",
                        error = %e,
                        name = %draft.name,
                        "Stripe product creation failed"
                    );
                    Error::internal(format!("Failed to create Stripe product: {}", e))
                })?;
                created.id
            }
        };

        let record = ProductRecord {
            id: new_local_id(),
            stripe_product_id: Some(stripe_product_id),
            name: draft.name,
            description: draft.description,
            image_url: draft.image_url,
            tax_code: draft.tax_code,
            active: draft.active,
            metadata: draft.metadata,
        };
        self.store.insert_product(record.clone()).await?;
        Ok(record)
    }

    /// Apply a partial update to a local product. Never pushes to Stripe.
    pub async fn update_product(&self, id: &str, update: ProductUpdate) -> Result<ProductRecord> {
        let mut record = self
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Product not found: {}", id)))?;

        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(description) = update.description {
            record.description = description;
        }
        if let Some(image_url) = update.image_url {
            record.image_url = image_url;
        }
        if let Some(tax_code) = update.tax_code {
            record.tax_code = tax_code;
        }
        if let Some(active) = update.active {
            record.active = active;
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata;
        }

        self.store.update_product(record.clone()).await?;
        Ok(record)
    }

    /// Overwrite a local product from a draft, keeping the local id. The
    /// draft's values are authoritative, so fields it leaves empty are
    /// cleared; nothing is pushed to Stripe.
    pub async fn replace_product(&self, id: &str, draft: ProductDraft) -> Result<ProductRecord> {
        let existing = self
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Product not found: {}", id)))?;

        let record = ProductRecord {
            id: existing.id,
            stripe_product_id: draft.stripe_product_id.or(existing.stripe_product_id),
            name: draft.name,
            description: draft.description,
            image_url: draft.image_url,
            tax_code: draft.tax_code,
            active: draft.active,
            metadata: draft.metadata,
        };
        self.store.update_product(record.clone()).await?;
        Ok(record)
    }

    /// Delete a local product and, outside a sync context, its Stripe
    /// counterpart.
    pub async fn delete_product(&self, id: &str) -> Result<()> {
        let record = self
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Product not found: {}", id)))?;

        self.store.delete_product(id).await?;

        if is_running_in_sync_context() {
            return Ok(());
        }
        if let Some(stripe_id) = record.stripe_product_id.as_deref() {
            self.client.delete_product(stripe_id).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Prices
    // ------------------------------------------------------------------

    /// Create a local price, creating its Stripe counterpart first unless
    /// the draft already carries a Stripe id. When validation or the remote
    /// call fails, nothing is persisted locally.
    pub async fn create_price(&self, draft: PriceDraft) -> Result<PriceRecord> {
        let stripe_price_id = match draft.stripe_price_id.clone() {
            Some(id) => id,
            None => {
                let product = self
                    .store
                    .get_product(&draft.product_id)
                    .await?
                    .and_then(|p| p.stripe_product_id)
                    .ok_or_else(|| {
                        Error::validation("Unable to resolve a Stripe product ID for the price.")
                    })?;

                if draft.currency.trim().is_empty() {
                    return Err(Error::validation(
                        "A currency is required to create a Stripe price.",
                    ));
                }

                // A tiered price must declare itself tiered; a flat price must
                // not carry tier fields.
                let has_tiers = draft.tiers.as_ref().is_some_and(|t| !t.is_empty());
                let params = PriceCreateParams {
                    product,
                    currency: draft.currency.to_lowercase(),
                    active: Some(draft.active),
                    billing_scheme: if has_tiers {
                        Some(BillingScheme::Tiered)
                    } else {
                        draft.billing_scheme
                    },
                    lookup_key: draft.lookup_key.clone(),
                    metadata: to_stripe_metadata(&draft.metadata),
                    nickname: draft.nickname.clone(),
                    recurring: draft.recurring.clone(),
                    tax_behavior: draft.tax_behavior,
                    tiers: if has_tiers { draft.tiers.clone() } else { None },
                    tiers_mode: if has_tiers { draft.tiers_mode } else { None },
                    unit_amount: draft.unit_amount,
                    unit_amount_decimal: draft.unit_amount_decimal.clone(),
                };

                let created = self.client.create_price(params).await.map_err(|e| {
                    tracing::error!(
                        target: "stripe_catalog_sync",
                        error = %e,
                        product_id = %draft.product_id,
                        "Stripe price creation failed"
                    );
                    Error::internal(format!("Failed to create Stripe price: {}", e))
                })?;
                created.id
            }
        };

        let record = PriceRecord {
            id: new_local_id(),
            stripe_price_id: Some(stripe_price_id),
            product_id: draft.product_id,
            active: draft.active,
            billing_scheme: draft.billing_scheme,
            created: draft.created,
            currency: draft.currency,
            custom_unit_amount: draft.custom_unit_amount,
            livemode: draft.livemode,
            lookup_key: draft.lookup_key,
            metadata: draft.metadata,
            nickname: draft.nickname,
            recurring: draft.recurring,
            tax_behavior: draft.tax_behavior,
            tiers: draft.tiers,
            tiers_mode: draft.tiers_mode,
            price_type: draft.price_type,
            unit_amount: draft.unit_amount,
            unit_amount_decimal: draft.unit_amount_decimal,
        };
        self.store.insert_price(record.clone()).await?;
        Ok(record)
    }

    /// Apply a partial update to a local price, pushing the remotely
    /// relevant changed fields to Stripe unless the sync guard is active.
    pub async fn update_price(&self, id: &str, update: PriceUpdate) -> Result<PriceRecord> {
        let mut record = self
            .store
            .get_price(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Price not found: {}", id)))?;

        if !is_running_in_sync_context() {
            if let Some(stripe_id) = record.stripe_price_id.as_deref() {
                let params = PriceUpdateParams {
                    active: update.active,
                    lookup_key: update.lookup_key.clone(),
                    metadata: update
                        .metadata
                        .as_deref()
                        .map(|m| to_stripe_metadata(m).unwrap_or_default()),
                    nickname: update.nickname.clone(),
                    tax_behavior: update.tax_behavior,
                };
                if !params.is_empty() {
                    self.client.update_price(stripe_id, params).await?;
                }
            }
        }

        if let Some(active) = update.active {
            record.active = active;
        }
        if let Some(billing_scheme) = update.billing_scheme {
            record.billing_scheme = Some(billing_scheme);
        }
        if let Some(created) = update.created {
            record.created = Some(created);
        }
        if let Some(currency) = update.currency {
            record.currency = currency;
        }
        if let Some(custom_unit_amount) = update.custom_unit_amount {
            record.custom_unit_amount = Some(custom_unit_amount);
        }
        if let Some(livemode) = update.livemode {
            record.livemode = livemode;
        }
        if let Some(lookup_key) = update.lookup_key {
            record.lookup_key = Some(lookup_key);
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata;
        }
        if let Some(nickname) = update.nickname {
            record.nickname = Some(nickname);
        }
        if let Some(product_id) = update.product_id {
            record.product_id = product_id;
        }
        if let Some(recurring) = update.recurring {
            record.recurring = Some(recurring);
        }
        if let Some(tax_behavior) = update.tax_behavior {
            record.tax_behavior = Some(tax_behavior);
        }
        if let Some(tiers) = update.tiers {
            record.tiers = Some(tiers);
        }
        if let Some(tiers_mode) = update.tiers_mode {
            record.tiers_mode = Some(tiers_mode);
        }
        if let Some(price_type) = update.price_type {
            record.price_type = Some(price_type);
        }
        if let Some(unit_amount) = update.unit_amount {
            record.unit_amount = Some(unit_amount);
        }
        if let Some(unit_amount_decimal) = update.unit_amount_decimal {
            record.unit_amount_decimal = Some(unit_amount_decimal);
        }

        self.store.update_price(record.clone()).await?;
        Ok(record)
    }

    /// Overwrite a local price from a draft, keeping the local id. Fields the
    /// draft leaves unset are cleared; nothing is pushed to Stripe.
    pub async fn replace_price(&self, id: &str, draft: PriceDraft) -> Result<PriceRecord> {
        let existing = self
            .store
            .get_price(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Price not found: {}", id)))?;

        let record = PriceRecord {
            id: existing.id,
            stripe_price_id: draft.stripe_price_id.or(existing.stripe_price_id),
            product_id: draft.product_id,
            active: draft.active,
            billing_scheme: draft.billing_scheme,
            created: draft.created,
            currency: draft.currency,
            custom_unit_amount: draft.custom_unit_amount,
            livemode: draft.livemode,
            lookup_key: draft.lookup_key,
            metadata: draft.metadata,
            nickname: draft.nickname,
            recurring: draft.recurring,
            tax_behavior: draft.tax_behavior,
            tiers: draft.tiers,
            tiers_mode: draft.tiers_mode,
            price_type: draft.price_type,
            unit_amount: draft.unit_amount,
            unit_amount_decimal: draft.unit_amount_decimal,
        };
        self.store.update_price(record.clone()).await?;
        Ok(record)
    }

    /// Delete a local price. Outside a sync context the Stripe price is
    /// archived (`active = false`); Stripe does not allow hard-deleting it.
    pub async fn delete_price(&self, id: &str) -> Result<()> {
        let record = self
            .store
            .get_price(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Price not found: {}", id)))?;

        self.store.delete_price(id).await?;

        if is_running_in_sync_context() {
            return Ok(());
        }
        if let Some(stripe_id) = record.stripe_price_id.as_deref() {
            let params = PriceUpdateParams {
                active: Some(false),
                ..Default::default()
            };
            self.client.update_price(stripe_id, params).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Coupons
    // ------------------------------------------------------------------

    /// Create a local coupon, creating its Stripe counterpart first unless
    /// the draft already carries a Stripe id. When the remote call fails,
    /// nothing is persisted locally.
    pub async fn create_coupon(&self, draft: CouponDraft) -> Result<CouponRecord> {
        let stripe_coupon_id = match draft.stripe_coupon_id.clone() {
            Some(id) => id,
            None => {
                let mut applies_to_products = Vec::new();
                for product_id in &draft.applies_to_product_ids {
                    match self.store.get_product(product_id).await? {
                        Some(product) => {
                            if let Some(stripe_id) = product.stripe_product_id {
                                applies_to_products.push(stripe_id);
                            } else {
                                tracing::warn!(
                                    target: "stripe_catalog_sync",
                                    product_id = %product_id,
                                    "Coupon references a product without a Stripe ID, dropping it"
                                );
                            }
                        }
                        None => {
                            tracing::warn!(
                                target: "stripe_catalog_sync",
                                product_id = %product_id,
                                "Coupon references an unknown product, dropping it"
                            );
                        }
                    }
                }

                let redeem_by = match draft.redeem_by.as_deref() {
                    Some(iso) => {
                        let parsed = iso_to_unix(iso);
                        if parsed.is_none() {
                            tracing::warn!(
                                target: "stripe_catalog_sync",
                                redeem_by = %iso,
                                "Unparseable coupon redeem_by, dropping it"
                            );
                        }
                        parsed
                    }
                    None => None,
                };

                let params = CouponCreateParams {
                    duration: draft.duration,
                    name: draft.name.clone(),
                    amount_off: draft.amount_off,
                    percent_off: draft.percent_off,
                    currency: draft.currency.as_deref().map(str::to_lowercase),
                    duration_in_months: draft.duration_in_months,
                    max_redemptions: draft.max_redemptions,
                    redeem_by,
                    applies_to_products,
                    metadata: to_stripe_metadata(&draft.metadata),
                };

                let created = self.client.create_coupon(params).await.map_err(|e| {
                    tracing::error!(
                        target: "stripe_catalog_sync",
                        error = %e,
                        name = ?draft.name,
                        "Stripe coupon creation failed"
                    );
                    Error::internal(format!("Failed to create Stripe coupon: {}", e))
                })?;
                created.id
            }
        };

        let record = CouponRecord {
            id: new_local_id(),
            stripe_coupon_id: Some(stripe_coupon_id),
            name: draft.name,
            duration: draft.duration,
            duration_in_months: draft.duration_in_months,
            amount_off: draft.amount_off,
            percent_off: draft.percent_off,
            currency: draft.currency,
            redeem_by: draft.redeem_by,
            max_redemptions: draft.max_redemptions,
            times_redeemed: draft.times_redeemed,
            applies_to_product_ids: draft.applies_to_product_ids,
            livemode: draft.livemode,
            valid: draft.valid,
            metadata: draft.metadata,
            created: draft.created,
        };
        self.store.insert_coupon(record.clone()).await?;
        Ok(record)
    }

    /// Apply a partial update to a local coupon, pushing `name`/`metadata`
    /// changes to Stripe unless the sync guard is active.
    pub async fn update_coupon(&self, id: &str, update: CouponUpdate) -> Result<CouponRecord> {
        let mut record = self
            .store
            .get_coupon(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Coupon not found: {}", id)))?;

        if !is_running_in_sync_context() {
            if let Some(stripe_id) = record.stripe_coupon_id.as_deref() {
                let params = CouponUpdateParams {
                    name: update.name.clone(),
                    metadata: update
                        .metadata
                        .as_deref()
                        .map(|m| to_stripe_metadata(m).unwrap_or_default()),
                };
                if !params.is_empty() {
                    self.client.update_coupon(stripe_id, params).await?;
                }
            }
        }

        if let Some(name) = update.name {
            record.name = Some(name);
        }
        if let Some(duration) = update.duration {
            record.duration = duration;
        }
        if let Some(duration_in_months) = update.duration_in_months {
            record.duration_in_months = Some(duration_in_months);
        }
        if let Some(amount_off) = update.amount_off {
            record.amount_off = Some(amount_off);
        }
        if let Some(percent_off) = update.percent_off {
            record.percent_off = Some(percent_off);
        }
        if let Some(currency) = update.currency {
            record.currency = Some(currency);
        }
        if let Some(redeem_by) = update.redeem_by {
            record.redeem_by = Some(redeem_by);
        }
        if let Some(max_redemptions) = update.max_redemptions {
            record.max_redemptions = Some(max_redemptions);
        }
        if let Some(times_redeemed) = update.times_redeemed {
            record.times_redeemed = Some(times_redeemed);
        }
        if let Some(applies_to_product_ids) = update.applies_to_product_ids {
            record.applies_to_product_ids = applies_to_product_ids;
        }
        if let Some(livemode) = update.livemode {
            record.livemode = livemode;
        }
        if let Some(valid) = update.valid {
            record.valid = Some(valid);
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata;
        }
        if let Some(created) = update.created {
            record.created = Some(created);
        }

        self.store.update_coupon(record.clone()).await?;
        Ok(record)
    }

    /// Overwrite a local coupon from a draft, keeping the local id. Fields
    /// the draft leaves unset are cleared; nothing is pushed to Stripe.
    pub async fn replace_coupon(&self, id: &str, draft: CouponDraft) -> Result<CouponRecord> {
        let existing = self
            .store
            .get_coupon(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Coupon not found: {}", id)))?;

        let record = CouponRecord {
            id: existing.id,
            stripe_coupon_id: draft.stripe_coupon_id.or(existing.stripe_coupon_id),
            name: draft.name,
            duration: draft.duration,
            duration_in_months: draft.duration_in_months,
            amount_off: draft.amount_off,
            percent_off: draft.percent_off,
            currency: draft.currency,
            redeem_by: draft.redeem_by,
            max_redemptions: draft.max_redemptions,
            times_redeemed: draft.times_redeemed,
            applies_to_product_ids: draft.applies_to_product_ids,
            livemode: draft.livemode,
            valid: draft.valid,
            metadata: draft.metadata,
            created: draft.created,
        };
        self.store.update_coupon(record.clone()).await?;
        Ok(record)
    }

    /// Delete a local coupon and, outside a sync context, hard-delete its
    /// Stripe counterpart.
    pub async fn delete_coupon(&self, id: &str) -> Result<()> {
        let record = self
            .store
            .get_coupon(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Coupon not found: {}", id)))?;

        self.store.delete_coupon(id).await?;

        if is_running_in_sync_context() {
            return Ok(());
        }
        if let Some(stripe_id) = record.stripe_coupon_id.as_deref() {
            self.client.delete_coupon(stripe_id).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Promotion codes
    // ------------------------------------------------------------------

    /// Create a local promotion code, creating its Stripe counterpart first
    /// unless the draft already carries a Stripe id. When validation or the
    /// remote call fails, nothing is persisted locally.
    pub async fn create_promotion_code(
        &self,
        draft: PromotionCodeDraft,
    ) -> Result<PromotionCodeRecord> {
        let stripe_promotion_code_id = match draft.stripe_promotion_code_id.clone() {
            Some(id) => id,
            None => {
                if draft.code.trim().is_empty() {
                    return Err(Error::validation(
                        "A code is required to create a Stripe promotion code.",
                    ));
                }

                let coupon = self
                    .store
                    .get_coupon(&draft.coupon_id)
                    .await?
                    .and_then(|c| c.stripe_coupon_id)
                    .ok_or_else(|| {
                        Error::validation(
                            "Unable to resolve a Stripe coupon ID for the promotion code.",
                        )
                    })?;

                let expires_at = draft.expires_at.as_deref().and_then(iso_to_unix);
                let restrictions = draft.restrictions.clone().filter(|r| !r.is_empty());

                let params = PromotionCodeCreateParams {
                    coupon,
                    code: draft.code.clone(),
                    active: Some(draft.active),
                    customer: draft.customer.clone(),
                    expires_at,
                    max_redemptions: draft.max_redemptions,
                    metadata: to_stripe_metadata(&draft.metadata),
                    restrictions,
                };

                let created = self.client.create_promotion_code(params).await.map_err(|e| {
                    tracing::error!(
                        target: "stripe_catalog_sync",
                        error = %e,
                        code = %draft.code,
                        "Stripe promotion code creation failed"
                    );
                    Error::internal(format!("Failed to create Stripe promotion code: {}", e))
                })?;
                created.id
            }
        };

        let record = PromotionCodeRecord {
            id: new_local_id(),
            stripe_promotion_code_id: Some(stripe_promotion_code_id),
            code: draft.code,
            active: draft.active,
            coupon_id: draft.coupon_id,
            customer: draft.customer,
            expires_at: draft.expires_at,
            livemode: draft.livemode,
            max_redemptions: draft.max_redemptions,
            times_redeemed: draft.times_redeemed,
            restrictions: draft.restrictions,
            metadata: draft.metadata,
            created: draft.created,
        };
        self.store.insert_promotion_code(record.clone()).await?;
        Ok(record)
    }

    /// Apply a partial update to a local promotion code, pushing
    /// `active`/`metadata` changes to Stripe unless the sync guard is active.
    pub async fn update_promotion_code(
        &self,
        id: &str,
        update: PromotionCodeUpdate,
    ) -> Result<PromotionCodeRecord> {
        let mut record = self
            .store
            .get_promotion_code(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Promotion code not found: {}", id)))?;

        if !is_running_in_sync_context() {
            if let Some(stripe_id) = record.stripe_promotion_code_id.as_deref() {
                let params = PromotionCodeUpdateParams {
                    active: update.active,
                    metadata: update
                        .metadata
                        .as_deref()
                        .map(|m| to_stripe_metadata(m).unwrap_or_default()),
                };
                if !params.is_empty() {
                    self.client.update_promotion_code(stripe_id, params).await?;
                }
            }
        }

        if let Some(active) = update.active {
            record.active = active;
        }
        if let Some(code) = update.code {
            record.code = code;
        }
        if let Some(coupon_id) = update.coupon_id {
            record.coupon_id = coupon_id;
        }
        if let Some(customer) = update.customer {
            record.customer = Some(customer);
        }
        if let Some(expires_at) = update.expires_at {
            record.expires_at = Some(expires_at);
        }
        if let Some(livemode) = update.livemode {
            record.livemode = livemode;
        }
        if let Some(max_redemptions) = update.max_redemptions {
            record.max_redemptions = Some(max_redemptions);
        }
        if let Some(times_redeemed) = update.times_redeemed {
            record.times_redeemed = Some(times_redeemed);
        }
        if let Some(restrictions) = update.restrictions {
            record.restrictions = Some(restrictions);
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata;
        }
        if let Some(created) = update.created {
            record.created = Some(created);
        }

        self.store.update_promotion_code(record.clone()).await?;
        Ok(record)
    }

    /// Overwrite a local promotion code from a draft, keeping the local id.
    /// Fields the draft leaves unset are cleared; nothing is pushed to
    /// Stripe.
    pub async fn replace_promotion_code(
        &self,
        id: &str,
        draft: PromotionCodeDraft,
    ) -> Result<PromotionCodeRecord> {
        let existing = self
            .store
            .get_promotion_code(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Promotion code not found: {}", id)))?;

        let record = PromotionCodeRecord {
            id: existing.id,
            stripe_promotion_code_id: draft
                .stripe_promotion_code_id
                .or(existing.stripe_promotion_code_id),
            code: draft.code,
            active: draft.active,
            coupon_id: draft.coupon_id,
            customer: draft.customer,
            expires_at: draft.expires_at,
            livemode: draft.livemode,
            max_redemptions: draft.max_redemptions,
            times_redeemed: draft.times_redeemed,
            restrictions: draft.restrictions,
            metadata: draft.metadata,
            created: draft.created,
        };
        self.store.update_promotion_code(record.clone()).await?;
        Ok(record)
    }

    /// Delete a local promotion code. Outside a sync context the Stripe code
    /// is deactivated; Stripe does not allow hard-deleting it.
    pub async fn delete_promotion_code(&self, id: &str) -> Result<()> {
        let record = self
            .store
            .get_promotion_code(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Promotion code not found: {}", id)))?;

        self.store.delete_promotion_code(id).await?;

        if is_running_in_sync_context() {
            return Ok(());
        }
        if let Some(stripe_id) = record.stripe_promotion_code_id.as_deref() {
            let params = PromotionCodeUpdateParams {
                active: Some(false),
                ..Default::default()
            };
            self.client.update_promotion_code(stripe_id, params).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test::RecordingCatalogClient;
    use crate::context::run_with_sync_context;
    use crate::store::test::InMemoryCatalogStore;

    fn service() -> (CatalogService, InMemoryCatalogStore, RecordingCatalogClient) {
        let store = InMemoryCatalogStore::new();
        let client = RecordingCatalogClient::new();
        let service = CatalogService::new(Arc::new(store.clone()), Arc::new(client.clone()));
        (service, store, client)
    }

    #[tokio::test]
    async fn test_create_product_pushes_once_and_persists_id() {
        let (service, store, client) = service();

        let record = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();

        assert_eq!(client.product_creates().len(), 1);
        assert_eq!(record.stripe_product_id.as_deref(), Some("prod_mock_1"));

        let stored = store.get_product(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.stripe_product_id.as_deref(), Some("prod_mock_1"));
    }

    #[tokio::test]
    async fn test_create_product_with_preset_id_skips_remote() {
        let (service, _store, client) = service();

        let mut draft = ProductDraft::new("Imported");
        draft.stripe_product_id = Some("prod_existing".to_string());
        let record = service.create_product(draft).await.unwrap();

        assert_eq!(client.total_calls(), 0);
        assert_eq!(record.stripe_product_id.as_deref(), Some("prod_existing"));
    }

    #[tokio::test]
    async fn test_create_product_drops_empty_optional_fields() {
        let (service, _store, client) = service();

        service
            .create_product(ProductDraft::new("Bare"))
            .await
            .unwrap();

        let params = &client.product_creates()[0];
        assert_eq!(params.description, None);
        assert!(params.images.is_empty());
        assert_eq!(params.metadata, None);
        assert_eq!(params.tax_code.as_deref(), Some(DEFAULT_TAX_CODE));
    }

    #[tokio::test]
    async fn test_create_price_resolves_product_stripe_id() {
        let (service, _store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();

        let mut draft = PriceDraft::new(&product.id, "USD");
        draft.unit_amount = Some(1500);
        let record = service.create_price(draft).await.unwrap();

        let creates = client.price_creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].product, "prod_mock_1");
        assert_eq!(creates[0].currency, "usd");
        assert_eq!(record.stripe_price_id.as_deref(), Some("price_mock_2"));
    }

    #[tokio::test]
    async fn test_create_price_without_product_fails_validation() {
        let (service, _store, _client) = service();

        let result = service.create_price(PriceDraft::new("missing", "USD")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_price_without_currency_fails_validation() {
        let (service, _store, _client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();
        let result = service.create_price(PriceDraft::new(&product.id, "")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_failed_price_create_persists_nothing() {
        let (service, store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();
        let calls_before = client.total_calls();

        let result = service.create_price(PriceDraft::new(&product.id, "")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.price_count(), 0);

        let result = service.create_price(PriceDraft::new("missing", "USD")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.price_count(), 0);
        assert_eq!(client.total_calls(), calls_before);
    }

    #[tokio::test]
    async fn test_failed_promotion_code_create_persists_nothing() {
        let (service, store, _client) = service();

        let coupon = service
            .create_coupon(CouponDraft::new(CouponDuration::Forever))
            .await
            .unwrap();

        let result = service
            .create_promotion_code(PromotionCodeDraft::new("", &coupon.id))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = service
            .create_promotion_code(PromotionCodeDraft::new("SPRING25", "missing"))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.promotion_code_count(), 0);
    }

    #[tokio::test]
    async fn test_create_price_with_tiers_forces_tiered_scheme() {
        let (service, _store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();

        let mut draft = PriceDraft::new(&product.id, "USD");
        draft.tiers = Some(vec![PriceTier {
            unit_amount: Some(500),
            up_to: Some(10),
            ..Default::default()
        }]);
        draft.tiers_mode = Some(TiersMode::Graduated);
        service.create_price(draft).await.unwrap();

        let params = &client.price_creates()[0];
        assert_eq!(params.billing_scheme, Some(BillingScheme::Tiered));
        assert!(params.tiers.is_some());
        assert_eq!(params.tiers_mode, Some(TiersMode::Graduated));
    }

    #[tokio::test]
    async fn test_update_price_diffs_only_present_fields() {
        let (service, _store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();
        let price = service
            .create_price(PriceDraft::new(&product.id, "USD"))
            .await
            .unwrap();

        let update = PriceUpdate {
            nickname: Some("Monthly".to_string()),
            ..Default::default()
        };
        service.update_price(&price.id, update).await.unwrap();

        let updates = client.price_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.nickname.as_deref(), Some("Monthly"));
        assert_eq!(updates[0].1.active, None);
        assert_eq!(updates[0].1.metadata, None);
    }

    #[tokio::test]
    async fn test_update_price_with_no_remote_fields_skips_remote_call() {
        let (service, _store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();
        let price = service
            .create_price(PriceDraft::new(&product.id, "USD"))
            .await
            .unwrap();
        let calls_before = client.total_calls();

        let update = PriceUpdate {
            unit_amount: Some(999),
            ..Default::default()
        };
        service.update_price(&price.id, update).await.unwrap();

        assert_eq!(client.total_calls(), calls_before);
    }

    #[tokio::test]
    async fn test_update_price_clears_metadata_when_present_but_empty() {
        let (service, _store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();
        let price = service
            .create_price(PriceDraft::new(&product.id, "USD"))
            .await
            .unwrap();

        let update = PriceUpdate {
            metadata: Some(Vec::new()),
            ..Default::default()
        };
        service.update_price(&price.id, update).await.unwrap();

        let updates = client.price_updates();
        assert_eq!(updates[0].1.metadata, Some(Default::default()));
    }

    #[tokio::test]
    async fn test_update_price_under_sync_context_is_local_only() {
        let (service, store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();
        let price = service
            .create_price(PriceDraft::new(&product.id, "USD"))
            .await
            .unwrap();
        let calls_before = client.total_calls();

        let update = PriceUpdate {
            active: Some(false),
            nickname: Some("From sync".to_string()),
            ..Default::default()
        };
        run_with_sync_context(service.update_price(&price.id, update))
            .await
            .unwrap();

        assert_eq!(client.total_calls(), calls_before);
        let stored = store.get_price(&price.id).await.unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(stored.nickname.as_deref(), Some("From sync"));
    }

    #[tokio::test]
    async fn test_replace_price_clears_fields_absent_from_draft() {
        let (service, store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();
        let mut draft = PriceDraft::new(&product.id, "USD");
        draft.nickname = Some("Monthly".to_string());
        draft.lookup_key = Some("monthly".to_string());
        let price = service.create_price(draft).await.unwrap();
        let calls_before = client.total_calls();

        let mut replacement = PriceDraft::new(&product.id, "USD");
        replacement.stripe_price_id = price.stripe_price_id.clone();
        service
            .replace_price(&price.id, replacement)
            .await
            .unwrap();

        let stored = store.get_price(&price.id).await.unwrap().unwrap();
        assert_eq!(stored.nickname, None);
        assert_eq!(stored.lookup_key, None);
        assert_eq!(stored.stripe_price_id, price.stripe_price_id);
        assert_eq!(client.total_calls(), calls_before);
    }

    #[tokio::test]
    async fn test_delete_price_archives_instead_of_deleting() {
        let (service, store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();
        let price = service
            .create_price(PriceDraft::new(&product.id, "USD"))
            .await
            .unwrap();

        service.delete_price(&price.id).await.unwrap();

        assert!(store.get_price(&price.id).await.unwrap().is_none());
        let updates = client.price_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "price_mock_2");
        assert_eq!(updates[0].1.active, Some(false));
    }

    #[tokio::test]
    async fn test_delete_price_under_sync_context_skips_remote() {
        let (service, _store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();
        let price = service
            .create_price(PriceDraft::new(&product.id, "USD"))
            .await
            .unwrap();
        let calls_before = client.total_calls();

        run_with_sync_context(service.delete_price(&price.id))
            .await
            .unwrap();
        assert_eq!(client.total_calls(), calls_before);
    }

    #[tokio::test]
    async fn test_create_coupon_resolves_applies_to_products() {
        let (service, _store, client) = service();

        let product = service
            .create_product(ProductDraft::new("Widget"))
            .await
            .unwrap();

        let mut draft = CouponDraft::new(CouponDuration::Once);
        draft.percent_off = Some(25.0);
        draft.applies_to_product_ids = vec![product.id.clone(), "missing".to_string()];
        let record = service.create_coupon(draft).await.unwrap();

        let creates = client.coupon_creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].applies_to_products, vec!["prod_mock_1"]);
        assert_eq!(record.stripe_coupon_id.as_deref(), Some("co_mock_2"));
    }

    #[tokio::test]
    async fn test_update_coupon_diffs_name_and_metadata_only() {
        let (service, _store, client) = service();

        let coupon = service
            .create_coupon(CouponDraft::new(CouponDuration::Forever))
            .await
            .unwrap();
        let calls_before = client.total_calls();

        // amount_off is not remotely updatable; no call should go out.
        let update = CouponUpdate {
            amount_off: Some(100),
            ..Default::default()
        };
        service.update_coupon(&coupon.id, update).await.unwrap();
        assert_eq!(client.total_calls(), calls_before);

        let update = CouponUpdate {
            name: Some("Spring sale".to_string()),
            ..Default::default()
        };
        service.update_coupon(&coupon.id, update).await.unwrap();
        let updates = client.coupon_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.name.as_deref(), Some("Spring sale"));
    }

    #[tokio::test]
    async fn test_delete_coupon_hard_deletes_remotely() {
        let (service, _store, client) = service();

        let coupon = service
            .create_coupon(CouponDraft::new(CouponDuration::Forever))
            .await
            .unwrap();
        service.delete_coupon(&coupon.id).await.unwrap();

        assert_eq!(client.coupon_deletes(), vec!["co_mock_1"]);
    }

    #[tokio::test]
    async fn test_create_promotion_code_requires_coupon_stripe_id() {
        let (service, _store, _client) = service();

        let result = service
            .create_promotion_code(PromotionCodeDraft::new("SPRING25", "missing"))
            .await;
        match result {
            Err(Error::Validation(msg)) => {
                assert_eq!(
                    msg,
                    "Unable to resolve a Stripe coupon ID for the promotion code."
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_promotion_code_pushes_and_persists_id() {
        let (service, store, client) = service();

        let coupon = service
            .create_coupon(CouponDraft::new(CouponDuration::Forever))
            .await
            .unwrap();
        let record = service
            .create_promotion_code(PromotionCodeDraft::new("SPRING25", &coupon.id))
            .await
            .unwrap();

        let creates = client.promotion_code_creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].coupon, "co_mock_1");
        assert_eq!(creates[0].code, "SPRING25");
        assert_eq!(
            record.stripe_promotion_code_id.as_deref(),
            Some("promo_mock_2")
        );

        let stored = store.get_promotion_code(&record.id).await.unwrap().unwrap();
        assert_eq!(
            stored.stripe_promotion_code_id.as_deref(),
            Some("promo_mock_2")
        );
    }

    #[tokio::test]
    async fn test_create_promotion_code_drops_empty_restrictions() {
        let (service, _store, client) = service();

        let coupon = service
            .create_coupon(CouponDraft::new(CouponDuration::Forever))
            .await
            .unwrap();
        let mut draft = PromotionCodeDraft::new("EMPTYRESTR", &coupon.id);
        draft.restrictions = Some(PromotionCodeRestrictions::default());
        service.create_promotion_code(draft).await.unwrap();

        assert_eq!(client.promotion_code_creates()[0].restrictions, None);
    }

    #[tokio::test]
    async fn test_delete_promotion_code_deactivates_remotely() {
        let (service, _store, client) = service();

        let coupon = service
            .create_coupon(CouponDraft::new(CouponDuration::Forever))
            .await
            .unwrap();
        let code = service
            .create_promotion_code(PromotionCodeDraft::new("SPRING25", &coupon.id))
            .await
            .unwrap();

        service.delete_promotion_code(&code.id).await.unwrap();

        let updates = client.promotion_code_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "promo_mock_2");
        assert_eq!(updates[0].1.active, Some(false));
    }
}
