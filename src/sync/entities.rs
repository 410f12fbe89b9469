//! [`EntitySync`] implementations for the four Stripe catalog entities.
//!
//! Each impl maps the Stripe wire payload into a local draft with the Stripe
//! id pre-set, so the lifecycle create path skips the remote call, and
//! replaces existing records wholesale so fields cleared on Stripe are
//! cleared locally too. Dependencies (price to product, promotion code to
//! coupon, coupon applies-to products) resolve through the engine's
//! `ensure_*` helpers, which pull missing records from Stripe recursively.

use async_trait::async_trait;

use crate::client::{
    CouponPayload, ListParams, Page, PricePayload, ProductPayload, ProductRef,
    PromotionCodePayload,
};
use crate::error::Result;
use crate::hooks::{CouponDraft, PriceDraft, ProductDraft, PromotionCodeDraft};
use crate::metadata::from_stripe_metadata;
use crate::store::{CouponDuration, DEFAULT_TAX_CODE};
use crate::sync::{EntitySync, SyncEngine};
use crate::timefmt::unix_to_iso;

/// Map a Stripe product payload into a local draft. Shared with the initial
/// migration, which creates products without going through the upsert path.
pub(crate) fn product_draft_from_payload(payload: &ProductPayload) -> ProductDraft {
    ProductDraft {
        stripe_product_id: Some(payload.id.clone()),
        name: payload.name.clone().unwrap_or_else(|| payload.id.clone()),
        description: payload.description.clone().unwrap_or_default(),
        image_url: payload.images.first().cloned().unwrap_or_default(),
        tax_code: payload
            .tax_code
            .clone()
            .unwrap_or_else(|| DEFAULT_TAX_CODE.to_string()),
        active: payload.active.unwrap_or(true),
        metadata: from_stripe_metadata(payload.metadata.as_ref()),
    }
}

/// Sync descriptor for products.
pub struct ProductSync;

#[async_trait]
impl EntitySync for ProductSync {
    const OBJECT: &'static str = "product";

    type Payload = ProductPayload;
    type Draft = ProductDraft;

    fn remote_id(payload: &Self::Payload) -> &str {
        &payload.id
    }

    async fn draft(_engine: &SyncEngine, payload: &Self::Payload) -> Result<Option<Self::Draft>> {
        Ok(Some(product_draft_from_payload(payload)))
    }

    async fn find_local_id(engine: &SyncEngine, remote_id: &str) -> Result<Option<String>> {
        Ok(engine
            .store()
            .find_product_by_stripe_id(remote_id)
            .await?
            .map(|r| r.id))
    }

    async fn create(engine: &SyncEngine, draft: Self::Draft) -> Result<()> {
        engine.service().create_product(draft).await?;
        Ok(())
    }

    async fn update(engine: &SyncEngine, local_id: &str, draft: Self::Draft) -> Result<()> {
        engine.service().replace_product(local_id, draft).await?;
        Ok(())
    }

    async fn list_page(engine: &SyncEngine, params: ListParams) -> Result<Page<Self::Payload>> {
        engine.client().list_products(params).await
    }
}

/// Sync descriptor for prices.
pub struct PriceSync;

#[async_trait]
impl EntitySync for PriceSync {
    const OBJECT: &'static str = "price";

    type Payload = PricePayload;
    type Draft = PriceDraft;

    fn remote_id(payload: &Self::Payload) -> &str {
        &payload.id
    }

    async fn draft(engine: &SyncEngine, payload: &Self::Payload) -> Result<Option<Self::Draft>> {
        let Some(product_ref) = payload.product.as_ref() else {
            tracing::warn!(
                target: "stripe_catalog_sync",
                stripe_price_id = %payload.id,
                "Price payload has no product reference, skipping"
            );
            return Ok(None);
        };
        let Some(product_id) = engine.ensure_product(product_ref).await else {
            tracing::warn!(
                target: "stripe_catalog_sync",
                stripe_price_id = %payload.id,
                stripe_product_id = %product_ref.id(),
                "Could not resolve the product for a price, skipping"
            );
            return Ok(None);
        };

        Ok(Some(PriceDraft {
            stripe_price_id: Some(payload.id.clone()),
            product_id,
            currency: payload
                .currency
                .as_deref()
                .map(str::to_uppercase)
                .unwrap_or_default(),
            active: payload.active.unwrap_or(true),
            billing_scheme: payload.billing_scheme,
            created: payload.created.and_then(unix_to_iso),
            custom_unit_amount: payload
                .custom_unit_amount
                .clone()
                .filter(|c| !c.is_empty()),
            livemode: payload.livemode.unwrap_or(false),
            lookup_key: payload.lookup_key.clone(),
            metadata: from_stripe_metadata(payload.metadata.as_ref()),
            nickname: payload.nickname.clone(),
            recurring: payload.recurring.clone(),
            tax_behavior: payload.tax_behavior,
            tiers: payload.tiers.clone(),
            tiers_mode: payload.tiers_mode,
            price_type: payload.price_type,
            unit_amount: payload.unit_amount,
            unit_amount_decimal: payload.unit_amount_decimal.clone(),
        }))
    }

    async fn find_local_id(engine: &SyncEngine, remote_id: &str) -> Result<Option<String>> {
        Ok(engine
            .store()
            .find_price_by_stripe_id(remote_id)
            .await?
            .map(|r| r.id))
    }

    async fn create(engine: &SyncEngine, draft: Self::Draft) -> Result<()> {
        engine.service().create_price(draft).await?;
        Ok(())
    }

    async fn update(engine: &SyncEngine, local_id: &str, draft: Self::Draft) -> Result<()> {
        engine.service().replace_price(local_id, draft).await?;
        Ok(())
    }

    async fn list_page(engine: &SyncEngine, params: ListParams) -> Result<Page<Self::Payload>> {
        engine.client().list_prices(params).await
    }
}

/// Sync descriptor for coupons.
pub struct CouponSync;

#[async_trait]
impl EntitySync for CouponSync {
    const OBJECT: &'static str = "coupon";

    type Payload = CouponPayload;
    type Draft = CouponDraft;

    fn remote_id(payload: &Self::Payload) -> &str {
        &payload.id
    }

    async fn draft(engine: &SyncEngine, payload: &Self::Payload) -> Result<Option<Self::Draft>> {
        // Resolve applies-to products to local ids, dropping any that cannot
        // be resolved.
        let mut applies_to_product_ids = Vec::new();
        if let Some(applies_to) = payload.applies_to.as_ref() {
            for stripe_product_id in &applies_to.products {
                let reference = ProductRef::Id(stripe_product_id.clone());
                match engine.ensure_product(&reference).await {
                    Some(local_id) => applies_to_product_ids.push(local_id),
                    None => {
                        tracing::warn!(
                            target: "stripe_catalog_sync",
                            stripe_coupon_id = %payload.id,
                            stripe_product_id = %stripe_product_id,
                            "Could not resolve an applies-to product for a coupon, dropping it"
                        );
                    }
                }
            }
        }

        Ok(Some(CouponDraft {
            stripe_coupon_id: Some(payload.id.clone()),
            name: payload.name.clone(),
            duration: payload.duration.unwrap_or(CouponDuration::Forever),
            duration_in_months: payload.duration_in_months,
            amount_off: payload.amount_off,
            percent_off: payload.percent_off,
            currency: payload.currency.as_deref().map(str::to_uppercase),
            redeem_by: payload.redeem_by.and_then(unix_to_iso),
            max_redemptions: payload.max_redemptions,
            times_redeemed: payload.times_redeemed,
            applies_to_product_ids,
            livemode: payload.livemode.unwrap_or(false),
            valid: payload.valid,
            metadata: from_stripe_metadata(payload.metadata.as_ref()),
            created: payload.created.and_then(unix_to_iso),
        }))
    }

    async fn find_local_id(engine: &SyncEngine, remote_id: &str) -> Result<Option<String>> {
        Ok(engine
            .store()
            .find_coupon_by_stripe_id(remote_id)
            .await?
            .map(|r| r.id))
    }

    async fn create(engine: &SyncEngine, draft: Self::Draft) -> Result<()> {
        engine.service().create_coupon(draft).await?;
        Ok(())
    }

    async fn update(engine: &SyncEngine, local_id: &str, draft: Self::Draft) -> Result<()> {
        engine.service().replace_coupon(local_id, draft).await?;
        Ok(())
    }

    async fn list_page(engine: &SyncEngine, params: ListParams) -> Result<Page<Self::Payload>> {
        engine.client().list_coupons(params).await
    }
}

/// Sync descriptor for promotion codes.
pub struct PromotionCodeSync;

#[async_trait]
impl EntitySync for PromotionCodeSync {
    const OBJECT: &'static str = "promotion_code";

    type Payload = PromotionCodePayload;
    type Draft = PromotionCodeDraft;

    fn remote_id(payload: &Self::Payload) -> &str {
        &payload.id
    }

    async fn draft(engine: &SyncEngine, payload: &Self::Payload) -> Result<Option<Self::Draft>> {
        let Some(coupon_ref) = payload.coupon.as_ref() else {
            tracing::warn!(
                target: "stripe_catalog_sync",
                stripe_promotion_code_id = %payload.id,
                "Promotion code payload has no coupon reference, skipping"
            );
            return Ok(None);
        };
        let Some(coupon_id) = engine.ensure_coupon(coupon_ref).await else {
            tracing::warn!(
                target: "stripe_catalog_sync",
                stripe_promotion_code_id = %payload.id,
                stripe_coupon_id = %coupon_ref.id(),
                "Could not resolve the coupon for a promotion code, skipping"
            );
            return Ok(None);
        };

        let mut restrictions = payload.restrictions.clone().filter(|r| !r.is_empty());
        if let Some(r) = restrictions.as_mut() {
            r.minimum_amount_currency = r
                .minimum_amount_currency
                .as_deref()
                .map(str::to_uppercase);
        }

        Ok(Some(PromotionCodeDraft {
            stripe_promotion_code_id: Some(payload.id.clone()),
            code: payload.code.clone().unwrap_or_default(),
            active: payload.active.unwrap_or(true),
            coupon_id,
            customer: payload.customer.as_ref().map(|c| c.id().to_string()),
            expires_at: payload.expires_at.and_then(unix_to_iso),
            livemode: payload.livemode.unwrap_or(false),
            max_redemptions: payload.max_redemptions,
            times_redeemed: payload.times_redeemed,
            restrictions,
            metadata: from_stripe_metadata(payload.metadata.as_ref()),
            created: payload.created.and_then(unix_to_iso),
        }))
    }

    async fn find_local_id(engine: &SyncEngine, remote_id: &str) -> Result<Option<String>> {
        Ok(engine
            .store()
            .find_promotion_code_by_stripe_id(remote_id)
            .await?
            .map(|r| r.id))
    }

    async fn create(engine: &SyncEngine, draft: Self::Draft) -> Result<()> {
        engine.service().create_promotion_code(draft).await?;
        Ok(())
    }

    async fn update(engine: &SyncEngine, local_id: &str, draft: Self::Draft) -> Result<()> {
        engine
            .service()
            .replace_promotion_code(local_id, draft)
            .await?;
        Ok(())
    }

    async fn list_page(engine: &SyncEngine, params: ListParams) -> Result<Page<Self::Payload>> {
        engine.client().list_promotion_codes(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_product_draft_defaults() {
        let payload = ProductPayload {
            id: "prod_1".to_string(),
            ..Default::default()
        };
        let draft = product_draft_from_payload(&payload);

        assert_eq!(draft.stripe_product_id.as_deref(), Some("prod_1"));
        assert_eq!(draft.name, "prod_1");
        assert_eq!(draft.description, "");
        assert_eq!(draft.image_url, "");
        assert_eq!(draft.tax_code, DEFAULT_TAX_CODE);
        assert!(draft.active);
        assert!(draft.metadata.is_empty());
    }

    #[test]
    fn test_product_draft_takes_first_image_and_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("plan".to_string(), "pro".to_string());
        let payload = ProductPayload {
            id: "prod_1".to_string(),
            name: Some("Widget".to_string()),
            images: vec!["https://a.example/1.png".to_string(), "ignored".to_string()],
            tax_code: Some("txcd_99999999".to_string()),
            active: Some(false),
            metadata: Some(metadata),
            ..Default::default()
        };
        let draft = product_draft_from_payload(&payload);

        assert_eq!(draft.name, "Widget");
        assert_eq!(draft.image_url, "https://a.example/1.png");
        assert_eq!(draft.tax_code, "txcd_99999999");
        assert!(!draft.active);
        assert_eq!(draft.metadata.len(), 1);
        assert_eq!(draft.metadata[0].key, "plan");
        assert_eq!(draft.metadata[0].value, "pro");
    }
}
