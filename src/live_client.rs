//! Live Stripe-backed implementation of [`StripeCatalogClient`].
//!
//! Wraps the `async-stripe` SDK with API key validation, per-operation
//! idempotency keys, request timeouts and retries with exponential backoff
//! and jitter. SDK objects are mapped into the crate's wire payloads so the
//! rest of the plugin never touches SDK types.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::client::{
    CouponCreateParams, CouponPayload, CouponUpdateParams, IdRef, ListParams, Page,
    PriceCreateParams, PricePayload, PriceUpdateParams, ProductCreateParams, ProductPayload,
    ProductRef, PromotionCodeCreateParams, PromotionCodePayload, PromotionCodeUpdateParams,
    StripeCatalogClient,
};
use crate::error::{Error, Result};
use crate::store::{
    BillingScheme, CouponDuration, PriceCustomUnitAmount, PriceRecurring, PriceTier, PriceType,
    PromotionCodeRestrictions, RecurringInterval, TaxBehavior, TiersMode, UsageType,
};

const MIN_KEY_LENGTH: usize = 20;

/// Tuning knobs for the live client.
#[derive(Debug, Clone)]
pub struct LiveCatalogClientConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
    /// Per-attempt request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for LiveCatalogClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_seconds: 30,
        }
    }
}

impl LiveCatalogClientConfig {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    #[must_use]
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// The API key failed validation before any request was made.
#[derive(Debug)]
pub struct InvalidApiKeyError {
    reason: String,
}

impl fmt::Display for InvalidApiKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid Stripe API key: {}", self.reason)
    }
}

impl std::error::Error for InvalidApiKeyError {}

fn validate_api_key(key: &str) -> std::result::Result<(), InvalidApiKeyError> {
    if key.is_empty() {
        return Err(InvalidApiKeyError {
            reason: "key is empty".to_string(),
        });
    }
    if key.len() < MIN_KEY_LENGTH {
        return Err(InvalidApiKeyError {
            reason: format!("key is shorter than {} characters", MIN_KEY_LENGTH),
        });
    }
    let valid_prefix = key.starts_with("sk_test_")
        || key.starts_with("sk_live_")
        || key.starts_with("rk_test_")
        || key.starts_with("rk_live_");
    if !valid_prefix {
        return Err(InvalidApiKeyError {
            reason: "key must start with sk_test_, sk_live_, rk_test_ or rk_live_".to_string(),
        });
    }
    Ok(())
}

/// Stripe-backed catalog client.
pub struct LiveCatalogClient {
    client: stripe::Client,
    api_key: SecretString,
    config: LiveCatalogClientConfig,
}

impl LiveCatalogClient {
    /// Create a client after validating the API key format.
    pub fn new(api_key: SecretString) -> Result<Self> {
        Self::with_config(api_key, LiveCatalogClientConfig::default())
    }

    /// Create a client with explicit retry and timeout settings.
    pub fn with_config(api_key: SecretString, config: LiveCatalogClientConfig) -> Result<Self> {
        validate_api_key(api_key.expose_secret())
            .map_err(|e| Error::config(e.to_string()))?;

        let client = stripe::Client::new(api_key.expose_secret()).with_app_info(
            "stripe-catalog-sync".to_string(),
            Some(env!("CARGO_PKG_VERSION").to_string()),
            None,
        );

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    /// Whether the key is a test-mode key.
    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        let key = self.api_key.expose_secret();
        key.starts_with("sk_test_") || key.starts_with("rk_test_")
    }

    /// Whether the key is a live-mode key.
    #[must_use]
    pub fn is_live_mode(&self) -> bool {
        !self.is_test_mode()
    }

    fn generate_idempotency_key(operation: &str) -> String {
        format!("{}_{}", operation, uuid::Uuid::new_v4())
    }

    /// A client clone that sends the given idempotency key with every
    /// attempt, so retries of a create never double-create.
    fn idempotent_client(&self, operation: &str) -> stripe::Client {
        let key = Self::generate_idempotency_key(operation);
        self.client
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(key))
    }
}

impl fmt::Debug for LiveCatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveCatalogClient")
            .field("test_mode", &self.is_test_mode())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn is_retryable_error(error: &stripe::StripeError) -> bool {
    match error {
        stripe::StripeError::Stripe(request_error) => {
            let status = request_error.http_status;
            status == 429 || (500..600).contains(&status)
        }
        stripe::StripeError::Timeout => true,
        _ => false,
    }
}

fn calculate_backoff_delay(config: &LiveCatalogClientConfig, attempt: u32) -> Duration {
    let exponential = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let capped = exponential.min(config.max_delay_ms);
    let jitter = fastrand::u64(0..=capped / 4);
    Duration::from_millis(capped.saturating_add(jitter))
}

async fn with_retry<T, F, Fut>(
    config: &LiveCatalogClientConfig,
    operation: &str,
    operation_fn: F,
) -> std::result::Result<T, stripe::StripeError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, stripe::StripeError>>,
{
    let timeout = Duration::from_secs(config.timeout_seconds);
    let mut attempt = 0u32;

    loop {
        let result = match tokio::time::timeout(timeout, operation_fn()).await {
            Ok(result) => result,
            Err(_) => Err(stripe::StripeError::Timeout),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= config.max_retries || !is_retryable_error(&error) {
                    return Err(error);
                }
                let delay = calculate_backoff_delay(config, attempt);
                tracing::warn!(
                    target: "stripe_catalog_sync",
                    operation = %operation,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying Stripe request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn map_stripe_error(operation: &str, error: stripe::StripeError) -> Error {
    match error {
        stripe::StripeError::Stripe(request_error) => Error::StripeApi {
            operation: operation.to_string(),
            message: request_error
                .message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
            code: request_error.code.map(|c| format!("{:?}", c)),
            http_status: Some(request_error.http_status),
        },
        stripe::StripeError::QueryStringSerialize(e) => {
            Error::internal(format!("{}: failed to serialize request: {}", operation, e))
        }
        stripe::StripeError::JSONSerialize(e) => {
            Error::internal(format!("{}: failed to serialize payload: {}", operation, e))
        }
        stripe::StripeError::UnsupportedVersion => {
            Error::internal(format!("{}: unsupported Stripe API version", operation))
        }
        stripe::StripeError::ClientError(message) => Error::StripeApi {
            operation: operation.to_string(),
            message,
            code: None,
            http_status: None,
        },
        stripe::StripeError::Timeout => Error::StripeApi {
            operation: operation.to_string(),
            message: "Request timed out".to_string(),
            code: None,
            http_status: Some(408),
        },
    }
}

// ----------------------------------------------------------------------
// Id and enum conversions
// ----------------------------------------------------------------------

fn parse_product_id(id: &str) -> Result<stripe::ProductId> {
    id.parse()
        .map_err(|_| Error::bad_request(format!("Invalid Stripe product id: {}", id)))
}

fn parse_price_id(id: &str) -> Result<stripe::PriceId> {
    id.parse()
        .map_err(|_| Error::bad_request(format!("Invalid Stripe price id: {}", id)))
}

fn parse_coupon_id(id: &str) -> Result<stripe::CouponId> {
    id.parse()
        .map_err(|_| Error::bad_request(format!("Invalid Stripe coupon id: {}", id)))
}

fn parse_promotion_code_id(id: &str) -> Result<stripe::PromotionCodeId> {
    id.parse()
        .map_err(|_| Error::bad_request(format!("Invalid Stripe promotion code id: {}", id)))
}

fn parse_tax_code_id(id: &str) -> Result<stripe::TaxCodeId> {
    id.parse()
        .map_err(|_| Error::bad_request(format!("Invalid Stripe tax code id: {}", id)))
}

fn parse_currency(code: &str) -> Result<stripe::Currency> {
    code.to_lowercase()
        .parse()
        .map_err(|_| Error::bad_request(format!("Invalid currency code: {}", code)))
}

fn to_sdk_metadata(metadata: BTreeMap<String, String>) -> stripe::Metadata {
    metadata.into_iter().collect()
}

fn from_sdk_metadata(metadata: Option<stripe::Metadata>) -> Option<BTreeMap<String, String>> {
    metadata.map(|m| m.into_iter().collect())
}

fn to_sdk_billing_scheme(scheme: BillingScheme) -> stripe::PriceBillingScheme {
    match scheme {
        BillingScheme::PerUnit => stripe::PriceBillingScheme::PerUnit,
        BillingScheme::Tiered => stripe::PriceBillingScheme::Tiered,
    }
}

fn from_sdk_billing_scheme(scheme: stripe::PriceBillingScheme) -> BillingScheme {
    match scheme {
        stripe::PriceBillingScheme::PerUnit => BillingScheme::PerUnit,
        stripe::PriceBillingScheme::Tiered => BillingScheme::Tiered,
    }
}

fn to_sdk_tax_behavior(behavior: TaxBehavior) -> stripe::PriceTaxBehavior {
    match behavior {
        TaxBehavior::Inclusive => stripe::PriceTaxBehavior::Inclusive,
        TaxBehavior::Exclusive => stripe::PriceTaxBehavior::Exclusive,
        TaxBehavior::Unspecified => stripe::PriceTaxBehavior::Unspecified,
    }
}

fn from_sdk_tax_behavior(behavior: stripe::PriceTaxBehavior) -> TaxBehavior {
    match behavior {
        stripe::PriceTaxBehavior::Inclusive => TaxBehavior::Inclusive,
        stripe::PriceTaxBehavior::Exclusive => TaxBehavior::Exclusive,
        stripe::PriceTaxBehavior::Unspecified => TaxBehavior::Unspecified,
    }
}

fn to_sdk_tiers_mode(mode: TiersMode) -> stripe::PriceTiersMode {
    match mode {
        TiersMode::Graduated => stripe::PriceTiersMode::Graduated,
        TiersMode::Volume => stripe::PriceTiersMode::Volume,
    }
}

fn from_sdk_tiers_mode(mode: stripe::PriceTiersMode) -> TiersMode {
    match mode {
        stripe::PriceTiersMode::Graduated => TiersMode::Graduated,
        stripe::PriceTiersMode::Volume => TiersMode::Volume,
    }
}

fn from_sdk_price_type(price_type: stripe::PriceType) -> PriceType {
    match price_type {
        stripe::PriceType::OneTime => PriceType::OneTime,
        stripe::PriceType::Recurring => PriceType::Recurring,
    }
}

fn to_sdk_coupon_duration(duration: CouponDuration) -> stripe::CouponDuration {
    match duration {
        CouponDuration::Forever => stripe::CouponDuration::Forever,
        CouponDuration::Once => stripe::CouponDuration::Once,
        CouponDuration::Repeating => stripe::CouponDuration::Repeating,
    }
}

fn from_sdk_coupon_duration(duration: stripe::CouponDuration) -> CouponDuration {
    match duration {
        stripe::CouponDuration::Forever => CouponDuration::Forever,
        stripe::CouponDuration::Once => CouponDuration::Once,
        stripe::CouponDuration::Repeating => CouponDuration::Repeating,
    }
}

fn to_sdk_recurring(recurring: &PriceRecurring) -> stripe::CreatePriceRecurring {
    stripe::CreatePriceRecurring {
        interval: match recurring.interval {
            RecurringInterval::Day => stripe::CreatePriceRecurringInterval::Day,
            RecurringInterval::Week => stripe::CreatePriceRecurringInterval::Week,
            RecurringInterval::Month => stripe::CreatePriceRecurringInterval::Month,
            RecurringInterval::Year => stripe::CreatePriceRecurringInterval::Year,
        },
        interval_count: recurring.interval_count,
        trial_period_days: recurring.trial_period_days,
        usage_type: recurring.usage_type.map(|u| match u {
            UsageType::Licensed => stripe::CreatePriceRecurringUsageType::Licensed,
            UsageType::Metered => stripe::CreatePriceRecurringUsageType::Metered,
        }),
        ..Default::default()
    }
}

fn from_sdk_recurring(recurring: &stripe::Recurring) -> PriceRecurring {
    PriceRecurring {
        interval: match recurring.interval {
            stripe::RecurringInterval::Day => RecurringInterval::Day,
            stripe::RecurringInterval::Week => RecurringInterval::Week,
            stripe::RecurringInterval::Month => RecurringInterval::Month,
            stripe::RecurringInterval::Year => RecurringInterval::Year,
        },
        interval_count: Some(recurring.interval_count),
        // The SDK does not model `recurring.meter`; it only reaches the store
        // through raw webhook payloads.
        meter: None,
        trial_period_days: recurring.trial_period_days,
        usage_type: Some(match recurring.usage_type {
            stripe::RecurringUsageType::Licensed => UsageType::Licensed,
            stripe::RecurringUsageType::Metered => UsageType::Metered,
        }),
    }
}

fn to_sdk_tiers(tiers: &[PriceTier]) -> Vec<stripe::CreatePriceTiers> {
    tiers
        .iter()
        .map(|tier| stripe::CreatePriceTiers {
            flat_amount: tier.flat_amount,
            flat_amount_decimal: tier.flat_amount_decimal.clone(),
            unit_amount: tier.unit_amount,
            unit_amount_decimal: tier.unit_amount_decimal.clone(),
            up_to: Some(match tier.up_to {
                Some(limit) => stripe::UpTo::Max(limit.max(0) as u64),
                None => stripe::UpTo::Other(stripe::UpToOther::Inf),
            }),
        })
        .collect()
}

fn from_sdk_tiers(tiers: &[stripe::PriceTier]) -> Vec<PriceTier> {
    tiers
        .iter()
        .map(|tier| PriceTier {
            flat_amount: tier.flat_amount,
            flat_amount_decimal: tier.flat_amount_decimal.clone(),
            unit_amount: tier.unit_amount,
            unit_amount_decimal: tier.unit_amount_decimal.clone(),
            up_to: tier.up_to,
        })
        .collect()
}

// ----------------------------------------------------------------------
// SDK object to payload mapping
// ----------------------------------------------------------------------

fn expandable_id<T>(expandable: &stripe::Expandable<T>) -> String
where
    T: stripe::Object,
    T::Id: ToString,
{
    match expandable {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(object) => object.id().to_string(),
    }
}

fn map_product(product: stripe::Product) -> ProductPayload {
    ProductPayload {
        id: product.id.to_string(),
        name: product.name,
        description: product.description,
        images: product.images.unwrap_or_default(),
        tax_code: product.tax_code.as_ref().map(expandable_id),
        active: product.active,
        metadata: from_sdk_metadata(product.metadata),
        deleted: product.deleted,
    }
}

fn map_price(price: stripe::Price) -> PricePayload {
    PricePayload {
        id: price.id.to_string(),
        product: price.product.map(|p| match p {
            stripe::Expandable::Id(id) => ProductRef::Id(id.to_string()),
            stripe::Expandable::Object(product) => {
                ProductRef::Object(Box::new(map_product(*product)))
            }
        }),
        active: price.active,
        billing_scheme: price.billing_scheme.map(from_sdk_billing_scheme),
        created: price.created,
        currency: price.currency.map(|c| c.to_string()),
        custom_unit_amount: price.custom_unit_amount.map(|c| PriceCustomUnitAmount {
            maximum: c.maximum,
            minimum: c.minimum,
            preset: c.preset,
        }),
        livemode: price.livemode,
        lookup_key: price.lookup_key,
        metadata: from_sdk_metadata(price.metadata),
        nickname: price.nickname,
        recurring: price.recurring.as_ref().map(from_sdk_recurring),
        tax_behavior: price.tax_behavior.map(from_sdk_tax_behavior),
        tiers: price.tiers.as_deref().map(from_sdk_tiers),
        tiers_mode: price.tiers_mode.map(from_sdk_tiers_mode),
        price_type: price.type_.map(from_sdk_price_type),
        unit_amount: price.unit_amount,
        unit_amount_decimal: price.unit_amount_decimal,
    }
}

fn map_coupon(coupon: stripe::Coupon) -> CouponPayload {
    CouponPayload {
        id: coupon.id.to_string(),
        name: coupon.name,
        duration: coupon.duration.map(from_sdk_coupon_duration),
        duration_in_months: coupon.duration_in_months,
        amount_off: coupon.amount_off,
        percent_off: coupon.percent_off,
        currency: coupon.currency.map(|c| c.to_string()),
        redeem_by: coupon.redeem_by,
        max_redemptions: coupon.max_redemptions,
        times_redeemed: coupon.times_redeemed,
        applies_to: coupon.applies_to.map(|a| crate::client::AppliesToPayload {
            products: a.products,
        }),
        livemode: coupon.livemode,
        valid: coupon.valid,
        metadata: from_sdk_metadata(coupon.metadata),
        created: coupon.created,
        deleted: coupon.deleted,
    }
}

fn map_promotion_code(code: stripe::PromotionCode) -> PromotionCodePayload {
    let restrictions = PromotionCodeRestrictions {
        first_time_transaction: Some(code.restrictions.first_time_transaction),
        minimum_amount: code.restrictions.minimum_amount,
        minimum_amount_currency: code
            .restrictions
            .minimum_amount_currency
            .map(|c| c.to_string()),
    };
    PromotionCodePayload {
        id: code.id.to_string(),
        code: Some(code.code),
        active: Some(code.active),
        coupon: Some(crate::client::CouponRef::Object(Box::new(map_coupon(
            code.coupon,
        )))),
        customer: code.customer.as_ref().map(|c| IdRef::Id(expandable_id(c))),
        expires_at: code.expires_at,
        livemode: Some(code.livemode),
        max_redemptions: code.max_redemptions,
        times_redeemed: Some(code.times_redeemed),
        restrictions: Some(restrictions),
        metadata: from_sdk_metadata(code.metadata),
        created: Some(code.created),
    }
}

#[async_trait]
impl StripeCatalogClient for LiveCatalogClient {
    async fn create_product(&self, params: ProductCreateParams) -> Result<ProductPayload> {
        let tax_code = params.tax_code.as_deref().map(parse_tax_code_id).transpose()?;
        let client = self.idempotent_client("create_product");
        let result = with_retry(&self.config, "create_product", || {
            let client = client.clone();
            let params = params.clone();
            let tax_code = tax_code.clone();
            async move {
                let mut create = stripe::CreateProduct::new(&params.name);
                create.description = params.description.as_deref();
                create.active = params.active;
                create.tax_code = tax_code;
                if !params.images.is_empty() {
                    create.images = Some(params.images.clone());
                }
                create.metadata = params.metadata.clone().map(to_sdk_metadata);
                stripe::Product::create(&client, create).await
            }
        })
        .await;
        result
            .map(map_product)
            .map_err(|e| map_stripe_error("create_product", e))
    }

    async fn delete_product(&self, id: &str) -> Result<()> {
        let product_id = parse_product_id(id)?;
        let client = self.client.clone();
        with_retry(&self.config, "delete_product", || {
            let client = client.clone();
            let product_id = product_id.clone();
            async move { stripe::Product::delete(&client, &product_id).await }
        })
        .await
        .map(|_| ())
        .map_err(|e| map_stripe_error("delete_product", e))
    }

    async fn retrieve_product(&self, id: &str) -> Result<ProductPayload> {
        let product_id = parse_product_id(id)?;
        let client = self.client.clone();
        with_retry(&self.config, "retrieve_product", || {
            let client = client.clone();
            let product_id = product_id.clone();
            async move { stripe::Product::retrieve(&client, &product_id, &[]).await }
        })
        .await
        .map(map_product)
        .map_err(|e| map_stripe_error("retrieve_product", e))
    }

    async fn list_products(&self, params: ListParams) -> Result<Page<ProductPayload>> {
        let starting_after = params
            .starting_after
            .as_deref()
            .map(parse_product_id)
            .transpose()?;
        let client = self.client.clone();
        let list = with_retry(&self.config, "list_products", || {
            let client = client.clone();
            let starting_after = starting_after.clone();
            let limit = params.limit;
            async move {
                let mut list_params = stripe::ListProducts::new();
                list_params.limit = limit;
                list_params.starting_after = starting_after.clone();
                stripe::Product::list(&client, &list_params).await
            }
        })
        .await
        .map_err(|e| map_stripe_error("list_products", e))?;

        Ok(Page {
            data: list.data.into_iter().map(map_product).collect(),
            has_more: list.has_more,
        })
    }

    async fn create_price(&self, params: PriceCreateParams) -> Result<PricePayload> {
        let currency = parse_currency(&params.currency)?;
        let client = self.idempotent_client("create_price");
        let result = with_retry(&self.config, "create_price", || {
            let client = client.clone();
            let params = params.clone();
            async move {
                let mut create = stripe::CreatePrice::new(currency);
                create.product = Some(stripe::IdOrCreate::Id(&params.product));
                create.active = params.active;
                create.billing_scheme = params.billing_scheme.map(to_sdk_billing_scheme);
                create.lookup_key = params.lookup_key.as_deref();
                create.metadata = params.metadata.clone().map(to_sdk_metadata);
                create.nickname = params.nickname.as_deref();
                create.recurring = params.recurring.as_ref().map(to_sdk_recurring);
                create.tax_behavior = params.tax_behavior.map(to_sdk_tax_behavior);
                create.tiers = params.tiers.as_deref().map(to_sdk_tiers);
                create.tiers_mode = params.tiers_mode.map(to_sdk_tiers_mode);
                create.unit_amount = params.unit_amount;
                create.unit_amount_decimal = params.unit_amount_decimal.as_deref();
                stripe::Price::create(&client, create).await
            }
        })
        .await;
        result
            .map(map_price)
            .map_err(|e| map_stripe_error("create_price", e))
    }

    async fn update_price(&self, id: &str, params: PriceUpdateParams) -> Result<PricePayload> {
        let price_id = parse_price_id(id)?;
        let client = self.client.clone();
        with_retry(&self.config, "update_price", || {
            let client = client.clone();
            let price_id = price_id.clone();
            let params = params.clone();
            async move {
                let mut update = stripe::UpdatePrice::new();
                update.active = params.active;
                update.lookup_key = params.lookup_key.as_deref();
                update.metadata = params.metadata.clone().map(to_sdk_metadata);
                update.nickname = params.nickname.as_deref();
                update.tax_behavior = params.tax_behavior.map(to_sdk_tax_behavior);
                stripe::Price::update(&client, &price_id, update).await
            }
        })
        .await
        .map(map_price)
        .map_err(|e| map_stripe_error("update_price", e))
    }

    async fn list_prices(&self, params: ListParams) -> Result<Page<PricePayload>> {
        let starting_after = params
            .starting_after
            .as_deref()
            .map(parse_price_id)
            .transpose()?;
        let client = self.client.clone();
        let list = with_retry(&self.config, "list_prices", || {
            let client = client.clone();
            let starting_after = starting_after.clone();
            let limit = params.limit;
            async move {
                let mut list_params = stripe::ListPrices::new();
                list_params.limit = limit;
                list_params.starting_after = starting_after.clone();
                stripe::Price::list(&client, &list_params).await
            }
        })
        .await
        .map_err(|e| map_stripe_error("list_prices", e))?;

        Ok(Page {
            data: list.data.into_iter().map(map_price).collect(),
            has_more: list.has_more,
        })
    }

    async fn create_coupon(&self, params: CouponCreateParams) -> Result<CouponPayload> {
        let currency = params.currency.as_deref().map(parse_currency).transpose()?;
        let client = self.idempotent_client("create_coupon");
        let result = with_retry(&self.config, "create_coupon", || {
            let client = client.clone();
            let params = params.clone();
            async move {
                let mut create = stripe::CreateCoupon::new();
                create.duration = Some(to_sdk_coupon_duration(params.duration));
                create.name = params.name.as_deref();
                create.amount_off = params.amount_off;
                create.percent_off = params.percent_off;
                create.currency = currency;
                create.duration_in_months = params.duration_in_months;
                create.max_redemptions = params.max_redemptions;
                create.redeem_by = params.redeem_by;
                if !params.applies_to_products.is_empty() {
                    create.applies_to = Some(stripe::CreateCouponAppliesTo {
                        products: Some(params.applies_to_products.clone()),
                        ..Default::default()
                    });
                }
                create.metadata = params.metadata.clone().map(to_sdk_metadata);
                stripe::Coupon::create(&client, create).await
            }
        })
        .await;
        result
            .map(map_coupon)
            .map_err(|e| map_stripe_error("create_coupon", e))
    }

    async fn update_coupon(&self, id: &str, params: CouponUpdateParams) -> Result<CouponPayload> {
        let coupon_id = parse_coupon_id(id)?;
        let client = self.client.clone();
        with_retry(&self.config, "update_coupon", || {
            let client = client.clone();
            let coupon_id = coupon_id.clone();
            let params = params.clone();
            async move {
                let mut update = stripe::UpdateCoupon::new();
                update.name = params.name.as_deref();
                update.metadata = params.metadata.clone().map(to_sdk_metadata);
                stripe::Coupon::update(&client, &coupon_id, update).await
            }
        })
        .await
        .map(map_coupon)
        .map_err(|e| map_stripe_error("update_coupon", e))
    }

    async fn delete_coupon(&self, id: &str) -> Result<()> {
        let coupon_id = parse_coupon_id(id)?;
        let client = self.client.clone();
        with_retry(&self.config, "delete_coupon", || {
            let client = client.clone();
            let coupon_id = coupon_id.clone();
            async move { stripe::Coupon::delete(&client, &coupon_id).await }
        })
        .await
        .map(|_| ())
        .map_err(|e| map_stripe_error("delete_coupon", e))
    }

    async fn retrieve_coupon(&self, id: &str) -> Result<CouponPayload> {
        let coupon_id = parse_coupon_id(id)?;
        let client = self.client.clone();
        with_retry(&self.config, "retrieve_coupon", || {
            let client = client.clone();
            let coupon_id = coupon_id.clone();
            async move { stripe::Coupon::retrieve(&client, &coupon_id, &[]).await }
        })
        .await
        .map(map_coupon)
        .map_err(|e| map_stripe_error("retrieve_coupon", e))
    }

    async fn list_coupons(&self, params: ListParams) -> Result<Page<CouponPayload>> {
        let starting_after = params
            .starting_after
            .as_deref()
            .map(parse_coupon_id)
            .transpose()?;
        let client = self.client.clone();
        let list = with_retry(&self.config, "list_coupons", || {
            let client = client.clone();
            let starting_after = starting_after.clone();
            let limit = params.limit;
            async move {
                let mut list_params = stripe::ListCoupons::new();
                list_params.limit = limit;
                list_params.starting_after = starting_after.clone();
                stripe::Coupon::list(&client, &list_params).await
            }
        })
        .await
        .map_err(|e| map_stripe_error("list_coupons", e))?;

        Ok(Page {
            data: list.data.into_iter().map(map_coupon).collect(),
            has_more: list.has_more,
        })
    }

    async fn create_promotion_code(
        &self,
        params: PromotionCodeCreateParams,
    ) -> Result<PromotionCodePayload> {
        let minimum_amount_currency = params
            .restrictions
            .as_ref()
            .and_then(|r| r.minimum_amount_currency.as_deref())
            .map(parse_currency)
            .transpose()?;
        let client = self.idempotent_client("create_promotion_code");
        let result = with_retry(&self.config, "create_promotion_code", || {
            let client = client.clone();
            let params = params.clone();
            async move {
                let metadata = params.metadata.clone().map(to_sdk_metadata);
                let mut create = stripe::CreatePromotionCode::new(&params.coupon);
                create.code = Some(&params.code);
                create.active = params.active;
                create.customer = params.customer.as_deref();
                create.expires_at = params.expires_at;
                create.max_redemptions = params.max_redemptions;
                create.metadata = metadata.as_ref();
                create.restrictions = params.restrictions.as_ref().map(|r| {
                    stripe::CreatePromotionCodeRestrictions {
                        first_time_transaction: r.first_time_transaction,
                        minimum_amount: r.minimum_amount,
                        minimum_amount_currency,
                        ..Default::default()
                    }
                });
                create.send(&client).await
            }
        })
        .await;
        result
            .map(map_promotion_code)
            .map_err(|e| map_stripe_error("create_promotion_code", e))
    }

    async fn update_promotion_code(
        &self,
        id: &str,
        params: PromotionCodeUpdateParams,
    ) -> Result<PromotionCodePayload> {
        let promotion_code_id = parse_promotion_code_id(id)?;
        let client = self.client.clone();
        with_retry(&self.config, "update_promotion_code", || {
            let client = client.clone();
            let promotion_code_id = promotion_code_id.clone();
            let params = params.clone();
            async move {
                let mut update = stripe::UpdatePromotionCode::new();
                update.active = params.active;
                update.metadata = params.metadata.clone().map(to_sdk_metadata);
                stripe::PromotionCode::update(&client, &promotion_code_id, update).await
            }
        })
        .await
        .map(map_promotion_code)
        .map_err(|e| map_stripe_error("update_promotion_code", e))
    }

    async fn list_promotion_codes(&self, params: ListParams) -> Result<Page<PromotionCodePayload>> {
        let starting_after = params
            .starting_after
            .as_deref()
            .map(parse_promotion_code_id)
            .transpose()?;
        let client = self.client.clone();
        let list = with_retry(&self.config, "list_promotion_codes", || {
            let client = client.clone();
            let starting_after = starting_after.clone();
            let limit = params.limit;
            async move {
                let mut list_params = stripe::ListPromotionCodes::new();
                list_params.limit = limit;
                list_params.starting_after = starting_after.clone();
                stripe::PromotionCode::list(&client, &list_params).await
            }
        })
        .await
        .map_err(|e| map_stripe_error("list_promotion_codes", e))?;

        Ok(Page {
            data: list.data.into_iter().map(map_promotion_code).collect(),
            has_more: list.has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SecretString {
        SecretString::new("sk_test_0123456789abcdef0123".to_string())
    }

    #[test]
    fn test_validate_api_key_accepts_valid_prefixes() {
        assert!(validate_api_key("sk_test_0123456789abcdef0123").is_ok());
        assert!(validate_api_key("sk_live_0123456789abcdef0123").is_ok());
        assert!(validate_api_key("rk_test_0123456789abcdef0123").is_ok());
        assert!(validate_api_key("rk_live_0123456789abcdef0123").is_ok());
    }

    #[test]
    fn test_validate_api_key_rejects_bad_keys() {
        assert!(validate_api_key("").is_err());
        assert!(validate_api_key("sk_test_short").is_err());
        assert!(validate_api_key("pk_test_0123456789abcdef0123").is_err());
        assert!(validate_api_key("not-a-key-but-long-enough").is_err());
    }

    #[test]
    fn test_client_modes() {
        let client = LiveCatalogClient::new(test_key()).unwrap();
        assert!(client.is_test_mode());
        assert!(!client.is_live_mode());

        let live = LiveCatalogClient::new(SecretString::new(
            "sk_live_0123456789abcdef0123".to_string(),
        ))
        .unwrap();
        assert!(live.is_live_mode());
    }

    #[test]
    fn test_new_rejects_invalid_key() {
        let result = LiveCatalogClient::new(SecretString::new("bogus".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_idempotency_keys_are_unique_per_call() {
        let a = LiveCatalogClient::generate_idempotency_key("create_product");
        let b = LiveCatalogClient::generate_idempotency_key("create_product");
        assert_ne!(a, b);
        assert!(a.starts_with("create_product_"));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = LiveCatalogClientConfig::default()
            .with_base_delay_ms(100)
            .with_max_delay_ms(1_000);

        let first = calculate_backoff_delay(&config, 0);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(125));

        // Attempt 10 would be 102_400ms uncapped.
        let capped = calculate_backoff_delay(&config, 10);
        assert!(capped <= Duration::from_millis(1_250));
    }

    #[test]
    fn test_debug_does_not_leak_the_key() {
        let client = LiveCatalogClient::new(test_key()).unwrap();
        let output = format!("{:?}", client);
        assert!(!output.contains("sk_test_"));
        assert!(output.contains("test_mode"));
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_on_non_retryable_errors() {
        let config = LiveCatalogClientConfig::default().with_base_delay_ms(1);
        let attempts = std::sync::atomic::AtomicU32::new(0);

        let result: std::result::Result<(), _> = with_retry(&config, "test_op", || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(stripe::StripeError::ClientError("boom".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_retries_timeouts_until_exhausted() {
        let config = LiveCatalogClientConfig::default()
            .with_max_retries(2)
            .with_base_delay_ms(1)
            .with_max_delay_ms(2);
        let attempts = std::sync::atomic::AtomicU32::new(0);

        let result: std::result::Result<(), _> = with_retry(&config, "test_op", || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(stripe::StripeError::Timeout) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
