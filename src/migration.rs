//! One-time import of the existing Stripe product catalog.
//!
//! On first startup the plugin pulls every product from Stripe and creates
//! local records for the ones it does not know yet. A completion marker in
//! the store makes later startups skip the pass, unless the configuration
//! asks for it to run every time.

use crate::config::PluginConfig;
use crate::error::Result;
use crate::store::MigrationState;
use crate::sync::{product_draft_from_payload, SyncEngine};
use crate::client::ListParams;
use crate::timefmt;

const MIGRATION_PAGE_LIMIT: u64 = 100;

/// Result of a migration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Products fetched from Stripe.
    pub product_count: u64,
    /// Local records created.
    pub created_count: u64,
}

/// Import Stripe products that have no local record yet.
///
/// Returns `Ok(None)` when the pass was skipped, either because it already
/// completed on an earlier startup or because no API key is configured.
pub async fn run_initial_product_migration(
    engine: &SyncEngine,
    config: &PluginConfig,
) -> Result<Option<MigrationReport>> {
    if !config.always_run_migration {
        if let Some(state) = engine.store().migration_state().await? {
            tracing::debug!(
                target: "stripe_catalog_sync",
                completed_at = %state.completed_at,
                "Initial product migration already completed, skipping"
            );
            return Ok(None);
        }
    }

    if config.secret_key.is_none() {
        tracing::warn!(
            target: "stripe_catalog_sync",
            "No Stripe API key configured, skipping initial product migration"
        );
        return Ok(None);
    }

    let mut product_count = 0u64;
    let mut created_count = 0u64;
    let mut starting_after: Option<String> = None;

    loop {
        let params = ListParams {
            limit: Some(MIGRATION_PAGE_LIMIT),
            starting_after: starting_after.clone(),
        };
        let page = engine.client().list_products(params).await?;
        let last_id = page.data.last().map(|p| p.id.clone());

        for payload in &page.data {
            product_count += 1;
            if engine
                .store()
                .find_product_by_stripe_id(&payload.id)
                .await?
                .is_some()
            {
                continue;
            }
            // The draft carries the Stripe id, so the create stays local.
            engine
                .service()
                .create_product(product_draft_from_payload(payload))
                .await?;
            created_count += 1;
        }

        if !page.has_more {
            break;
        }
        match last_id {
            Some(id) => starting_after = Some(id),
            None => break,
        }
    }

    engine
        .store()
        .set_migration_state(MigrationState {
            completed_at: timefmt::now_iso(),
            product_count,
            created_count,
        })
        .await?;

    tracing::info!(
        target: "stripe_catalog_sync",
        product_count,
        created_count,
        "Initial product migration completed"
    );
    Ok(Some(MigrationReport {
        product_count,
        created_count,
    }))
}

/// [`run_initial_product_migration`] for startup paths that must not fail;
/// errors are logged instead of propagated.
pub async fn run_initial_product_migration_logged(engine: &SyncEngine, config: &PluginConfig) {
    if let Err(e) = run_initial_product_migration(engine, config).await {
        tracing::error!(
            target: "stripe_catalog_sync",
            error = %e,
            "Initial product migration failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test::RecordingCatalogClient;
    use crate::client::ProductPayload;
    use crate::store::test::InMemoryCatalogStore;
    use crate::store::CatalogStore;
    use std::sync::Arc;

    fn setup() -> (SyncEngine, InMemoryCatalogStore, RecordingCatalogClient) {
        let store = InMemoryCatalogStore::new();
        let client = RecordingCatalogClient::new();
        let engine = SyncEngine::new(Arc::new(store.clone()), Arc::new(client.clone()));
        (engine, store, client)
    }

    fn config_with_key() -> PluginConfig {
        PluginConfig::builder()
            .with_secret_key("sk_test_0123456789abcdef0123")
            .build()
            .unwrap()
    }

    fn product(id: &str, name: &str) -> ProductPayload {
        ProductPayload {
            id: id.to_string(),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_migration_imports_unknown_products() {
        let (engine, store, client) = setup();
        client.seed_remote_products(vec![product("prod_1", "One"), product("prod_2", "Two")]);

        let report = run_initial_product_migration(&engine, &config_with_key())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.product_count, 2);
        assert_eq!(report.created_count, 2);
        assert_eq!(store.product_count(), 2);
        assert!(store.migration_state().await.unwrap().is_some());
        // Imports carry the Stripe id and must not push back to Stripe.
        assert_eq!(client.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_migration_skips_known_products() {
        let (engine, store, client) = setup();
        client.seed_remote_products(vec![product("prod_1", "One"), product("prod_2", "Two")]);

        engine
            .upsert_product(&product("prod_1", "Already here"))
            .await
            .unwrap();

        let report = run_initial_product_migration(&engine, &config_with_key())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.product_count, 2);
        assert_eq!(report.created_count, 1);
        assert_eq!(store.product_count(), 2);
    }

    #[tokio::test]
    async fn test_migration_skips_when_already_completed() {
        let (engine, _store, client) = setup();
        client.seed_remote_products(vec![product("prod_1", "One")]);

        let first = run_initial_product_migration(&engine, &config_with_key())
            .await
            .unwrap();
        assert!(first.is_some());

        let second = run_initial_product_migration(&engine, &config_with_key())
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_migration_reruns_when_always_run_is_set() {
        let (engine, _store, client) = setup();
        client.seed_remote_products(vec![product("prod_1", "One")]);

        let config = PluginConfig::builder()
            .with_secret_key("sk_test_0123456789abcdef0123")
            .with_always_run_migration(true)
            .build()
            .unwrap();

        assert!(run_initial_product_migration(&engine, &config)
            .await
            .unwrap()
            .is_some());
        let rerun = run_initial_product_migration(&engine, &config)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rerun.product_count, 1);
        assert_eq!(rerun.created_count, 0);
    }

    #[tokio::test]
    async fn test_migration_skips_without_api_key() {
        let (engine, store, client) = setup();
        client.seed_remote_products(vec![product("prod_1", "One")]);

        let config = PluginConfig::builder().build().unwrap();
        let report = run_initial_product_migration(&engine, &config).await.unwrap();

        assert!(report.is_none());
        assert_eq!(store.product_count(), 0);
        assert!(store.migration_state().await.unwrap().is_none());
    }
}
