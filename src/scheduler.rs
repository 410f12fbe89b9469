//! Cron-driven bulk sync.
//!
//! When enabled, a scheduler job runs a full bulk pass on the configured
//! cron expression. Job failures are logged by the engine and never stop
//! the schedule.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::sync::SyncEngine;

/// Start the periodic sync job. Returns `None` when the schedule is
/// disabled; otherwise the running scheduler, which stops when dropped.
pub async fn start_sync_scheduler(
    config: &PluginConfig,
    engine: Arc<SyncEngine>,
) -> Result<Option<JobScheduler>> {
    if !config.cron.enabled {
        tracing::debug!(
            target: "stripe_catalog_sync",
            "Scheduled Stripe sync is disabled"
        );
        return Ok(None);
    }

    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| Error::internal(format!("Failed to create the sync scheduler: {}", e)))?;

    let expression = config.cron.expression.clone();
    let job = Job::new_async(expression.as_str(), move |_uuid, _lock| {
        let engine = engine.clone();
        Box::pin(async move {
            engine.sync_all_logged().await;
        })
    })
    .map_err(|e| {
        Error::internal(format!(
            "Failed to create the sync job for \"{}\": {}",
            expression, e
        ))
    })?;

    scheduler
        .add(job)
        .await
        .map_err(|e| Error::internal(format!("Failed to schedule the sync job: {}", e)))?;
    scheduler
        .start()
        .await
        .map_err(|e| Error::internal(format!("Failed to start the sync scheduler: {}", e)))?;

    tracing::info!(
        target: "stripe_catalog_sync",
        expression = %config.cron.expression,
        "Scheduled Stripe sync started"
    );
    Ok(Some(scheduler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test::RecordingCatalogClient;
    use crate::store::test::InMemoryCatalogStore;

    fn engine() -> Arc<SyncEngine> {
        Arc::new(SyncEngine::new(
            Arc::new(InMemoryCatalogStore::new()),
            Arc::new(RecordingCatalogClient::new()),
        ))
    }

    #[tokio::test]
    async fn test_disabled_schedule_returns_none() {
        let config = PluginConfig::builder().build().unwrap();
        let scheduler = start_sync_scheduler(&config, engine()).await.unwrap();
        assert!(scheduler.is_none());
    }

    #[tokio::test]
    async fn test_enabled_schedule_starts() {
        let config = PluginConfig::builder()
            .with_cron_enabled(true)
            .build()
            .unwrap();
        let mut scheduler = start_sync_scheduler(&config, engine())
            .await
            .unwrap()
            .expect("scheduler should start");
        scheduler.shutdown().await.unwrap();
    }
}
