//! Bidirectional Stripe catalog synchronization.
//!
//! Keeps local product, price, coupon and promotion code records in lockstep
//! with a Stripe account:
//!
//! - local writes go through [`hooks::CatalogService`], which mirrors them to
//!   Stripe before persisting;
//! - remote changes arrive through the [`webhook`] endpoint and a periodic
//!   bulk pass driven by [`scheduler`], both of which feed the
//!   [`sync::SyncEngine`];
//! - a task-local guard ([`context`]) keeps the two directions from echoing
//!   into each other;
//! - on first startup [`migration`] imports the existing Stripe product
//!   catalog.
//!
//! Storage and the Stripe API sit behind the [`store::CatalogStore`] and
//! [`client::StripeCatalogClient`] traits; [`live_client::LiveCatalogClient`]
//! is the production client and the `test-support` feature ships in-memory
//! fakes for both seams.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod live_client;
pub mod metadata;
pub mod migration;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod webhook;

mod timefmt;

pub use client::StripeCatalogClient;
pub use config::{PluginConfig, PluginConfigBuilder};
pub use error::{Error, Result};
pub use hooks::CatalogService;
pub use live_client::LiveCatalogClient;
pub use routes::{router, PluginState};
pub use store::CatalogStore;
pub use sync::{SyncEngine, SyncReport, UpsertOutcome};
pub use webhook::{WebhookHandler, WebhookOutcome};

/// Initialize tracing for binaries embedding the plugin.
///
/// Respects `RUST_LOG`, defaulting to `info`. Set `STRIPE_SYNC_LOG_JSON=1`
/// for JSON output.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json_output = std::env::var("STRIPE_SYNC_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
