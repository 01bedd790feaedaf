//! Delivery worker process bootstrap (C6, spec §4.6).
//!
//! A standalone binary running the endless claim-dispatch-retry loop,
//! mirroring how the teacher splits its webhook retry worker from the web
//! process (`services/webhooks/delivery.rs` is driven by its own task, not
//! an HTTP handler). Any number of replicas may run against one store
//! (spec §5); coordination is entirely through the store's atomic claim.

use std::sync::Arc;

use anyhow::Context;

use notifyhub::config::Settings;
use notifyhub::db::Db;
use notifyhub::repository::mongo::MongoNotificationRepository;
use notifyhub::repository::NotificationRepository;
use notifyhub::services::provider::ProviderAdapter;
use notifyhub::worker::DeliveryWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env();

    let db = Db::connect(&settings)
        .await
        .context("failed to connect to MongoDB")?;

    let repo: Arc<dyn NotificationRepository> = Arc::new(MongoNotificationRepository::new(&db));
    repo.ensure_indexes().await.context("failed to create indexes")?;

    let provider = Arc::new(ProviderAdapter::new(&settings));
    let worker = DeliveryWorker::new(repo, provider, settings.provider_retryable_status_codes.clone());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received, finishing in-flight job");
            let _ = shutdown_tx.send(true);
        }
    });

    worker.run(shutdown_rx).await;
    Ok(())
}
