use anyhow::Result;
use importer_service::{
    config::AppConfig,
    coordinator::PollCoordinator,
    importer::StatisticsImporter,
    influx::InfluxHttpClient,
    observability, status_server,
    store::PgStatisticsStore,
    validate::{self, ValidationOutcome},
};
use recorder_client::{db, domain::StatisticsMetadata};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.recorder.max_connections)
        .connect(&cfg.recorder.uri)
        .await?;
    db::ensure_schema(&pool).await?;

    let client = InfluxHttpClient::new(&cfg.influxdb)?;

    // Same probe the setup flow runs. A failure is not fatal here because
    // steady-state polling retries on every tick anyway.
    match validate::classify(client.probe().await) {
        Ok(ValidationOutcome::SuccessWithData) => {
            tracing::info!("influxdb probe found water consumption data");
        }
        Ok(ValidationOutcome::SuccessWithoutData) => {
            tracing::warn!("connected to influxdb but no water consumption data found");
        }
        Err(e) => {
            tracing::warn!(error = %e, "influxdb validation failed; polls will keep retrying");
        }
    }

    let store = PgStatisticsStore::new(
        pool,
        cfg.import.max_retries,
        Duration::from_millis(cfg.import.retry_backoff_ms),
    );
    let importer = StatisticsImporter::new(store, StatisticsMetadata::water_consumption());

    let (coordinator, latest) =
        PollCoordinator::new(client, importer, cfg.import.poll_interval_hours);

    if let Some(metrics_cfg) = &cfg.metrics {
        status_server::init(&metrics_cfg.bind_addr, latest, coordinator.refresh_handle());
    }

    tokio::select! {
        () = coordinator.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
