//! Road Hazard Service - Main Entry Point

use hazard_service::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;

    info!("=== Road Hazard Service v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Aggregating every {}s, alerting within {}m",
        settings.scheduler.interval_secs, settings.alerts.max_alert_distance_m
    );

    run_server(settings).await
}
