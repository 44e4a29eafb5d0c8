//! Mailcast - Campaign dispatcher entry point

use anyhow::Result;
use mailcast_common::config::{Config, LoggingConfig};
use mailcast_core::{CampaignManager, MessengerRegistry, PlaceholderRenderer};
use mailcast_storage::db::DatabasePool;
use mailcast_storage::repository::DbCampaignRepository;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path)?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Mailcast...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.health_check().await?;

    // Run migrations
    db_pool.migrate().await?;
    info!("Database migrations completed");

    // Initialize messengers
    let messengers = Arc::new(MessengerRegistry::from_config(&config).await?);
    info!(messengers = ?messengers.names(), "Messengers initialized");

    let campaigns = Arc::new(CampaignManager::new(
        Arc::new(DbCampaignRepository::new(db_pool.clone())),
        messengers.clone(),
        Arc::new(PlaceholderRenderer::new()),
        config.app.from_email.clone(),
    ));

    // Start running-campaign rate reporter
    let stats_handle = {
        let campaigns = campaigns.clone();
        let period = Duration::from_secs(config.app.stats_interval_secs.max(1));
        tokio::spawn(async move {
            report_rates(campaigns, period).await;
        })
    };

    info!("Mailcast started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Cleanup
    stats_handle.abort();

    if let Err(e) = messengers.close_all().await {
        warn!("Error closing messengers: {}", e);
    }

    info!("Mailcast shutdown complete");

    Ok(())
}

/// Log the estimated send rate of every running campaign
async fn report_rates(campaigns: Arc<CampaignManager>, period: Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        match campaigns.running_stats().await {
            Ok(stats) => {
                for s in stats {
                    info!(
                        campaign_id = %s.id,
                        sent = s.sent,
                        to_send = s.to_send,
                        rate = s.rate,
                        "Campaign progress"
                    );
                }
            }
            Err(e) => error!("Failed to read campaign stats: {}", e),
        }
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
