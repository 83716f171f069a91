// src/main.rs
use imbalance_monitor::config::Config;
use imbalance_monitor::domain::errors::{AppError, AppResult};
use imbalance_monitor::exchange::{ExchangeClient, SimulatedExchange};
use imbalance_monitor::notification::LogNotifier;
use imbalance_monitor::orchestrator::Orchestrator;

use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration: a JSON file path as first argument, else the environment
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting imbalance_monitor v{}", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Monitoring {} at resolutions {:?}",
        config.monitor.symbol,
        config.monitor.resolutions
    );

    let notifier = Arc::new(LogNotifier::new(config.notification.clone()));
    let mut orchestrator = Orchestrator::new(&config, notifier);

    for adapter in create_exchange_clients(&config)? {
        orchestrator.add_adapter(adapter);
    }

    orchestrator.start().await?;

    // Periodic market summary
    let market_data = orchestrator.market_data().clone();
    let analyzer = orchestrator.analyzer().clone();
    let summary = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let metrics = market_data.current_metrics();
            log::info!(
                "VWAP: {:.2}, ATR: {:.2}, OI: {:.0} ({:+.0}), funding: {:.5}, bars in history: {}",
                metrics.vwap,
                metrics.atr,
                metrics.open_interest,
                metrics.open_interest_change,
                metrics.funding_rate,
                analyzer.history_len()
            );
        }
    });

    // Wait for shutdown signal
    log::info!("Monitor is running. Press Ctrl+C to stop.");
    ctrl_c().await?;

    // Shutdown
    log::info!("Shutting down...");
    summary.abort();
    orchestrator.stop().await;

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}

/// Create exchange clients based on configuration
fn create_exchange_clients(config: &Config) -> AppResult<Vec<Box<dyn ExchangeClient>>> {
    if config.exchange.names.is_empty() {
        return Err(AppError::Config("No exchange adapters configured".to_string()));
    }

    Ok(config
        .exchange
        .names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let settings = config.exchange.feed_settings(index);
            Box::new(SimulatedExchange::new(name, settings)) as Box<dyn ExchangeClient>
        })
        .collect())
}
