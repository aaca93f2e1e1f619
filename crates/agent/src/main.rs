//! Load sentinel agent
//!
//! Runs the detection engine behind an HTTP API: rows are pushed per entity
//! or per host measurement, alerts come back in Alertmanager format.

use std::sync::Arc;

use anyhow::Result;
use sentinel_agent::{api, config::AgentConfig};
use sentinel_lib::{
    anomaly::Alerter,
    health::{components, HealthRegistry},
    monitor::Monitor,
    observability::{SentinelMetrics, StructuredLogger},
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting load-sentinel agent");

    let config = AgentConfig::load()?;
    let monitor_config = config.monitor_config()?;
    info!(
        node_name = %config.node_name,
        window_size = monitor_config.window_size,
        load_threshold = monitor_config.load_threshold,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::FORECASTER).await;

    let metrics = SentinelMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let monitor = Monitor::new(monitor_config)?.with_logger(logger.clone());
    logger.log_startup(AGENT_VERSION, monitor.forecaster_name());

    let mut alerter = Alerter::new(&config.node_name);
    if let Some(url) = &config.external_url {
        alerter = alerter.with_generator_url(url);
    }

    let app_state = Arc::new(api::AppState::new(
        Arc::new(monitor),
        health_registry.clone(),
        metrics,
        alerter,
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                    return Err(e);
                }
                Err(e) => {
                    logger.log_shutdown("API task aborted");
                    return Err(e.into());
                }
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
