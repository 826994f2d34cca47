use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use eventbus::{BrokerConnection, SensorEventPublisher};

use smarthome::api::{self, ApiState};
use smarthome::config::HomeConfig;
use smarthome::store::SensorDb;
use smarthome::temperature::TemperatureClient;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        )
        .init();

    let cfg = HomeConfig::from_env();

    // Database is a hard dependency.
    let db = SensorDb::connect(&cfg.pg_url)
        .await
        .context("failed to connect to postgres")?;

    // Eventing is not: broker unavailability means degraded mode, never a
    // failed boot.
    let connection = match BrokerConnection::connect(&cfg.broker, "smart-home.publisher").await {
        Ok(conn) => Some(conn),
        Err(e) => {
            warn!("unable to connect to broker: {e} (continuing without events)");
            None
        }
    };

    let publisher = connection
        .as_ref()
        .map(|conn| SensorEventPublisher::new(conn.publisher()));

    let state = Arc::new(ApiState {
        db,
        temperature: TemperatureClient::new(&cfg.temperature_api_url),
        events_connected: publisher.is_some(),
        publisher,
    });
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    info!("smart home service listening on {}", cfg.bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    if let Some(conn) = connection {
        conn.close().await;
    }

    info!("smart home service stopped");
    Ok(())
}
