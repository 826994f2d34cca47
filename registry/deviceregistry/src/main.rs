use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use eventbus::{topology, BrokerConnection, DeviceEventPublisher, QueueSpec, Subscriber};

use deviceregistry::api::{self, ApiState};
use deviceregistry::config::RegistryConfig;
use deviceregistry::postgres::{PostgresClient, PostgresDeviceStore};
use deviceregistry::reconciler::{ReconcilerDefaults, SensorReconciler};
use deviceregistry::service::DeviceService;
use deviceregistry::store::DeviceStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        )
        .init();

    let cfg = RegistryConfig::from_env();
    let defaults = ReconcilerDefaults::from_env();

    // Database is a hard dependency.
    let pg = PostgresClient::connect(&cfg.pg_url)
        .await
        .context("failed to connect to postgres")?;
    let store: Arc<dyn DeviceStore> = Arc::new(PostgresDeviceStore::new(pg));

    // Eventing is not: broker unavailability means degraded mode, never a
    // failed boot.
    let connection = match BrokerConnection::connect(&cfg.broker, "device-registry.publisher").await
    {
        Ok(conn) => Some(conn),
        Err(e) => {
            warn!("unable to connect to broker: {e} (continuing without events)");
            None
        }
    };

    let mut service = DeviceService::new(store.clone());
    if let Some(conn) = &connection {
        service = service.with_publisher(Arc::new(DeviceEventPublisher::new(conn.publisher())));
    }
    let service = Arc::new(service);

    let cancel = CancellationToken::new();
    let mut subscriber_task = None;

    if connection.is_some() {
        let queue = QueueSpec::new("device-registry.sensor-events").bind(topology::SENSOR_EVENTS);
        let reconciler = Arc::new(SensorReconciler::new(store.clone(), defaults.clone()));
        let subscriber = Subscriber::new(cfg.broker.clone(), queue, reconciler);

        let task_cancel = cancel.clone();
        subscriber_task = Some(tokio::spawn(async move {
            if let Err(e) = subscriber.start_listening(task_cancel).await {
                error!("event subscriber stopped: {e}");
            }
        }));
        info!("event subscriber listening for sensor events");
    }

    let state = Arc::new(ApiState {
        service,
        registered_by: defaults.registered_by,
        events_connected: connection.is_some(),
    });
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    info!("device registry listening on {}", cfg.bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    cancel.cancel();
    if let Some(task) = subscriber_task {
        let _ = task.await;
    }
    if let Some(conn) = connection {
        conn.close().await;
    }

    info!("device registry stopped");
    Ok(())
}
