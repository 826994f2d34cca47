use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::EventBusError;
use crate::publisher::EventPublisher;

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const POLL_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Broker endpoint configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("MQTT_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("MQTT_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1883),
            username: std::env::var("MQTT_USERNAME").ok(),
            password: std::env::var("MQTT_PASSWORD").ok(),
        }
    }

    pub(crate) fn mqtt_options(&self, client_id: &str, clean_session: bool) -> MqttOptions {
        let mut opts = MqttOptions::new(client_id, &self.host, self.port);
        opts.set_keep_alive(Duration::from_secs(30));
        opts.set_clean_session(clean_session);

        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            opts.set_credentials(user.clone(), pass.clone());
        }

        opts
    }
}

/// Polls until the broker acknowledges the connection, within
/// `CONNECT_TIMEOUT`. Any transport error before the acknowledgement is a
/// connect failure.
pub(crate) async fn await_connack(event_loop: &mut EventLoop) -> Result<(), EventBusError> {
    let wait = async {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => continue,
                Err(e) => return Err(EventBusError::Connect(e.to_string())),
            }
        }
    };

    match tokio::time::timeout(CONNECT_TIMEOUT, wait).await {
        Ok(res) => res,
        Err(_) => Err(EventBusError::Connect(format!(
            "no broker acknowledgement within {:?}",
            CONNECT_TIMEOUT
        ))),
    }
}

/// Owned handle to a long-lived publishing connection.
///
/// Opened once at service startup and shared by every publisher for the
/// process lifetime; publishes from concurrent callers are serialized
/// through the client's internal request channel. A background task drives
/// the transport event loop until the handle is closed.
pub struct BrokerConnection {
    client: AsyncClient,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

impl BrokerConnection {
    pub async fn connect(cfg: &BrokerConfig, client_id: &str) -> Result<Self, EventBusError> {
        // Publisher sessions carry no subscription state worth resuming.
        let opts = cfg.mqtt_options(client_id, true);
        let (client, mut event_loop) = AsyncClient::new(opts, 32);

        await_connack(&mut event_loop).await?;
        info!("broker connection established as '{}'", client_id);

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let driver = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        break;
                    }
                    ev = event_loop.poll() => {
                        if let Err(e) = ev {
                            warn!("broker poll error: {e}");
                            tokio::time::sleep(POLL_RETRY_DELAY).await;
                        }
                    }
                }
            }
        });

        Ok(Self {
            client,
            cancel,
            driver,
        })
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher::new(self.client.clone())
    }

    /// Shuts the connection down: client first, then the driver task,
    /// tolerating either being already gone.
    pub async fn close(self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("broker disconnect: {e}");
        }
        self.cancel.cancel();
        let _ = self.driver.await;
        info!("broker connection closed");
    }
}
