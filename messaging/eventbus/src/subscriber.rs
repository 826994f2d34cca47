use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Packet, QoS};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::{await_connack, BrokerConfig, POLL_RETRY_DELAY};
use crate::error::EventBusError;
use crate::topology::QueueSpec;

/// Consumer-side processing of one inbound envelope.
///
/// Implementations must be idempotent: delivery is at-least-once and a
/// redelivered envelope will reach the handler again. A returned error is
/// treated as transient and causes redelivery; permanent conditions
/// (unknown event type, missing local counterpart) must be handled inside
/// the implementation as logged successes.
#[async_trait]
pub trait EventHandler: Send + Sync {
    type Event: DeserializeOwned + Send;

    async fn handle(&self, event: Self::Event) -> anyhow::Result<()>;
}

/// Acknowledgement decision for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; acknowledge.
    Ack,
    /// Poison message (undecodable body); acknowledge and drop so it never
    /// loops.
    Discard,
    /// Transient handler failure; leave unacknowledged so the broker
    /// redelivers it on session resume.
    Requeue,
}

/// What the session loop does after deciding one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStep {
    /// Acknowledge and keep consuming on the current connection.
    AckAndContinue,
    /// Drop the connection so the broker resumes the persistent session
    /// and redelivers everything left unacknowledged.
    Resume,
}

fn step_for(disposition: Disposition) -> SessionStep {
    match disposition {
        Disposition::Ack | Disposition::Discard => SessionStep::AckAndContinue,
        Disposition::Requeue => SessionStep::Resume,
    }
}

/// How a consuming session ended.
enum SessionEnd {
    Cancelled,
    Resume,
}

/// Decode, dispatch, decide. Decode failures are never retried; handler
/// failures are.
async fn process_delivery<H: EventHandler>(handler: &H, payload: &[u8]) -> Disposition {
    let event = match serde_json::from_slice::<H::Event>(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!("dropping undecodable event payload: {e}");
            return Disposition::Discard;
        }
    };

    match handler.handle(event).await {
        Ok(()) => Disposition::Ack,
        Err(e) => {
            warn!("event handler failed, leaving for redelivery: {e:#}");
            Disposition::Requeue
        }
    }
}

/// Delay between dropping a session after a requeue and resuming it, so a
/// persistently failing handler cannot hot-loop against the broker.
const RESUME_DELAY: Duration = Duration::from_secs(1);

/// Consuming loop for one named queue.
///
/// Opens a persistent session under the queue name, subscribes its
/// wildcard bindings at QoS 1 with manual acks, and processes deliveries
/// one at a time until cancelled. A requeued delivery forces a session
/// resume: the broker only redelivers unacknowledged QoS 1 messages when
/// the session reconnects, so the loop drops the connection and comes
/// back under the same client id after a short delay. Per-entity ordering
/// is not guaranteed across redeliveries: a failed delivery resumes
/// behind whatever arrived after it.
pub struct Subscriber<H: EventHandler> {
    cfg: BrokerConfig,
    queue: QueueSpec,
    handler: Arc<H>,
}

impl<H: EventHandler> Subscriber<H> {
    pub fn new(cfg: BrokerConfig, queue: QueueSpec, handler: Arc<H>) -> Self {
        Self {
            cfg,
            queue,
            handler,
        }
    }

    /// Runs until `cancel` fires or the topology declaration is rejected.
    ///
    /// The first connect failure is an error the owning service may treat
    /// as degraded mode. After a successful start, transport errors and
    /// session resumes are retried in place; unacknowledged in-flight
    /// deliveries stay with the broker.
    pub async fn start_listening(self, cancel: CancellationToken) -> Result<(), EventBusError> {
        let mut connected_once = false;

        loop {
            match self.run_session(&cancel).await {
                Ok(SessionEnd::Cancelled) => return Ok(()),
                Ok(SessionEnd::Resume) => {
                    connected_once = true;
                    info!("queue '{}' resuming session for redelivery", self.queue.name);
                }
                Err(e) if !connected_once => return Err(e),
                Err(e) => warn!("queue '{}' session failed: {e}", self.queue.name),
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("queue '{}' stopping", self.queue.name);
                    return Ok(());
                }
                _ = tokio::time::sleep(RESUME_DELAY) => {}
            }
        }
    }

    /// One consuming session: connect, declare bindings, process
    /// deliveries until cancellation or a requeue forces a resume.
    async fn run_session(&self, cancel: &CancellationToken) -> Result<SessionEnd, EventBusError> {
        let mut opts = self.cfg.mqtt_options(&self.queue.name, false);
        opts.set_manual_acks(true);

        let (client, mut event_loop) = AsyncClient::new(opts, 64);
        await_connack(&mut event_loop).await?;

        // Repeatable on resume: the persistent session keeps its
        // subscriptions, and re-subscribing with the same filters is a
        // no-op on the broker side.
        for binding in &self.queue.bindings {
            client
                .subscribe(binding.clone(), QoS::AtLeastOnce)
                .await
                .map_err(|e| EventBusError::Declare(format!("bind '{binding}': {e}")))?;
        }

        info!(
            "queue '{}' listening on {:?}",
            self.queue.name, self.queue.bindings
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("queue '{}' stopping", self.queue.name);
                    let _ = client.disconnect().await;
                    return Ok(SessionEnd::Cancelled);
                }
                ev = event_loop.poll() => {
                    match ev {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let disposition =
                                process_delivery(self.handler.as_ref(), &publish.payload).await;
                            match step_for(disposition) {
                                SessionStep::AckAndContinue => {
                                    if let Err(e) = client.ack(&publish).await {
                                        warn!("ack failed on '{}': {e}", publish.topic);
                                    }
                                }
                                SessionStep::Resume => {
                                    // Left unacked; the broker redelivers
                                    // it once this session reconnects.
                                    let _ = client.disconnect().await;
                                    return Ok(SessionEnd::Resume);
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("queue '{}' poll error: {e}", self.queue.name);
                            tokio::time::sleep(POLL_RETRY_DELAY).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::envelope::SensorEvent;

    struct CountingHandler {
        handled: AtomicUsize,
        fail: bool,
    }

    impl CountingHandler {
        fn new(fail: bool) -> Self {
            Self {
                handled: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        type Event = SensorEvent;

        async fn handle(&self, _event: SensorEvent) -> anyhow::Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            Ok(())
        }
    }

    fn sample_payload() -> Vec<u8> {
        serde_json::to_vec(&SensorEvent::new(
            crate::envelope::EventKind::Created,
            1,
            "Hall",
            "temperature",
            "hallway",
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn successful_handling_is_acked() {
        let handler = CountingHandler::new(false);
        let d = process_delivery(&handler, &sample_payload()).await;
        assert_eq!(d, Disposition::Ack);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_failure_is_requeued() {
        let handler = CountingHandler::new(true);
        let d = process_delivery(&handler, &sample_payload()).await;
        assert_eq!(d, Disposition::Requeue);
    }

    #[tokio::test]
    async fn malformed_payload_is_discarded_not_requeued() {
        let handler = CountingHandler::new(false);
        let d = process_delivery(&handler, b"not json at all").await;
        assert_eq!(d, Disposition::Discard);
        // The handler never saw it.
        assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_shape_json_is_discarded() {
        let handler = CountingHandler::new(false);
        let d = process_delivery(&handler, br#"{"event_id": 5}"#).await;
        assert_eq!(d, Disposition::Discard);
    }

    #[tokio::test]
    async fn handler_failure_forces_session_resume() {
        // Redelivery of an unacked QoS 1 message only happens when the
        // session reconnects, so a requeued delivery must end the current
        // session instead of keeping the connection alive.
        let handler = CountingHandler::new(true);
        let d = process_delivery(&handler, &sample_payload()).await;
        assert_eq!(step_for(d), SessionStep::Resume);
    }

    #[tokio::test]
    async fn ack_and_discard_keep_the_session() {
        let handler = CountingHandler::new(false);

        let d = process_delivery(&handler, &sample_payload()).await;
        assert_eq!(step_for(d), SessionStep::AckAndContinue);

        let d = process_delivery(&handler, b"not json at all").await;
        assert_eq!(step_for(d), SessionStep::AckAndContinue);
    }
}
