//! Event bus shared by the warmhouse services.
//!
//! Carries lifecycle events between the legacy sensor store and the device
//! registry over MQTT: JSON envelopes published at QoS 1 under per-domain
//! topic namespaces, consumed through persistent sessions with manual
//! acknowledgement. Delivery is at-least-once; consumers are expected to
//! apply events idempotently.

pub mod connection;
pub mod envelope;
pub mod error;
pub mod publisher;
pub mod subscriber;
pub mod topology;

pub use connection::{BrokerConfig, BrokerConnection};
pub use envelope::{DeviceEvent, EventKind, SensorEvent};
pub use error::EventBusError;
pub use publisher::{DeviceEventPublisher, EventPublisher, SensorEventPublisher};
pub use subscriber::{Disposition, EventHandler, Subscriber};
pub use topology::QueueSpec;
