//! Error types for the MQTT connection layer

use thiserror::Error;

/// Errors rejected synchronously at the connection manager boundary.
///
/// Everything that happens on the wire after a call returns is reported through
/// [`MonitorEvent::Error`](super::mqtt_handler::MonitorEvent) instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Port outside of 1..=65535
    #[error("Invalid port {0}: must be between 1 and 65535")]
    InvalidPort(u32),

    #[error("Broker host must not be empty")]
    EmptyHost,

    #[error("Invalid QoS {0}: must be 0, 1 or 2")]
    InvalidQos(u8),

    #[error("Topic filter must not be empty")]
    EmptyTopicFilter,
}

/// Errors raised by a protocol session while opening it or submitting requests.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The request queue of the client rejected the request (full or closed)
    #[error("request rejected: {0}")]
    Request(#[from] rumqttc::ClientError),

    /// The session could not be constructed
    #[error("session setup failed: {0}")]
    Setup(String),

    /// The session has already been shut down
    #[error("session closed")]
    Closed,
}
