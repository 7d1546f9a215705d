use chrono::{DateTime, Local};
use rumqttc::Publish;

/// Immutable record of one received MQTT message.
///
/// Built once when the session adapter normalizes an inbound PUBLISH and owned by the
/// message store afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    received_at: DateTime<Local>,
    topic: String,
    payload: String,
    qos: u8,
    retain: bool,
}

impl MqttMessage {
    pub fn new(
        received_at: DateTime<Local>,
        topic: impl Into<String>,
        payload: impl Into<String>,
        qos: u8,
        retain: bool,
    ) -> Self {
        MqttMessage {
            received_at,
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        }
    }

    /// Normalizes an inbound publish, stamping it with the current wall clock.
    pub fn from_publish(publish: &Publish) -> Self {
        Self::from_raw(
            Local::now(),
            publish.topic.clone(),
            &publish.payload,
            publish.qos as u8,
            publish.retain,
        )
    }

    /// Invalid UTF-8 sequences are replaced with U+FFFD rather than dropping the message.
    pub fn from_raw(
        received_at: DateTime<Local>,
        topic: String,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Self {
        MqttMessage {
            received_at,
            topic,
            payload: decode_payload(payload),
            qos,
            retain,
        }
    }

    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn qos(&self) -> u8 {
        self.qos
    }

    pub fn retain(&self) -> bool {
        self.retain
    }

    /// ISO-8601 local timestamp with millisecond precision
    pub fn timestamp_iso(&self) -> String {
        self.received_at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    }

    /// Case-insensitive substring match against topic or payload. `needle` must already be
    /// lower-cased; an empty needle matches everything.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.topic.to_lowercase().contains(needle)
            || self.payload.to_lowercase().contains(needle)
    }
}

pub fn decode_payload(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}
