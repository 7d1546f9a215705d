use std::time::Duration;

use chrono::Local;
use rumqttc::{MqttOptions, QoS, Transport};
use tracing::{debug, warn};

use super::error::MonitorError;

/// Smallest keep alive interval the client library accepts besides zero.
const MIN_KEEP_ALIVE_SECS: u16 = 5;

/// Parameters of a single `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u32,
    /// Empty means "generate one"
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub keepalive_secs: u16,
    pub use_tls: bool,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            username: String::new(),
            password: String::new(),
            keepalive_secs: 60,
            use_tls: false,
        }
    }
}

impl ConnectParams {
    /// Rejects parameters that can never produce a session.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.host.trim().is_empty() {
            return Err(MonitorError::EmptyHost);
        }
        if self.port == 0 || self.port > u16::MAX as u32 {
            return Err(MonitorError::InvalidPort(self.port));
        }
        Ok(())
    }

    /// `host:port`, for status lines
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host.trim(), self.port)
    }

    /// Builds the client options for these parameters. Clean sessions are always requested.
    pub fn mqtt_options(&self) -> Result<MqttOptions, MonitorError> {
        self.validate()?;
        let port = u16::try_from(self.port).map_err(|_| MonitorError::InvalidPort(self.port))?;

        let client_id = if self.client_id.trim().is_empty() {
            generated_client_id()
        } else {
            self.client_id.trim().to_string()
        };

        let keepalive = if self.keepalive_secs != 0 && self.keepalive_secs < MIN_KEEP_ALIVE_SECS {
            warn!(
                "Keep alive of {}s is too short, using {}s",
                self.keepalive_secs, MIN_KEEP_ALIVE_SECS
            );
            MIN_KEEP_ALIVE_SECS
        } else {
            self.keepalive_secs
        };

        let mut options = MqttOptions::new(client_id, self.host.trim(), port);
        options
            .set_keep_alive(Duration::from_secs(keepalive as u64))
            .set_clean_session(true);

        if !self.username.is_empty() {
            options.set_credentials(self.username.clone(), self.password.clone());
        }

        if self.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        debug!("Built MQTT options for {}", self.endpoint());
        Ok(options)
    }
}

/// Session-level tuning shared by every connection the manager opens.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    /// Pause between a failed poll and the next reconnect attempt
    pub reconnect_delay: Duration,
    /// Capacity of the client's request queue
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            request_capacity: 100,
        }
    }
}

/// Converts a numeric QoS level into the protocol type.
pub fn qos_from_level(level: u8) -> Result<QoS, MonitorError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MonitorError::InvalidQos(other)),
    }
}

fn generated_client_id() -> String {
    format!(
        "mqttscope-{}-{}",
        std::process::id(),
        Local::now().timestamp_millis() % 100_000
    )
}
