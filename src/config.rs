//! Persisted settings for mqttscope.
//!
//! A single TOML file at `~/.config/mqttscope/settings.toml`. Every section carries serde
//! defaults so a partial or older file still loads. Passwords are never written; the
//! console reads `MQTTSCOPE_PASSWORD` from the environment instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::mqtt::config::{ConnectParams, MqttConfig};
use crate::mqtt::subscriptions::SubscriptionSet;
use crate::store::DEFAULT_CAPACITY;

const CONFIG_DIR: &str = ".config/mqttscope";
const SETTINGS_FILE: &str = "settings.toml";

pub const PASSWORD_ENV: &str = "MQTTSCOPE_PASSWORD";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub subscriptions: Vec<SavedSubscription>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u32,
    pub client_id: String,
    pub username: String,
    pub keepalive_secs: u16,
    pub use_tls: bool,
    pub reconnect_delay_secs: u64,
    pub request_capacity: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            username: String::new(),
            keepalive_secs: 60,
            use_tls: false,
            reconnect_delay_secs: 3,
            request_capacity: 100,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Empty picks a timestamped name
    pub filename: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("logs"),
            filename: String::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    pub capacity: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SavedSubscription {
    pub filter: String,
    #[serde(default)]
    pub qos: u8,
}

impl MonitorSettings {
    pub fn default_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(SETTINGS_FILE);
        path
    }

    /// Loads the settings file, writing defaults first if it does not exist yet.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check settings file: {}", e))?
        {
            info!("No settings at {}, creating defaults", path.display());
            let settings = Self::default();
            settings.save_to(path).await?;
            return Ok(settings);
        }
        Self::load_from(path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read settings file {}: {}", path.display(), e))?;
        let settings: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse settings file {}: {}", path.display(), e))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize settings: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write settings file {}: {}", path.display(), e))?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn connect_params(&self, password: String) -> ConnectParams {
        ConnectParams {
            host: self.broker.host.clone(),
            port: self.broker.port,
            client_id: self.broker.client_id.clone(),
            username: self.broker.username.clone(),
            password,
            keepalive_secs: self.broker.keepalive_secs,
            use_tls: self.broker.use_tls,
        }
    }

    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            reconnect_delay: Duration::from_secs(self.broker.reconnect_delay_secs),
            request_capacity: self.broker.request_capacity.max(1),
        }
    }

    /// Replaces the saved subscription list with the manager's current set.
    pub fn remember_subscriptions(&mut self, subscriptions: &SubscriptionSet) {
        self.subscriptions = subscriptions
            .iter()
            .map(|(filter, qos)| SavedSubscription {
                filter: filter.to_string(),
                qos: qos as u8,
            })
            .collect();
    }

    /// Keeps host and port of the last `connect` so the next start uses them.
    pub fn remember_endpoint(&mut self, params: &ConnectParams) {
        self.broker.host = params.host.clone();
        self.broker.port = params.port;
    }
}

/// Password for the broker, from the environment only.
pub fn password_from_env() -> String {
    std::env::var(PASSWORD_ENV).unwrap_or_default()
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
