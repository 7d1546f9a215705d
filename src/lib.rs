//! mqttscope: a terminal monitor for MQTT brokers.
//!
//! The crate is split the same way the data flows:
//! - [`mqtt`] owns the broker session and turns client-library events into [`mqtt::MonitorEvent`]s
//! - [`store`] keeps a bounded, filterable message history with per-topic colours
//! - [`sink`] mirrors messages to a log file
//! - [`ui`] is the console loop tying them together
//! - [`config`] loads and saves `settings.toml`

pub mod config;
pub mod mqtt;
pub mod sink;
pub mod store;
pub mod ui;
