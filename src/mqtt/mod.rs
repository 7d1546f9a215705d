//! # MQTT Integration Module
//!
//! Provides the broker side of mqttscope: one live session at a time, a desired
//! subscription set that survives reconnects, and a single ordered stream of events for
//! the console to consume.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Connect parameters, session tuning, QoS conversion
//! ├── error.rs            - Boundary and adapter errors
//! ├── message_manager.rs  - Immutable message record and payload decoding
//! ├── session_adapter.rs  - rumqttc session, event normalization, network worker
//! ├── subscriptions.rs    - Desired subscription set
//! └── mqtt_handler.rs     - Connection manager and state machine
//! ```
//!
//! ## Event Flow
//!
//! ```text
//! EventLoop task ──(epoch, SessionEvent)──► dispatcher ──MonitorEvent──► console
//!                                            │
//!                                            └─ ManagerState::apply (single lock)
//! ```
//!
//! Public operations on [`ConnectionManager`] never wait on the network. Configuration
//! mistakes are returned as [`MonitorError`]; everything else (refused connects, lost
//! connections, rejected publishes) shows up as [`MonitorEvent::Error`].
//!
//! Sessions are always opened with a clean session flag, so the broker keeps no state
//! between connections and the manager re-issues every subscription after each
//! successful connect.

pub mod config;
pub mod error;
pub mod message_manager;
pub mod mqtt_handler;
pub mod session_adapter;
pub mod subscriptions;

pub use config::{ConnectParams, MqttConfig};
pub use error::{AdapterError, MonitorError};
pub use message_manager::MqttMessage;
pub use mqtt_handler::{ConnectionManager, ConnectionState, MonitorEvent, MqttStatus};
pub use session_adapter::{SessionConnector, SessionEvent, SessionEventSink, SessionTransport};
pub use subscriptions::SubscriptionSet;
