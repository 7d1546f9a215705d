use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::{qos_from_level, ConnectParams, MqttConfig};
use super::error::MonitorError;
use super::message_manager::MqttMessage;
use super::session_adapter::{
    RumqttConnector, SessionConnector, SessionEvent, SessionEventSink, SessionTransport,
};
use super::subscriptions::SubscriptionSet;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub endpoint: Option<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

/// Events delivered to the orchestrator, in the order they were raised.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Connected,
    Disconnected,
    Error(String),
    MessageArrived(MqttMessage),
}

struct ActiveSession {
    epoch: u64,
    transport: Box<dyn SessionTransport>,
}

/// Everything guarded by the manager's single lock.
#[derive(Default)]
struct ManagerState {
    status: MqttStatus,
    subscriptions: SubscriptionSet,
    session: Option<ActiveSession>,
    last_epoch: u64,
}

impl ManagerState {
    fn connection_state(&self) -> ConnectionState {
        self.status.connection_state
    }

    fn set_connection_state(&mut self, next: ConnectionState) {
        if self.status.connection_state != next {
            debug!(
                "Connection state {:?} -> {:?}",
                self.status.connection_state, next
            );
            self.status.connection_state = next;
        }
    }

    /// Shuts the active session down. Emits `Disconnected` if we were not already there.
    fn teardown(&mut self, out: &mut Vec<MonitorEvent>) {
        if let Some(mut session) = self.session.take() {
            info!("Tearing down session {}", session.epoch);
            session.transport.shutdown();
        }
        if self.connection_state() != ConnectionState::Disconnected {
            self.set_connection_state(ConnectionState::Disconnected);
            out.push(MonitorEvent::Disconnected);
        }
    }

    /// Single entry point for adapter-driven transitions.
    fn apply(&mut self, epoch: u64, event: SessionEvent) -> Vec<MonitorEvent> {
        let mut out = Vec::new();

        if self.session.as_ref().map(|s| s.epoch) != Some(epoch) {
            debug!("Dropping event of stale session {}: {:?}", epoch, event);
            return out;
        }

        match event {
            SessionEvent::Connected { .. } => {
                self.set_connection_state(ConnectionState::Connected);
                self.status.last_activity = Some(Local::now());
                info!("Connected to broker");
                out.push(MonitorEvent::Connected);
                self.replay_subscriptions(&mut out);
            }
            SessionEvent::Disconnected(reason) => {
                let was = self.connection_state();
                if reason.is_clean() {
                    info!("{}", reason.detail);
                    if let Some(mut session) = self.session.take() {
                        session.transport.shutdown();
                    }
                    self.status.endpoint = None;
                } else {
                    warn!("Disconnected unexpectedly: {}", reason.detail);
                    out.push(MonitorEvent::Error(reason.detail));
                }
                self.set_connection_state(ConnectionState::Disconnected);
                if was != ConnectionState::Disconnected {
                    out.push(MonitorEvent::Disconnected);
                }
            }
            SessionEvent::MessageArrived(message) => {
                self.status.messages_received += 1;
                self.status.last_activity = Some(message.received_at());
                debug!("Message on '{}' ({} bytes)", message.topic(), message.payload().len());
                out.push(MonitorEvent::MessageArrived(message));
            }
            SessionEvent::Error(detail) => {
                warn!("Session error: {}", detail);
                out.push(MonitorEvent::Error(detail));
            }
        }

        out
    }

    fn replay_subscriptions(&self, out: &mut Vec<MonitorEvent>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        for (filter, qos) in self.subscriptions.iter() {
            match session.transport.subscribe(filter, qos) {
                Ok(()) => info!("Re-subscribed to '{}' QoS={}", filter, qos as u8),
                Err(e) => out.push(MonitorEvent::Error(format!(
                    "Subscribe to '{}' failed: {}",
                    filter, e
                ))),
            }
        }
    }
}

/// Owns the single broker session, the desired subscriptions and the connection state
/// machine. Every public operation returns without waiting on the network; outcomes arrive
/// on the [`MonitorEvent`] receiver handed out at construction.
pub struct ConnectionManager {
    shared: Arc<Mutex<ManagerState>>,
    connector: Arc<dyn SessionConnector>,
    session_tx: mpsc::UnboundedSender<(u64, SessionEvent)>,
    events_tx: mpsc::UnboundedSender<MonitorEvent>,
    dispatcher: JoinHandle<()>,
}

impl ConnectionManager {
    /// Manager backed by `rumqttc`. Must be called inside a tokio runtime.
    pub fn new(config: MqttConfig) -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        Self::with_connector(Arc::new(RumqttConnector::new(config)))
    }

    pub fn with_connector(
        connector: Arc<dyn SessionConnector>,
    ) -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(ManagerState::default()));

        let dispatcher = tokio::spawn(run_dispatcher(
            shared.clone(),
            session_rx,
            events_tx.clone(),
        ));
        debug!("Connection manager dispatcher spawned");

        (
            Self {
                shared,
                connector,
                session_tx,
                events_tx,
                dispatcher,
            },
            events_rx,
        )
    }

    /// Replaces any existing session with a new one and starts connecting in the background.
    pub async fn connect(&self, params: ConnectParams) -> Result<(), MonitorError> {
        params.validate()?;

        let mut state = self.shared.lock().await;
        let mut out = Vec::new();
        state.teardown(&mut out);

        state.last_epoch += 1;
        let epoch = state.last_epoch;
        let sink = SessionEventSink::new(epoch, self.session_tx.clone());

        match self.connector.open(&params, sink) {
            Ok(transport) => {
                info!("Connecting to {} (session {})", params.endpoint(), epoch);
                state.session = Some(ActiveSession { epoch, transport });
                state.status.endpoint = Some(params.endpoint());
                state.set_connection_state(ConnectionState::Connecting);
            }
            Err(e) => {
                error!("Could not open session to {}: {}", params.endpoint(), e);
                out.push(MonitorEvent::Error(e.to_string()));
            }
        }

        self.forward(out);
        Ok(())
    }

    /// Requests a clean shutdown, or cancels a connect still in flight. Completion is a
    /// later `Disconnected` event.
    pub async fn disconnect(&self) {
        let mut state = self.shared.lock().await;
        let current = state.connection_state();
        let Some(session) = state.session.as_mut() else {
            debug!("Disconnect requested without an active session");
            return;
        };

        if current == ConnectionState::Connected {
            if let Err(e) = session.transport.disconnect() {
                warn!("Clean disconnect failed ({}), closing session", e);
                session.transport.shutdown();
            }
        } else {
            info!("Cancelling session {}", session.epoch);
            session.transport.shutdown();
        }
    }

    /// Records the subscription and, when connected, sends it right away.
    pub async fn subscribe(&self, filter: &str, qos: u8) -> Result<(), MonitorError> {
        let filter = filter.trim();
        if filter.is_empty() {
            return Err(MonitorError::EmptyTopicFilter);
        }
        let qos = qos_from_level(qos)?;

        let mut state = self.shared.lock().await;
        state.subscriptions.insert(filter, qos);

        if state.connection_state() != ConnectionState::Connected {
            debug!("Subscription to '{}' deferred until connected", filter);
            return Ok(());
        }
        if let Some(session) = state.session.as_ref() {
            match session.transport.subscribe(filter, qos) {
                Ok(()) => info!("Subscribed to '{}' QoS={}", filter, qos as u8),
                Err(e) => self.forward(vec![MonitorEvent::Error(format!(
                    "Subscribe to '{}' failed: {}",
                    filter, e
                ))]),
            }
        }
        Ok(())
    }

    /// Forgets the subscription. Returns whether it was known.
    pub async fn unsubscribe(&self, filter: &str) -> bool {
        let filter = filter.trim();
        let mut state = self.shared.lock().await;
        let known = state.subscriptions.remove(filter).is_some();

        if state.connection_state() == ConnectionState::Connected {
            if let Some(session) = state.session.as_ref() {
                match session.transport.unsubscribe(filter) {
                    Ok(()) => info!("Unsubscribed from '{}'", filter),
                    Err(e) => self.forward(vec![MonitorEvent::Error(format!(
                        "Unsubscribe from '{}' failed: {}",
                        filter, e
                    ))]),
                }
            }
        }
        known
    }

    /// Publishes when connected; otherwise reports an error event and sends nothing.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Result<(), MonitorError> {
        let qos = qos_from_level(qos)?;
        let mut state = self.shared.lock().await;

        let result = match state.session.as_ref() {
            Some(session) if state.connection_state() == ConnectionState::Connected => {
                session.transport.publish(topic, payload, qos, retain)
            }
            _ => {
                warn!("Publish to '{}' dropped: not connected", topic);
                self.forward(vec![MonitorEvent::Error(
                    "Cannot publish: not connected.".to_string(),
                )]);
                return Ok(());
            }
        };

        match result {
            Ok(()) => {
                state.status.messages_sent += 1;
                state.status.last_activity = Some(Local::now());
                info!(
                    "Published to '{}' QoS={} retain={}",
                    topic, qos as u8, retain
                );
            }
            Err(e) => self.forward(vec![MonitorEvent::Error(format!(
                "Publish failed ({}) on '{}'",
                e, topic
            ))]),
        }
        Ok(())
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.shared.lock().await.connection_state()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state().await == ConnectionState::Connected
    }

    pub async fn status(&self) -> MqttStatus {
        self.shared.lock().await.status.clone()
    }

    pub async fn subscriptions(&self) -> SubscriptionSet {
        self.shared.lock().await.subscriptions.clone()
    }

    fn forward(&self, events: Vec<MonitorEvent>) {
        forward_events(&self.events_tx, events);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.dispatcher.abort();
        if let Ok(mut state) = self.shared.try_lock() {
            if let Some(mut session) = state.session.take() {
                session.transport.shutdown();
            }
        }
    }
}

async fn run_dispatcher(
    shared: Arc<Mutex<ManagerState>>,
    mut session_rx: mpsc::UnboundedReceiver<(u64, SessionEvent)>,
    events_tx: mpsc::UnboundedSender<MonitorEvent>,
) {
    while let Some((epoch, event)) = session_rx.recv().await {
        // Forward under the lock so API-raised events cannot overtake transitions.
        let mut state = shared.lock().await;
        let out = state.apply(epoch, event);
        if !forward_events(&events_tx, out) {
            debug!("Event receiver dropped, dispatcher exiting");
            return;
        }
    }
}

fn forward_events(tx: &mpsc::UnboundedSender<MonitorEvent>, events: Vec<MonitorEvent>) -> bool {
    for event in events {
        if tx.send(event).is_err() {
            return false;
        }
    }
    true
}
