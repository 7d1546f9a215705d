//! # Protocol Session Adapter
//!
//! Wraps one `rumqttc` session (`AsyncClient` + `EventLoop`) and turns everything the event
//! loop produces into four canonical [`SessionEvent`]s:
//!
//! ```text
//! EventLoop::poll ──► normalize_event / normalize_connection_error ──► SessionEventSink
//!                                                                        (epoch tagged)
//! ```
//!
//! Connect acknowledgements may show up as a bare numeric reason code or as the
//! structured `ConnectReturnCode`; both collapse into a [`ConnectOutcome`]. Disconnects are
//! classified as [`DisconnectKind::Clean`] (we asked for it) or
//! [`DisconnectKind::Unexpected`] (broker or transport ended it).
//!
//! The adapter never buffers. A session whose first connect fails reports an unexpected
//! disconnect and stops; the caller decides whether to `connect` again. Once a session has
//! been acknowledged, a dropped transport is re-established by polling again after
//! `reconnect_delay`, which is how `rumqttc` reconnects.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use statum::{machine, state};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{ConnectParams, MqttConfig};
use super::error::AdapterError;
use super::message_manager::MqttMessage;

/// Canonical events raised by a protocol session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected { session_present: bool },
    Disconnected(DisconnectReason),
    MessageArrived(MqttMessage),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectKind {
    /// Requested by the caller (outgoing DISCONNECT or session cancellation)
    Clean,
    /// Broker DISCONNECT, refused connect or transport failure
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub kind: DisconnectKind,
    pub detail: String,
}

impl DisconnectReason {
    pub fn clean(detail: impl Into<String>) -> Self {
        Self {
            kind: DisconnectKind::Clean,
            detail: detail.into(),
        }
    }

    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self {
            kind: DisconnectKind::Unexpected,
            detail: detail.into(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.kind == DisconnectKind::Clean
    }
}

/// The two shapes a connect acknowledgement can take.
///
/// The v4 `rumqttc` client only ever yields [`ConnAckReason::ReturnCode`]; `Code` covers bare
/// numeric codes (MQTT 5 reason codes included) and is only built by tests today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnAckReason {
    /// Raw reason code (MQTT 3.1.1 return codes 0-5, MQTT 5 reason codes >= 0x80)
    Code(u8),
    ReturnCode(ConnectReturnCode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub success: bool,
    pub reason: String,
}

pub fn normalize_connack(reason: ConnAckReason) -> ConnectOutcome {
    let code = match reason {
        ConnAckReason::Code(code) => code,
        ConnAckReason::ReturnCode(code) => code as u8,
    };
    ConnectOutcome {
        success: code == 0,
        reason: reason_code_text(code).to_string(),
    }
}

fn reason_code_text(code: u8) -> &'static str {
    match code {
        0 => "Connection accepted",
        1 => "Connection refused - unacceptable protocol version",
        2 => "Connection refused - identifier rejected",
        3 => "Connection refused - server unavailable",
        4 => "Connection refused - bad user name or password",
        5 => "Connection refused - not authorised",
        0x80 => "Unspecified error",
        0x81 => "Malformed packet",
        0x82 => "Protocol error",
        0x83 => "Implementation specific error",
        0x84 => "Unsupported protocol version",
        0x85 => "Client identifier not valid",
        0x86 => "Bad user name or password",
        0x87 => "Not authorized",
        0x88 => "Server unavailable",
        0x89 => "Server busy",
        0x8A => "Banned",
        0x8C => "Bad authentication method",
        0x90 => "Topic name invalid",
        0x95 => "Packet too large",
        0x97 => "Quota exceeded",
        0x99 => "Payload format invalid",
        0x9A => "Retain not supported",
        0x9B => "QoS not supported",
        0x9C => "Use another server",
        0x9D => "Server moved",
        0x9F => "Connection rate exceeded",
        _ => "Unknown reason code",
    }
}

/// Maps one event loop notification to a canonical event, or `None` for protocol chatter
/// (pings, acks, outgoing requests) the manager does not care about.
pub fn normalize_event(event: Event) -> Option<SessionEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            let outcome = normalize_connack(ConnAckReason::ReturnCode(ack.code));
            if outcome.success {
                Some(SessionEvent::Connected {
                    session_present: ack.session_present,
                })
            } else {
                Some(SessionEvent::Disconnected(DisconnectReason::unexpected(
                    outcome.reason,
                )))
            }
        }
        Event::Incoming(Packet::Publish(publish)) => {
            Some(SessionEvent::MessageArrived(MqttMessage::from_publish(&publish)))
        }
        Event::Incoming(Packet::SubAck(suback)) => {
            let rejected = suback
                .return_codes
                .iter()
                .filter(|code| matches!(code, SubscribeReasonCode::Failure))
                .count();
            (rejected > 0).then(|| {
                SessionEvent::Error(format!(
                    "Broker rejected {} subscription(s) (packet {})",
                    rejected, suback.pkid
                ))
            })
        }
        Event::Incoming(Packet::Disconnect) => Some(SessionEvent::Disconnected(
            DisconnectReason::unexpected("Broker closed the session"),
        )),
        Event::Outgoing(Outgoing::Disconnect) => Some(SessionEvent::Disconnected(
            DisconnectReason::clean("Disconnected cleanly"),
        )),
        other => {
            debug!("Ignoring protocol event: {:?}", other);
            None
        }
    }
}

pub fn normalize_connection_error(error: &ConnectionError) -> DisconnectReason {
    match error {
        ConnectionError::ConnectionRefused(code) => DisconnectReason::unexpected(
            normalize_connack(ConnAckReason::ReturnCode(*code)).reason,
        ),
        other => DisconnectReason::unexpected(other.to_string()),
    }
}

/// Sending half handed to a session; every event is tagged with the session's epoch so the
/// manager can drop events of sessions it already tore down.
#[derive(Debug, Clone)]
pub struct SessionEventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, SessionEvent)>,
}

impl SessionEventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<(u64, SessionEvent)>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns `false` once the receiving side is gone.
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx.send((self.epoch, event)).is_ok()
    }
}

/// Wire-level requests of one live session. All calls are non-blocking.
pub trait SessionTransport: Send {
    fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), AdapterError>;
    fn unsubscribe(&self, filter: &str) -> Result<(), AdapterError>;
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool)
        -> Result<(), AdapterError>;
    /// Requests a clean protocol disconnect
    fn disconnect(&self) -> Result<(), AdapterError>;
    /// Stops the session's network loop. Idempotent.
    fn shutdown(&mut self);
}

/// Opens sessions. The manager owns exactly one connector.
pub trait SessionConnector: Send + Sync {
    fn open(
        &self,
        params: &ConnectParams,
        events: SessionEventSink,
    ) -> Result<Box<dyn SessionTransport>, AdapterError>;
}

// Worker lifecycle
#[state]
#[derive(Debug, Clone)]
pub enum WorkerState {
    Configured,
    Polling,
}

#[machine]
pub struct SessionWorker<S: WorkerState> {
    event_loop: EventLoop,
    events: SessionEventSink,
    reconnect_delay: Duration,
    cancel: CancellationToken,
    connected: bool,
    /// Set by the first successful CONNACK. Only established sessions reconnect.
    established: bool,
}

impl SessionWorker<Configured> {
    pub fn create(
        event_loop: EventLoop,
        events: SessionEventSink,
        reconnect_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        debug!("Creating session worker for epoch {}", events.epoch());
        Self::new(event_loop, events, reconnect_delay, cancel, false, false)
    }

    pub fn start(self) -> SessionWorker<Polling> {
        info!("Session worker {} starting to poll", self.events.epoch());
        self.transition()
    }
}

impl SessionWorker<Polling> {
    /// Drives the event loop until cancelled, cleanly disconnected, the first connect fails,
    /// or the receiver is gone. Once established, a lost connection is retried after
    /// `reconnect_delay`.
    pub async fn run_poll_loop(mut self) {
        let epoch = self.events.epoch();

        loop {
            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.emit_closed();
                    break;
                }
                polled = self.event_loop.poll() => polled,
            };

            match polled {
                Ok(event) => {
                    let Some(normalized) = normalize_event(event) else {
                        continue;
                    };

                    let finished = match &normalized {
                        SessionEvent::Connected { session_present } => {
                            info!(
                                "Session {} connected (session present: {})",
                                epoch, session_present
                            );
                            self.connected = true;
                            self.established = true;
                            false
                        }
                        SessionEvent::Disconnected(reason) => {
                            self.connected = false;
                            reason.is_clean() || !self.established
                        }
                        _ => false,
                    };

                    if !self.events.emit(normalized) {
                        warn!("Event receiver dropped, stopping session {}", epoch);
                        break;
                    }
                    if finished {
                        info!("Session {} disconnected cleanly", epoch);
                        break;
                    }
                }
                Err(connection_error) => {
                    let reason = normalize_connection_error(&connection_error);
                    if self.connected {
                        warn!("Session {} lost its connection: {}", epoch, reason.detail);
                    } else {
                        warn!("Session {} failed to connect: {}", epoch, reason.detail);
                    }
                    self.connected = false;

                    if !self.events.emit(SessionEvent::Disconnected(reason)) {
                        warn!("Event receiver dropped, stopping session {}", epoch);
                        break;
                    }
                    if !self.established {
                        info!("Session {} never connected, giving up", epoch);
                        break;
                    }

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.emit_closed();
                            break;
                        }
                        _ = tokio::time::sleep(self.reconnect_delay) => {
                            debug!("Session {} retrying connection", epoch);
                        }
                    }
                }
            }
        }

        info!("Session worker {} stopped", epoch);
    }

    fn emit_closed(&self) {
        self.events
            .emit(SessionEvent::Disconnected(DisconnectReason::clean("Session closed")));
    }
}

/// Connector backed by `rumqttc`.
#[derive(Debug, Clone, Default)]
pub struct RumqttConnector {
    config: MqttConfig,
}

impl RumqttConnector {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }
}

impl SessionConnector for RumqttConnector {
    fn open(
        &self,
        params: &ConnectParams,
        events: SessionEventSink,
    ) -> Result<Box<dyn SessionTransport>, AdapterError> {
        let options = params
            .mqtt_options()
            .map_err(|e| AdapterError::Setup(e.to_string()))?;
        let (client, event_loop) = AsyncClient::new(options, self.config.request_capacity);

        let cancel = CancellationToken::new();
        let worker = SessionWorker::create(
            event_loop,
            events,
            self.config.reconnect_delay,
            cancel.clone(),
        )
        .start();
        let task = tokio::spawn(worker.run_poll_loop());

        Ok(Box::new(RumqttTransport {
            client,
            cancel,
            task: Some(task),
        }))
    }
}

pub struct RumqttTransport {
    client: AsyncClient,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionTransport for RumqttTransport {
    fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), AdapterError> {
        self.client.try_subscribe(filter, qos)?;
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<(), AdapterError> {
        self.client.try_unsubscribe(filter)?;
        Ok(())
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), AdapterError> {
        self.client
            .try_publish(topic, qos, retain, payload.to_vec())?;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AdapterError> {
        if self.task.as_ref().is_some_and(|task| task.is_finished()) {
            return Err(AdapterError::Closed);
        }
        self.client.try_disconnect()?;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if task.is_finished() {
                debug!("Session task already finished");
            } else {
                debug!("Session task cancelled");
            }
        }
    }
}

impl Drop for RumqttTransport {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            warn!("Session transport dropped without shutdown, cancelling");
            self.cancel.cancel();
        }
    }
}
