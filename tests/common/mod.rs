#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mqttscope::mqtt::error::AdapterError;
use mqttscope::mqtt::session_adapter::{DisconnectReason, SessionEvent};
use mqttscope::mqtt::{
    ConnectParams, ConnectionManager, MonitorEvent, SessionConnector, SessionEventSink,
    SessionTransport,
};
use rumqttc::QoS;
use tokio::sync::mpsc;

/// Connector that records every wire request and keeps the event sink of each opened
/// session so tests can play the broker.
#[derive(Clone, Default)]
pub struct FakeBroker {
    requests: Arc<Mutex<Vec<String>>>,
    sinks: Arc<Mutex<Vec<SessionEventSink>>>,
    refuse: Arc<Mutex<bool>>,
    reject_requests: Arc<Mutex<bool>>,
}

impl FakeBroker {
    pub fn manager(&self) -> (ConnectionManager, mpsc::UnboundedReceiver<MonitorEvent>) {
        ConnectionManager::with_connector(Arc::new(self.clone()))
    }

    pub fn take_requests(&self) -> Vec<String> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }

    pub fn sessions_opened(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    pub fn refuse_sessions(&self) {
        *self.refuse.lock().unwrap() = true;
    }

    /// Live sessions fail every subscribe/unsubscribe/publish from now on.
    pub fn reject_requests(&self) {
        *self.reject_requests.lock().unwrap() = true;
    }

    fn check_request(&self) -> Result<(), AdapterError> {
        if *self.reject_requests.lock().unwrap() {
            Err(AdapterError::Closed)
        } else {
            Ok(())
        }
    }

    /// Emits `event` on the n-th opened session (0-based).
    pub fn emit_on(&self, session: usize, event: SessionEvent) {
        let sink = self.sinks.lock().unwrap()[session].clone();
        assert!(sink.emit(event), "manager dropped");
    }

    pub fn emit(&self, event: SessionEvent) {
        let last = self.sessions_opened() - 1;
        self.emit_on(last, event);
    }

    pub fn connack(&self) {
        self.emit(SessionEvent::Connected {
            session_present: false,
        });
    }

    pub fn drop_connection(&self, detail: &str) {
        self.emit(SessionEvent::Disconnected(DisconnectReason::unexpected(detail)));
    }

    fn record(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }
}

impl SessionConnector for FakeBroker {
    fn open(
        &self,
        params: &ConnectParams,
        events: SessionEventSink,
    ) -> Result<Box<dyn SessionTransport>, AdapterError> {
        if *self.refuse.lock().unwrap() {
            return Err(AdapterError::Setup("no route to host".into()));
        }
        self.record(format!("open {}", params.endpoint()));
        self.sinks.lock().unwrap().push(events.clone());
        Ok(Box::new(FakeSession {
            broker: self.clone(),
            events,
            closed: false,
        }))
    }
}

struct FakeSession {
    broker: FakeBroker,
    events: SessionEventSink,
    closed: bool,
}

impl SessionTransport for FakeSession {
    fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), AdapterError> {
        self.broker.check_request()?;
        self.broker.record(format!("sub {} {}", filter, qos as u8));
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<(), AdapterError> {
        self.broker.check_request()?;
        self.broker.record(format!("unsub {}", filter));
        Ok(())
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), AdapterError> {
        self.broker.check_request()?;
        self.broker.record(format!(
            "pub {} {} {} {}",
            topic,
            String::from_utf8_lossy(payload),
            qos as u8,
            retain
        ));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AdapterError> {
        self.broker.record("disconnect".into());
        // A well-behaved broker session reports the clean close.
        self.events
            .emit(SessionEvent::Disconnected(DisconnectReason::clean("Disconnected cleanly")));
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.closed {
            self.closed = true;
            self.broker.record("shutdown".into());
            // Mirrors the network worker, which reports its own cancellation.
            self.events
                .emit(SessionEvent::Disconnected(DisconnectReason::clean("Session closed")));
        }
    }
}

pub fn params() -> ConnectParams {
    ConnectParams {
        host: "broker.test".into(),
        ..ConnectParams::default()
    }
}

/// Next event, failing the test if none arrives soon.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<MonitorEvent>) -> MonitorEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Asserts nothing else is pending once the dispatcher has caught up.
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<MonitorEvent>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err(), "unexpected event pending");
}
