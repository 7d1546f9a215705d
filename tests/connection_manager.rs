mod common;

use chrono::Local;
use common::{assert_quiet, next_event, params, FakeBroker};
use mqttscope::mqtt::session_adapter::SessionEvent;
use mqttscope::mqtt::{ConnectParams, ConnectionState, MonitorError, MonitorEvent, MqttMessage};

#[tokio::test]
async fn subscriptions_are_replayed_on_every_reconnect() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();

    manager.subscribe("a/#", 1).await.unwrap();
    manager.subscribe("b/+", 0).await.unwrap();
    assert!(broker.take_requests().is_empty(), "subscribe must wait for a session");

    manager.connect(params()).await.unwrap();
    assert_eq!(manager.connection_state().await, ConnectionState::Connecting);
    assert_eq!(broker.take_requests(), vec!["open broker.test:1883"]);

    broker.connack();
    assert_eq!(next_event(&mut events).await, MonitorEvent::Connected);
    assert_eq!(broker.take_requests(), vec!["sub a/# 1", "sub b/+ 0"]);

    for _ in 0..3 {
        broker.drop_connection("connection reset by peer");
        assert_eq!(
            next_event(&mut events).await,
            MonitorEvent::Error("connection reset by peer".into())
        );
        assert_eq!(next_event(&mut events).await, MonitorEvent::Disconnected);
        assert_eq!(manager.connection_state().await, ConnectionState::Disconnected);

        broker.connack();
        assert_eq!(next_event(&mut events).await, MonitorEvent::Connected);
        assert_eq!(broker.take_requests(), vec!["sub a/# 1", "sub b/+ 0"]);
    }

    assert_eq!(broker.sessions_opened(), 1);
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn publish_without_connection_reports_error() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();

    manager.publish("x", b"y", 0, false).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::Error("Cannot publish: not connected.".into())
    );
    assert!(broker.take_requests().is_empty());
    assert_eq!(manager.status().await.messages_sent, 0);
}

#[tokio::test]
async fn invalid_parameters_are_rejected_synchronously() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();

    let zero_port = ConnectParams {
        port: 0,
        ..params()
    };
    assert_eq!(
        manager.connect(zero_port).await,
        Err(MonitorError::InvalidPort(0))
    );
    let huge_port = ConnectParams {
        port: 70_000,
        ..params()
    };
    assert_eq!(
        manager.connect(huge_port).await,
        Err(MonitorError::InvalidPort(70_000))
    );
    let no_host = ConnectParams {
        host: "  ".into(),
        ..params()
    };
    assert_eq!(manager.connect(no_host).await, Err(MonitorError::EmptyHost));

    assert_eq!(
        manager.subscribe(" ", 0).await,
        Err(MonitorError::EmptyTopicFilter)
    );
    assert_eq!(
        manager.subscribe("a", 3).await,
        Err(MonitorError::InvalidQos(3))
    );
    assert_eq!(
        manager.publish("a", b"", 5, false).await,
        Err(MonitorError::InvalidQos(5))
    );

    assert_eq!(broker.sessions_opened(), 0);
    assert!(manager.subscriptions().await.is_empty());
    assert_eq!(manager.connection_state().await, ConnectionState::Disconnected);
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn live_session_sends_requests_immediately() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();
    manager.connect(params()).await.unwrap();
    broker.connack();
    assert_eq!(next_event(&mut events).await, MonitorEvent::Connected);
    broker.take_requests();

    manager.subscribe("c/d", 2).await.unwrap();
    manager.publish("c/d", b"hello", 1, true).await.unwrap();
    assert!(manager.unsubscribe("c/d").await);
    assert!(!manager.unsubscribe("never/seen").await);

    assert_eq!(
        broker.take_requests(),
        vec![
            "sub c/d 2",
            "pub c/d hello 1 true",
            "unsub c/d",
            "unsub never/seen"
        ]
    );
    let status = manager.status().await;
    assert_eq!(status.messages_sent, 1);
    assert_eq!(status.endpoint.as_deref(), Some("broker.test:1883"));
}

#[tokio::test]
async fn unsubscribed_filters_are_not_replayed() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();
    manager.subscribe("a/#", 1).await.unwrap();
    manager.subscribe("b/+", 0).await.unwrap();
    assert!(manager.unsubscribe("a/#").await);

    manager.connect(params()).await.unwrap();
    broker.connack();
    assert_eq!(next_event(&mut events).await, MonitorEvent::Connected);
    assert_eq!(broker.take_requests(), vec!["open broker.test:1883", "sub b/+ 0"]);
}

#[tokio::test]
async fn events_of_replaced_sessions_are_ignored() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();

    manager.connect(params()).await.unwrap();
    manager
        .connect(ConnectParams {
            port: 1884,
            ..params()
        })
        .await
        .unwrap();
    // Replacing a connecting session reports the teardown.
    assert_eq!(next_event(&mut events).await, MonitorEvent::Disconnected);
    assert_eq!(
        broker.take_requests(),
        vec!["open broker.test:1883", "shutdown", "open broker.test:1884"]
    );

    broker.emit_on(
        0,
        SessionEvent::Connected {
            session_present: false,
        },
    );
    broker.emit_on(
        0,
        SessionEvent::MessageArrived(MqttMessage::new(Local::now(), "old", "x", 0, false)),
    );
    assert_quiet(&mut events).await;
    assert_eq!(manager.connection_state().await, ConnectionState::Connecting);

    broker.emit_on(
        1,
        SessionEvent::Connected {
            session_present: false,
        },
    );
    assert_eq!(next_event(&mut events).await, MonitorEvent::Connected);
    assert_eq!(manager.status().await.messages_received, 0);
}

#[tokio::test]
async fn disconnect_cancels_pending_connect() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();

    manager.connect(params()).await.unwrap();
    manager.disconnect().await;

    assert_eq!(next_event(&mut events).await, MonitorEvent::Disconnected);
    assert_eq!(manager.connection_state().await, ConnectionState::Disconnected);
    assert_eq!(
        broker.take_requests(),
        vec!["open broker.test:1883", "shutdown"]
    );

    // A late acknowledgement of the cancelled session changes nothing.
    broker.connack();
    assert_quiet(&mut events).await;
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn clean_disconnect_releases_the_session() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();
    manager.connect(params()).await.unwrap();
    broker.connack();
    assert_eq!(next_event(&mut events).await, MonitorEvent::Connected);
    broker.take_requests();

    manager.disconnect().await;
    assert_eq!(next_event(&mut events).await, MonitorEvent::Disconnected);
    assert_eq!(broker.take_requests(), vec!["disconnect", "shutdown"]);
    assert_eq!(manager.status().await.endpoint, None);

    manager.publish("x", b"y", 0, false).await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::Error("Cannot publish: not connected.".into())
    );
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn messages_are_forwarded_in_order() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();
    manager.connect(params()).await.unwrap();
    broker.connack();
    assert_eq!(next_event(&mut events).await, MonitorEvent::Connected);

    for i in 0..5 {
        let message = MqttMessage::new(Local::now(), format!("t/{i}"), "p", 0, false);
        broker.emit(SessionEvent::MessageArrived(message));
    }
    for i in 0..5 {
        match next_event(&mut events).await {
            MonitorEvent::MessageArrived(message) => assert_eq!(message.topic(), format!("t/{i}")),
            other => panic!("unexpected event {other:?}"),
        }
    }
    let status = manager.status().await;
    assert_eq!(status.messages_received, 5);
    assert!(status.last_activity.is_some());
}

#[tokio::test]
async fn failed_session_setup_is_an_error_event() {
    let broker = FakeBroker::default();
    broker.refuse_sessions();
    let (manager, mut events) = broker.manager();

    manager.connect(params()).await.unwrap();
    match next_event(&mut events).await {
        MonitorEvent::Error(detail) => assert!(detail.contains("no route to host")),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(manager.connection_state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn rejected_requests_while_connected_name_the_topic() {
    let broker = FakeBroker::default();
    let (manager, mut events) = broker.manager();
    manager.connect(params()).await.unwrap();
    broker.connack();
    assert_eq!(next_event(&mut events).await, MonitorEvent::Connected);
    broker.take_requests();
    broker.reject_requests();

    manager.publish("x", b"y", 1, false).await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::Error("Publish failed (session closed) on 'x'".into())
    );

    manager.subscribe("s/#", 0).await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        MonitorEvent::Error("Subscribe to 's/#' failed: session closed".into())
    );

    assert!(broker.take_requests().is_empty());
    assert_eq!(manager.status().await.messages_sent, 0);
    // The filter is still wanted and will be replayed on the next session.
    assert!(manager.subscriptions().await.contains("s/#"));
    assert!(manager.is_connected().await);
}
