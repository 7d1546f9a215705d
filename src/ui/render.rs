use std::borrow::Cow;

use crate::mqtt::message_manager::MqttMessage;
use crate::mqtt::mqtt_handler::{ConnectionState, MqttStatus};
use crate::store::{MessageStore, TopicColor};

/// Payload cells longer than this are shortened in list rows.
pub const MAX_PAYLOAD_CHARS: usize = 120;
const TRUNCATED_CHARS: usize = MAX_PAYLOAD_CHARS - 3;

/// One list row: `row  HH:MM:SS.mmm  Q  R  topic  payload`.
pub fn format_row(
    row: usize,
    message: &MqttMessage,
    color: Option<TopicColor>,
    ansi: bool,
) -> String {
    let topic = match color {
        Some(color) if ansi => paint(message.topic(), color),
        _ => message.topic().to_string(),
    };
    format!(
        "{:>5}  {}  {}  {}  {}  {}",
        row,
        message.received_at().format("%H:%M:%S%.3f"),
        message.qos(),
        if message.retain() { "R" } else { " " },
        topic,
        truncate_payload(message.payload())
    )
}

/// Single-line payload, cut to 117 characters plus an ellipsis when too long.
pub fn truncate_payload(payload: &str) -> Cow<'_, str> {
    let flat: Cow<'_, str> = if payload.contains(['\r', '\n']) {
        Cow::Owned(payload.replace("\r\n", " ").replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(payload)
    };

    if flat.chars().count() <= MAX_PAYLOAD_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(TRUNCATED_CHARS).collect();
    cut.push('…');
    Cow::Owned(cut)
}

/// Full view of one message. JSON payloads are pretty-printed with two-space indentation.
pub fn format_detail(message: &MqttMessage) -> String {
    format!(
        "Topic: {}\nTime: {}\nQoS: {}    Retain: {}\n{}\n{}",
        message.topic(),
        message.timestamp_iso(),
        message.qos(),
        if message.retain() { "Yes" } else { "No" },
        "─".repeat(40),
        pretty_payload(message.payload())
    )
}

/// Indented JSON when the payload parses as JSON, the raw text otherwise.
pub fn pretty_payload(payload: &str) -> Cow<'_, str> {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .map_or(Cow::Borrowed(payload), Cow::Owned)
}

/// `Messages: <total>`, or `Messages: <visible>/<total>` while a filter is active.
pub fn message_count_line(store: &MessageStore) -> String {
    if store.is_filtered() {
        format!("Messages: {}/{}", store.visible_count(), store.count())
    } else {
        format!("Messages: {}", store.count())
    }
}

pub fn format_status(status: &MqttStatus) -> String {
    let state = match status.connection_state {
        ConnectionState::Disconnected => "Disconnected",
        ConnectionState::Connecting => "Connecting",
        ConnectionState::Connected => "Connected",
    };
    let endpoint = status.endpoint.as_deref().unwrap_or("-");
    let last = status
        .last_activity
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "State: {state} ({endpoint})  Received: {}  Sent: {}  Last activity: {last}",
        status.messages_received, status.messages_sent
    )
}

/// Wraps `text` in a 24-bit foreground colour escape.
pub fn paint(text: &str, color: TopicColor) -> String {
    let (r, g, b) = color.rgb();
    format!("\x1b[38;2;{r};{g};{b}m{text}\x1b[0m")
}
