//! # Console Orchestrator
//!
//! Headless front end for mqttscope. The [`Monitor`] owns the message store, the optional
//! log sink and the connection manager handle, and drives everything from one
//! `tokio::select!` loop:
//!
//! ```text
//! ConnectionManager ──MonitorEvent──┐
//! stdin lines ──────Command─────────┼──► Monitor ──► stdout rows / status
//! Ctrl-C ───────────────────────────┘        │
//!                                            ├──► MessageStore
//!                                            └──► MessageSink (optional)
//! ```
//!
//! Nothing here blocks on the network: manager calls return immediately and their outcome
//! comes back through the event receiver. Output is written to any `io::Write`, so the
//! loop can be driven from tests with a byte buffer.

pub mod commands;
pub mod render;

use std::io::{IsTerminal, Stdout, Write};
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{password_from_env, MonitorSettings};
use crate::mqtt::mqtt_handler::{ConnectionManager, ConnectionState, MonitorEvent};
use crate::sink::{FileSink, MessageSink};
use crate::store::{export::export_csv_file, MessageStore};

use commands::{Command, HELP};

/// Rows printed by `list` without an explicit count.
const DEFAULT_LIST_ROWS: usize = 20;
/// How long shutdown waits for the broker to acknowledge a clean disconnect.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Monitor<W: Write = Stdout> {
    settings: MonitorSettings,
    manager: ConnectionManager,
    events: mpsc::UnboundedReceiver<MonitorEvent>,
    store: MessageStore,
    sink: Option<Box<dyn MessageSink>>,
    follow: bool,
    ansi: bool,
    out: W,
}

impl Monitor<Stdout> {
    /// Console on stdout backed by a real broker connection.
    pub fn new(settings: MonitorSettings) -> Self {
        let (manager, events) = ConnectionManager::new(settings.mqtt_config());
        let stdout = std::io::stdout();
        let ansi = stdout.is_terminal();
        Self::with_parts(settings, manager, events, stdout, ansi)
    }
}

impl<W: Write> Monitor<W> {
    pub fn with_parts(
        settings: MonitorSettings,
        manager: ConnectionManager,
        events: mpsc::UnboundedReceiver<MonitorEvent>,
        out: W,
        ansi: bool,
    ) -> Self {
        let store = MessageStore::with_capacity(settings.store.capacity);
        Self {
            settings,
            manager,
            events,
            store,
            sink: None,
            follow: true,
            ansi,
            out,
        }
    }

    /// Re-registers saved subscriptions and opens the log if enabled. Subscriptions are
    /// sent once a connection comes up.
    pub async fn restore(&mut self) {
        let saved = self.settings.subscriptions.clone();
        for entry in saved {
            if let Err(e) = self.manager.subscribe(&entry.filter, entry.qos).await {
                warn!("Skipping saved subscription '{}': {}", entry.filter, e);
                self.say(format!("Error: {e}"));
            }
        }
        if self.settings.logging.enabled {
            self.enable_log().await;
        }
    }

    /// Runs until `quit`, Ctrl-C or a fatal input error. Returns the settings to persist.
    pub async fn run<R>(mut self, input: R) -> Result<MonitorSettings>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        self.say(format!(
            "mqttscope ready. Type 'connect' to reach {}:{} or 'help' for commands.",
            self.settings.broker.host, self.settings.broker.port
        ));

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => self.handle_event(event),
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => {
                        if self.handle_line(&line).await == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Input closed, monitoring until Ctrl-C");
                        input_open = false;
                    }
                    Err(e) => return Err(eyre!("Failed to read console input: {}", e)),
                },
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    pub async fn handle_line(&mut self, line: &str) -> Flow {
        match Command::parse(line) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => Flow::Continue,
            Err(e) => {
                self.say(format!("Error: {e}"));
                Flow::Continue
            }
        }
    }

    pub fn handle_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::MessageArrived(message) => {
                if let Some(sink) = self.sink.as_mut() {
                    if let Err(e) = sink.store_message(&message) {
                        warn!("Log write failed: {}", e);
                        self.say(format!("Error: log write failed: {e}"));
                    }
                }
                let shown = message.matches(self.store.filter());
                self.store.add(message);
                if self.follow && shown {
                    let row = self.store.visible_count().saturating_sub(1);
                    self.print_row(row);
                }
            }
            MonitorEvent::Connected => self.say("Connected."),
            MonitorEvent::Disconnected => self.say("Disconnected."),
            MonitorEvent::Error(detail) => self.say(format!("Error: {detail}")),
        }
    }

    pub async fn execute(&mut self, command: Command) -> Flow {
        debug!("Executing {:?}", command);
        match command {
            Command::Connect { host, port } => {
                let mut params = self.settings.connect_params(password_from_env());
                if let Some(host) = host {
                    params.host = host;
                }
                if let Some(port) = port {
                    params.port = port;
                }
                match self.manager.connect(params.clone()).await {
                    Ok(()) => {
                        self.settings.remember_endpoint(&params);
                        self.say(format!("Connecting to {}...", params.endpoint()));
                    }
                    Err(e) => self.say(format!("Error: {e}")),
                }
            }
            Command::Disconnect => self.manager.disconnect().await,
            Command::Subscribe { filter, qos } => {
                let result = self.manager.subscribe(&filter, qos).await;
                let connected = self.manager.is_connected().await;
                match result {
                    Ok(()) if connected => self.say(format!("Subscribed to {filter} (QoS {qos})")),
                    Ok(()) => self.say(format!(
                        "Subscription to {filter} (QoS {qos}) will be sent once connected"
                    )),
                    Err(e) => self.say(format!("Error: {e}")),
                }
            }
            Command::Unsubscribe { filter } => {
                if self.manager.unsubscribe(&filter).await {
                    self.say(format!("Unsubscribed from {filter}"));
                } else {
                    self.say(format!("Not subscribed to {filter}"));
                }
            }
            Command::Publish {
                topic,
                payload,
                qos,
                retain,
            } => {
                if let Err(e) = self
                    .manager
                    .publish(&topic, payload.as_bytes(), qos, retain)
                    .await
                {
                    self.say(format!("Error: {e}"));
                }
            }
            Command::Filter(text) => {
                self.store.set_filter(text.as_deref().unwrap_or(""));
                self.say(render::message_count_line(&self.store));
            }
            Command::Clear => {
                self.store.clear();
                self.say(render::message_count_line(&self.store));
            }
            Command::List(rows) => self.list(rows.unwrap_or(DEFAULT_LIST_ROWS)),
            Command::Show(row) => match self.store.at(row) {
                Some(message) => {
                    let detail = render::format_detail(message);
                    self.say(detail);
                }
                None => self.say(format!("No message at row {row}")),
            },
            Command::Export(path) => match export_csv_file(&self.store, &path).await {
                Ok(rows) => self.say(format!("Exported {rows} messages to {}", path.display())),
                Err(e) => self.say(format!("Error: {e}")),
            },
            Command::Log(true) => self.enable_log().await,
            Command::Log(false) => {
                self.settings.logging.enabled = false;
                match self.sink.take() {
                    Some(mut sink) => {
                        sink.close().await;
                        self.say(format!("Logging stopped ({})", sink.info()));
                    }
                    None => self.say("Logging is off"),
                }
            }
            Command::Follow(on) => {
                self.follow = on;
                self.say(if on { "Follow on" } else { "Follow off" });
            }
            Command::Subscriptions => {
                let subscriptions = self.manager.subscriptions().await;
                if subscriptions.is_empty() {
                    self.say("No subscriptions");
                }
                for (filter, qos) in subscriptions.iter() {
                    self.say(format!("  {filter}  QoS {}", qos as u8));
                }
            }
            Command::Status => {
                let status = self.manager.status().await;
                let subscriptions = self.manager.subscriptions().await.len();
                let log = self
                    .sink
                    .as_ref()
                    .map(|sink| sink.info())
                    .unwrap_or_else(|| "off".to_string());
                self.say(render::format_status(&status));
                self.say(format!(
                    "{}  Subscriptions: {subscriptions}  Log: {log}",
                    render::message_count_line(&self.store)
                ));
            }
            Command::Help => self.say(HELP),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Disconnects, closes the log and hands back settings with the current subscriptions.
    pub async fn shutdown(mut self) -> Result<MonitorSettings> {
        if self.manager.connection_state().await != ConnectionState::Disconnected {
            self.manager.disconnect().await;
            let deadline = tokio::time::sleep(SHUTDOWN_GRACE);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    event = self.events.recv() => match event {
                        Some(MonitorEvent::Disconnected) | None => break,
                        Some(event) => self.handle_event(event),
                    },
                    _ = &mut deadline => {
                        warn!("Broker did not confirm disconnect in time");
                        break;
                    }
                }
            }
        }

        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
        let subscriptions = self.manager.subscriptions().await;
        self.settings.remember_subscriptions(&subscriptions);
        info!("Monitor stopped with {} stored messages", self.store.count());
        Ok(self.settings)
    }

    async fn enable_log(&mut self) {
        if let Some(sink) = self.sink.as_ref() {
            let info = sink.info();
            self.say(format!("Already logging to {info}"));
            return;
        }
        let logging = self.settings.logging.clone();
        match FileSink::open(&logging.directory, &logging.filename).await {
            Ok(sink) => {
                self.say(format!("Logging to {}", sink.info()));
                self.sink = Some(Box::new(sink));
                self.settings.logging.enabled = true;
            }
            Err(e) => self.say(format!("Error: could not open log: {e}")),
        }
    }

    fn list(&mut self, rows: usize) {
        let end = self.store.visible_count();
        for row in end.saturating_sub(rows)..end {
            self.print_row(row);
        }
        self.say(render::message_count_line(&self.store));
    }

    fn print_row(&mut self, row: usize) {
        let Some(message) = self.store.at(row) else {
            return;
        };
        let color = self.store.topic_identity(message.topic());
        let line = render::format_row(row, message, color, self.ansi);
        self.say(line);
    }

    fn say(&mut self, text: impl AsRef<str>) {
        if let Err(e) = writeln!(self.out, "{}", text.as_ref()) {
            warn!("Console write failed: {}", e);
        }
    }
}
