//! Destinations that receive every normalized message in addition to the store.

pub mod file_sink;

use async_trait::async_trait;
use thiserror::Error;

use crate::mqtt::message_manager::MqttMessage;

pub use file_sink::FileSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sink already closed")]
    Closed,

    /// The background writer gave up after an I/O failure
    #[error("log writer stopped")]
    WriterStopped,
}

/// A message log. Failures are reported by the caller and never stop ingestion.
#[async_trait]
pub trait MessageSink: Send {
    /// Queues the message; must not block on I/O.
    fn store_message(&mut self, message: &MqttMessage) -> Result<(), SinkError>;

    /// Flushes and releases resources. Safe to call more than once.
    async fn close(&mut self);

    /// Human-readable destination, e.g. a file path
    fn info(&self) -> String;
}
