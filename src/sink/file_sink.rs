use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{MessageSink, SinkError};
use crate::mqtt::message_manager::MqttMessage;

/// Appends one line per message to a plain-text log file.
///
/// File name rules: empty → `<directory>/mqtt_<YYYYMMDD_HHMMSS>.txt`, relative → inside
/// `directory`, absolute → used as given.
///
/// Lines are handed to a writer task that owns the file, so `store_message` never touches
/// the disk. The footer is written when the sink is closed or dropped.
pub struct FileSink {
    path: PathBuf,
    lines: Option<mpsc::UnboundedSender<String>>,
    writer: Option<JoinHandle<()>>,
}

impl FileSink {
    /// Must be called inside a tokio runtime.
    pub async fn open(directory: &Path, filename: &str) -> Result<Self, SinkError> {
        let path = resolve_log_path(directory, filename);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(&path, source))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| io_error(&path, source))?;
        let mut out = BufWriter::new(file);

        let header = format!(
            "# MQTT Monitor log — session started {}\n\
             # Columns: timestamp | QoS | Retain | topic | payload\n\n",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.6f")
        );
        out.write_all(header.as_bytes())
            .await
            .map_err(|source| io_error(&path, source))?;
        out.flush()
            .await
            .map_err(|source| io_error(&path, source))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(out, rx, path.clone()));

        info!("Logging messages to {}", path.display());
        Ok(Self {
            path,
            lines: Some(tx),
            writer: Some(writer),
        })
    }
}

#[async_trait]
impl MessageSink for FileSink {
    fn store_message(&mut self, message: &MqttMessage) -> Result<(), SinkError> {
        let lines = self.lines.as_ref().ok_or(SinkError::Closed)?;
        let line = format!(
            "{}  QoS={}  {}  {}  {}\n",
            message.timestamp_iso(),
            message.qos(),
            if message.retain() { "R" } else { " " },
            message.topic(),
            message.payload()
        );
        lines.send(line).map_err(|_| SinkError::WriterStopped)
    }

    async fn close(&mut self) {
        // Dropping the sender lets the writer drain, write the footer and exit.
        self.lines.take();
        let Some(writer) = self.writer.take() else {
            return;
        };
        if let Err(e) = writer.await {
            warn!("Log writer for {} failed: {}", self.path.display(), e);
        }
    }

    fn info(&self) -> String {
        self.path.display().to_string()
    }
}

async fn run_writer(
    mut out: BufWriter<tokio::fs::File>,
    mut lines: mpsc::UnboundedReceiver<String>,
    path: PathBuf,
) {
    while let Some(line) = lines.recv().await {
        let mut batch = vec![line];
        while let Ok(more) = lines.try_recv() {
            batch.push(more);
        }
        for line in &batch {
            if let Err(e) = out.write_all(line.as_bytes()).await {
                warn!("Writing to {} failed, log stopped: {}", path.display(), e);
                return;
            }
        }
        // One flush per burst instead of per message.
        if let Err(e) = out.flush().await {
            warn!("Flushing {} failed, log stopped: {}", path.display(), e);
            return;
        }
    }

    let footer = format!(
        "\n# Session ended {}\n",
        Local::now().format("%Y-%m-%dT%H:%M:%S%.6f")
    );
    let ended = match out.write_all(footer.as_bytes()).await {
        Ok(()) => out.flush().await,
        Err(e) => Err(e),
    };
    match ended {
        Ok(()) => debug!("Closed log {}", path.display()),
        Err(e) => warn!("Failed to finish log {}: {}", path.display(), e),
    }
}

pub fn resolve_log_path(directory: &Path, filename: &str) -> PathBuf {
    let filename = filename.trim();
    if filename.is_empty() {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        return directory.join(format!("mqtt_{stamp}.txt"));
    }
    let candidate = Path::new(filename);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        directory.join(candidate)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn resolves_file_names() {
        let dir = Path::new("logs");
        let auto = resolve_log_path(dir, "  ");
        assert!(auto.starts_with("logs"));
        let name = auto.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("mqtt_") && name.ends_with(".txt"));

        assert_eq!(resolve_log_path(dir, "run.txt"), Path::new("logs/run.txt"));

        let absolute = std::env::temp_dir().join("abs.txt");
        assert_eq!(resolve_log_path(dir, absolute.to_str().unwrap()), absolute);
    }

    #[tokio::test]
    async fn writes_header_messages_and_footer() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        let mut sink = FileSink::open(&nested, "session.txt").await.unwrap();
        assert_eq!(sink.info(), nested.join("session.txt").display().to_string());

        let message = MqttMessage::new(Local::now(), "door/front", "open", 1, true);
        sink.store_message(&message).unwrap();
        sink.store_message(&message).unwrap();
        sink.close().await;
        sink.close().await;

        let text = tokio::fs::read_to_string(nested.join("session.txt")).await.unwrap();
        assert!(text.starts_with("# MQTT Monitor log"));
        assert_eq!(text.matches("QoS=1  R  door/front  open").count(), 2);
        assert!(text.trim_end().lines().last().unwrap().starts_with("# Session ended"));

        assert!(matches!(sink.store_message(&message), Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn dropping_the_sink_still_writes_the_footer() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::open(dir.path(), "dropped.txt").await.unwrap();
        sink.store_message(&MqttMessage::new(Local::now(), "t", "p", 0, false))
            .unwrap();
        drop(sink);

        let path = dir.path().join("dropped.txt");
        let mut text = String::new();
        for _ in 0..100 {
            text = tokio::fs::read_to_string(&path).await.unwrap();
            if text.contains("# Session ended") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(text.contains("QoS=0     t  p"));
        assert!(text.contains("# Session ended"));
    }
}
