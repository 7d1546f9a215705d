use std::borrow::Cow;
use std::io::Write;
use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use tracing::info;

use super::message_store::MessageStore;

const HEADER: [&str; 5] = ["Timestamp", "Topic", "Payload", "QoS", "Retain"];

/// Writes the filtered view as CSV. Returns the number of data rows.
pub fn write_csv<W: Write>(store: &MessageStore, mut writer: W) -> std::io::Result<usize> {
    write_row(&mut writer, HEADER.iter().map(|field| Cow::Borrowed(*field)))?;

    let mut rows = 0;
    for message in store.visible() {
        let fields = [
            Cow::Owned(message.timestamp_iso()),
            Cow::Borrowed(message.topic()),
            Cow::Borrowed(message.payload()),
            Cow::Owned(message.qos().to_string()),
            Cow::Borrowed(if message.retain() { "Yes" } else { "No" }),
        ];
        write_row(&mut writer, fields.into_iter())?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

/// Renders the CSV in memory, then writes it with `tokio::fs`.
pub async fn export_csv_file(store: &MessageStore, path: &Path) -> Result<usize> {
    let mut csv = Vec::new();
    let rows = write_csv(store, &mut csv)
        .map_err(|e| eyre!("Failed to render CSV: {}", e))?;
    tokio::fs::write(path, csv)
        .await
        .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
    info!("Exported {} messages to {}", rows, path.display());
    Ok(rows)
}

fn write_row<'a, W: Write>(
    writer: &mut W,
    fields: impl Iterator<Item = Cow<'a, str>>,
) -> std::io::Result<()> {
    let line = fields
        .map(|field| escape_field(&field).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\r\n")
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
