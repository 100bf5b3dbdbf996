use std::sync::Arc;

use clipkeep_core::{ClipboardEntry, ClipboardSource, EntryKind};
use clipkeep_store::HistoryHandle;
use tokio::task;
use tracing::info;

use crate::{DaemonError, imaging::decode_data_uri};

/// Puts a history entry back on the clipboard.
///
/// Text goes back as text and rendered images as pixels. File-backed entries
/// are written as their private copy paths, one per line.
pub fn write_entry_to_clipboard(
    source: &dyn ClipboardSource,
    entry: &ClipboardEntry,
) -> Result<(), DaemonError> {
    match entry.kind {
        EntryKind::Text => source.write_text(&entry.content)?,
        EntryKind::RenderedImage => source.write_image(&decode_data_uri(&entry.content)?)?,
        EntryKind::File | EntryKind::MultiFile | EntryKind::Audio | EntryKind::MultiAudio => {
            let paths: Vec<String> = entry
                .metadata
                .iter()
                .map(|meta| meta.path.to_string_lossy().into_owned())
                .collect();
            source.write_text(&paths.join("\n"))?;
        }
    }
    Ok(())
}

/// Restores entry `id` to the clipboard and moves it to the top of history.
pub async fn restore_entry(
    source: Arc<dyn ClipboardSource>,
    history: &HistoryHandle,
    id: &str,
) -> Result<ClipboardEntry, DaemonError> {
    let entry = history
        .find(id)
        .await?
        .ok_or_else(|| DaemonError::UnknownEntry(id.to_owned()))?;

    let payload = entry.clone();
    task::spawn_blocking(move || write_entry_to_clipboard(source.as_ref(), &payload))
        .await
        .map_err(|err| DaemonError::Task(err.to_string()))??;

    let promoted = history.promote(&entry.id).await?.unwrap_or(entry);
    info!(id = %promoted.id, kind = ?promoted.kind, "restored history entry");
    Ok(promoted)
}
