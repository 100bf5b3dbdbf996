use std::{sync::Arc, time::Duration};

use clipkeep_core::{
    Classification, ClipboardEntry, ClipboardSource, NewEntry, SourceError, SourceFile, classify,
};
use clipkeep_store::HistoryHandle;
use tokio::{
    sync::watch,
    task::{self, JoinHandle},
};
use tracing::{debug, info, trace, warn};

use crate::{DaemonError, ImageHelper, imaging::encode_png_data_uri};

/// Tracks the OS clipboard change counter between cycles.
///
/// Platforms without a counter always report a possible change.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_change_count: Option<i64>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unchanged(&self, current: Option<i64>) -> bool {
        matches!(
            (current, self.last_change_count),
            (Some(current), Some(last)) if current == last
        )
    }

    /// Records a counter value once its content has been handled.
    pub fn commit(&mut self, current: Option<i64>) {
        self.last_change_count = current;
    }

    pub fn reset(&mut self) {
        self.last_change_count = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The change counter has not moved since the last handled cycle.
    ClipboardUnchanged,
    /// Nothing capturable (empty clipboard, directories, vanished files).
    NoContent,
    /// Same content hash as the previous cycle.
    SameAsLast,
    /// The store already had this content on top.
    AlreadyOnTop,
    Stored(ClipboardEntry),
}

/// Polls a [`ClipboardSource`] and feeds new content into the history store.
pub struct CaptureLoop {
    source: Arc<dyn ClipboardSource>,
    history: HistoryHandle,
    image_helper: Option<ImageHelper>,
    interval: Duration,
    last_hash: Option<String>,
    detector: ChangeDetector,
}

impl CaptureLoop {
    pub fn new(
        source: Arc<dyn ClipboardSource>,
        history: HistoryHandle,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            history,
            image_helper: None,
            interval,
            last_hash: None,
            detector: ChangeDetector::new(),
        }
    }

    pub fn with_image_helper(mut self, helper: Option<ImageHelper>) -> Self {
        self.image_helper = helper;
        self
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// One poll. The change counter is only committed when the cycle
    /// succeeds, so failed reads are retried on the next tick.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, DaemonError> {
        let change_count = self.source.change_count();
        if self.detector.is_unchanged(change_count) {
            return Ok(CycleOutcome::ClipboardUnchanged);
        }

        let outcome = self.capture().await?;
        self.detector.commit(change_count);
        Ok(outcome)
    }

    async fn capture(&mut self) -> Result<CycleOutcome, DaemonError> {
        let Some(classification) = self.with_source(|source| Ok(classify(source))).await? else {
            return Ok(CycleOutcome::NoContent);
        };

        let Some(mut entry) = self.build_entry(classification).await? else {
            return Ok(CycleOutcome::NoContent);
        };

        let hash = entry.fingerprint();
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            return Ok(CycleOutcome::SameAsLast);
        }
        entry.hash = Some(hash.clone());

        let stored = self.history.add(entry).await?;
        self.last_hash = Some(hash);

        Ok(match stored {
            Some(entry) => CycleOutcome::Stored(entry),
            None => CycleOutcome::AlreadyOnTop,
        })
    }

    async fn build_entry(
        &self,
        classification: Classification,
    ) -> Result<Option<NewEntry>, DaemonError> {
        match classification {
            Classification::Text => {
                let text = self.with_source(|source| source.read_text()).await?;
                Ok(text.filter(|t| !t.is_empty()).map(NewEntry::text))
            }
            Classification::ClipboardImage => {
                Ok(self.capture_image().await?.map(NewEntry::image))
            }
            files => {
                // Hash over the source paths; the store rewrites `content`
                // to the private copies.
                let sources = files
                    .files()
                    .iter()
                    .cloned()
                    .map(SourceFile::from_path)
                    .collect();
                let entry = NewEntry::files(files.entry_kind(), sources);
                Ok(Some(entry))
            }
        }
    }

    async fn capture_image(&self) -> Result<Option<String>, DaemonError> {
        if let Some(helper) = &self.image_helper {
            return Ok(helper.capture().await);
        }

        let source = Arc::clone(&self.source);
        task::spawn_blocking(move || match source.read_rendered_image()? {
            Some(image) => encode_png_data_uri(&image).map(Some),
            None => Ok(None),
        })
        .await
        .map_err(|err| DaemonError::Task(err.to_string()))?
    }

    async fn with_source<T, F>(&self, read: F) -> Result<T, DaemonError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ClipboardSource) -> Result<T, SourceError> + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let result = task::spawn_blocking(move || read(source.as_ref()))
            .await
            .map_err(|err| DaemonError::Task(err.to_string()))?;
        Ok(result?)
    }

    pub fn spawn(self) -> CaptureHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        CaptureHandle { stop_tx, task }
    }

    /// Polls until `stop` flips to true or its sender goes away. A cycle in
    /// progress always finishes first.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            image_helper = ?self.image_helper.as_ref().map(|h| h.path().to_path_buf()),
            "clipboard capture started"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::Stored(entry)) => {
                    info!(id = %entry.id, kind = ?entry.kind, "captured clipboard entry");
                }
                Ok(CycleOutcome::AlreadyOnTop) => debug!("clipboard content already on top"),
                Ok(outcome) => trace!(?outcome, "capture cycle"),
                Err(err) => warn!("capture cycle failed: {err}"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("clipboard capture stopped");
    }
}

pub struct CaptureHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CaptureHandle {
    /// Signals the loop and waits for it to wind down.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.task.await {
            warn!("capture task ended abnormally: {err}");
        }
    }
}
