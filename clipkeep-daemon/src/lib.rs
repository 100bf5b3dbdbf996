use clipkeep_core::{CoreError, SourceError};
use clipkeep_store::StoreError;
use thiserror::Error;

pub mod capture;
pub mod clipboard;
pub mod config;
pub mod helper;
pub mod imaging;
pub mod restore;

pub use capture::{CaptureHandle, CaptureLoop, ChangeDetector, CycleOutcome};
pub use clipboard::SystemClipboard;
pub use helper::ImageHelper;
pub use restore::{restore_entry, write_entry_to_clipboard};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("image conversion failed: {0}")]
    Image(String),
    #[error("clipboard task failed: {0}")]
    Task(String),
    #[error("no history entry with id {0}")]
    UnknownEntry(String),
}
