use std::io;

use thiserror::Error;

pub mod materialize;
pub mod service;
pub mod store;

pub use materialize::FileMaterializer;
pub use service::{HistoryHandle, spawn_history_service};
pub use store::{HistoryObserver, HistoryStore, StoreConfig, load_history};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{failed} of {total} files could not be copied into history storage")]
    PartialMaterialization { failed: usize, total: usize },
    #[error("file-backed entry has no source files")]
    MissingFiles,
    #[error("history read failed: {0}")]
    Read(io::Error),
    #[error("history parse failed: {0}")]
    Parse(serde_json::Error),
    #[error("history serialize failed: {0}")]
    Serialize(serde_json::Error),
    #[error("history write failed: {0}")]
    Write(io::Error),
    #[error("history service could not start: {0}")]
    Spawn(io::Error),
    #[error("history service is not running")]
    ServiceClosed,
}
