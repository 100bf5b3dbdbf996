use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod classify;
pub mod hash;
pub mod source;

pub use classify::{Classification, classify, parse_file_list};
pub use hash::{content_hash, strip_data_uri_prefix};
pub use source::{ClipboardSource, FormatSet, RgbaImage, SourceError};

pub const MAX_UNPINNED_ENTRIES: usize = 25;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";
pub const FILE_PATH_SEPARATOR: &str = ",";

pub type EntryId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    Text,
    RenderedImage,
    File,
    MultiFile,
    Audio,
    MultiAudio,
}

impl EntryKind {
    /// Kinds whose payload lives in app-private file storage.
    pub fn is_file_backed(self) -> bool {
        matches!(
            self,
            EntryKind::File | EntryKind::MultiFile | EntryKind::Audio | EntryKind::MultiAudio
        )
    }

    pub fn is_image(self) -> bool {
        self == EntryKind::RenderedImage
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
}

impl FileMetadata {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            extension: extension_of(path),
            name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardEntry {
    pub id: EntryId,
    pub kind: EntryKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<FileMetadata>,
    pub hash: String,
    pub created_at: u64,
    #[serde(default)]
    pub is_favorite: bool,
}

/// A file referenced by the clipboard that still lives at its original location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
}

impl SourceFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        Self { path, name }
    }
}

/// Insert request. The store assigns `id` and `created_at` and materializes `files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub kind: EntryKind,
    pub content: String,
    pub hash: Option<String>,
    pub is_favorite: bool,
    pub files: Vec<SourceFile>,
}

impl NewEntry {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Text,
            content: text.into(),
            hash: None,
            is_favorite: false,
            files: Vec::new(),
        }
    }

    pub fn image(data_uri: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::RenderedImage,
            content: data_uri.into(),
            hash: None,
            is_favorite: false,
            files: Vec::new(),
        }
    }

    /// File-bearing entry; `content` is the comma-joined source paths.
    pub fn files(kind: EntryKind, files: Vec<SourceFile>) -> Self {
        let content = join_paths(files.iter().map(|f| f.path.as_path()));
        Self {
            kind,
            content,
            hash: None,
            is_favorite: false,
            files,
        }
    }

    pub fn favorite(mut self) -> Self {
        self.is_favorite = true;
        self
    }

    /// Returns the precomputed hash or derives it from kind and content.
    pub fn fingerprint(&self) -> String {
        self.hash
            .clone()
            .unwrap_or_else(|| content_hash(self.kind, &self.content))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryUpdate {
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("data URI is not a base64 PNG")]
    InvalidDataUri,
    #[error("file list descriptor for {format} is malformed: {reason}")]
    MalformedFileList { format: String, reason: String },
    #[error("unsupported file list format {0}")]
    UnsupportedFileListFormat(String),
}

pub fn join_paths<'a>(paths: impl IntoIterator<Item = &'a Path>) -> String {
    paths
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(FILE_PATH_SEPARATOR)
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn now_unix_ms() -> u64 {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    duration.as_millis() as u64
}
