use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;

use crate::source::{
    BITMAP_FORMATS, ClipboardSource, FILE_LIST_FORMATS, FORMAT_FILE_URL, FORMAT_FILENAMES,
    FORMAT_URI_LIST, TEXT_FORMATS,
};
use crate::{CoreError, EntryKind, extension_of};

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff", "heic", "heif", "svg", "ico",
];
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "m4a", "aac", "flac", "ogg", "oga", "opus", "aif", "aiff", "caf",
];

/// What the clipboard currently holds, as far as history capture is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Text,
    /// Pixel data with no backing file.
    ClipboardImage,
    Image(PathBuf),
    MultiImage(Vec<PathBuf>),
    Audio(PathBuf),
    MultiAudio(Vec<PathBuf>),
    File(PathBuf),
    MultiFile(Vec<PathBuf>),
}

impl Classification {
    pub fn entry_kind(&self) -> EntryKind {
        match self {
            Classification::Text => EntryKind::Text,
            Classification::ClipboardImage => EntryKind::RenderedImage,
            Classification::Image(_) | Classification::File(_) => EntryKind::File,
            Classification::MultiImage(_) | Classification::MultiFile(_) => EntryKind::MultiFile,
            Classification::Audio(_) => EntryKind::Audio,
            Classification::MultiAudio(_) => EntryKind::MultiAudio,
        }
    }

    /// Referenced files; empty for text and rendered images.
    pub fn files(&self) -> &[PathBuf] {
        match self {
            Classification::Text | Classification::ClipboardImage => &[],
            Classification::Image(path)
            | Classification::Audio(path)
            | Classification::File(path) => std::slice::from_ref(path),
            Classification::MultiImage(paths)
            | Classification::MultiAudio(paths)
            | Classification::MultiFile(paths) => paths,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileClass {
    Image,
    Audio,
    Other,
}

fn file_class(path: &Path) -> FileClass {
    let ext = extension_of(path);
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        FileClass::Image
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        FileClass::Audio
    } else {
        FileClass::Other
    }
}

/// Inspects the clipboard and decides what, if anything, should be captured.
///
/// A present file list always wins, even when the pasteboard also carries an
/// icon bitmap or the file name as text.
pub fn classify(source: &dyn ClipboardSource) -> Option<Classification> {
    let formats = match source.available_formats() {
        Ok(formats) => formats,
        Err(err) => {
            debug!("clipboard formats unreadable: {err}");
            return None;
        }
    };

    if let Some(format) = formats.first_of(FILE_LIST_FORMATS) {
        let descriptor = match source.read_file_list_descriptor(format) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                debug!(format, "file list unreadable: {err}");
                return None;
            }
        };
        return match parse_file_list(format, &descriptor) {
            Ok(paths) => classify_paths(paths),
            Err(err) => {
                debug!("{err}");
                None
            }
        };
    }

    if formats.first_of(BITMAP_FORMATS).is_some() {
        return Some(Classification::ClipboardImage);
    }

    if formats.first_of(TEXT_FORMATS).is_some() {
        return Some(Classification::Text);
    }

    None
}

/// Classifies a resolved file list. Directories are never captured, and paths
/// that no longer exist are ignored.
pub fn classify_paths(paths: Vec<PathBuf>) -> Option<Classification> {
    if paths.iter().any(|p| p.is_dir()) {
        return None;
    }

    let mut existing: Vec<PathBuf> = paths.into_iter().filter(|p| p.is_file()).collect();
    if existing.is_empty() {
        return None;
    }

    let classes: Vec<FileClass> = existing.iter().map(|p| file_class(p)).collect();
    let all = |class: FileClass| classes.iter().all(|c| *c == class);

    if existing.len() == 1 {
        let path = existing.remove(0);
        return Some(match classes[0] {
            FileClass::Image => Classification::Image(path),
            FileClass::Audio => Classification::Audio(path),
            FileClass::Other => Classification::File(path),
        });
    }

    Some(if all(FileClass::Image) {
        Classification::MultiImage(existing)
    } else if all(FileClass::Audio) {
        Classification::MultiAudio(existing)
    } else {
        Classification::MultiFile(existing)
    })
}

pub fn parse_file_list(format: &str, descriptor: &[u8]) -> Result<Vec<PathBuf>, CoreError> {
    let malformed = |reason: String| CoreError::MalformedFileList {
        format: format.to_owned(),
        reason,
    };

    match format {
        FORMAT_FILENAMES => {
            let names: Vec<String> =
                plist::from_bytes(descriptor).map_err(|err| malformed(err.to_string()))?;
            Ok(names.into_iter().map(PathBuf::from).collect())
        }
        FORMAT_FILE_URL | FORMAT_URI_LIST => {
            let text = std::str::from_utf8(descriptor).map_err(|err| malformed(err.to_string()))?;
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(|line| file_url_to_path(line).ok_or_else(|| malformed(line.to_owned())))
                .collect()
        }
        other => Err(CoreError::UnsupportedFileListFormat(other.to_owned())),
    }
}

fn file_url_to_path(raw: &str) -> Option<PathBuf> {
    let url = Url::parse(raw).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}
