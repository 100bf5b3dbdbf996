use std::borrow::Cow;

use arboard::{Clipboard, ImageData};
use clipkeep_core::{ClipboardSource, FormatSet, RgbaImage, SourceError};

/// The OS clipboard.
///
/// On macOS formats, raw descriptors and the change counter come from
/// `NSPasteboard`. Text and bitmaps go through arboard everywhere, with a new
/// handle per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Self {
        Self
    }
}

fn open() -> Result<Clipboard, SourceError> {
    Clipboard::new().map_err(|err| SourceError::Unavailable(err.to_string()))
}

impl ClipboardSource for SystemClipboard {
    fn available_formats(&self) -> Result<FormatSet, SourceError> {
        pasteboard::available_formats()
    }

    fn read_text(&self) -> Result<Option<String>, SourceError> {
        match open()?.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => Err(SourceError::Read(err.to_string())),
        }
    }

    fn read_rendered_image(&self) -> Result<Option<RgbaImage>, SourceError> {
        match open()?.get_image() {
            Ok(image) => Ok(Some(RgbaImage {
                width: image.width as u32,
                height: image.height as u32,
                bytes: image.bytes.into_owned(),
            })),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => Err(SourceError::Read(err.to_string())),
        }
    }

    fn read_file_list_descriptor(&self, format: &str) -> Result<Option<Vec<u8>>, SourceError> {
        pasteboard::read_data(format)
    }

    fn change_count(&self) -> Option<i64> {
        pasteboard::change_count()
    }

    fn write_text(&self, text: &str) -> Result<(), SourceError> {
        open()?
            .set_text(text.to_owned())
            .map_err(|err| SourceError::Write(err.to_string()))
    }

    fn write_image(&self, image: &RgbaImage) -> Result<(), SourceError> {
        let data = ImageData {
            width: image.width as usize,
            height: image.height as usize,
            bytes: Cow::Borrowed(&image.bytes),
        };
        open()?
            .set_image(data)
            .map_err(|err| SourceError::Write(err.to_string()))
    }
}

#[cfg(target_os = "macos")]
mod pasteboard {
    use clipkeep_core::{FormatSet, SourceError};
    use objc2_app_kit::NSPasteboard;
    use objc2_foundation::NSString;

    #[allow(unused_unsafe)]
    pub fn available_formats() -> Result<FormatSet, SourceError> {
        let pasteboard = unsafe { NSPasteboard::generalPasteboard() };
        let Some(types) = (unsafe { pasteboard.types() }) else {
            return Ok(FormatSet::new());
        };
        Ok(types.iter().map(|t| t.to_string()).collect())
    }

    #[allow(unused_unsafe)]
    pub fn read_data(format: &str) -> Result<Option<Vec<u8>>, SourceError> {
        let pasteboard = unsafe { NSPasteboard::generalPasteboard() };
        let kind = NSString::from_str(format);
        let data = unsafe { pasteboard.dataForType(&kind) };
        Ok(data.map(|d| d.to_vec()))
    }

    #[allow(unused_unsafe)]
    pub fn change_count() -> Option<i64> {
        let pasteboard = unsafe { NSPasteboard::generalPasteboard() };
        Some(unsafe { pasteboard.changeCount() } as i64)
    }
}

/// arboard only exposes text and bitmaps, so formats are checked and file
/// lists are never reported.
#[cfg(not(target_os = "macos"))]
mod pasteboard {
    use clipkeep_core::source::{FORMAT_IMAGE_PNG, FORMAT_TEXT_PLAIN};
    use clipkeep_core::{FormatSet, SourceError};

    pub fn available_formats() -> Result<FormatSet, SourceError> {
        let mut clipboard = super::open()?;
        let mut formats = FormatSet::new();
        if clipboard.get_image().is_ok() {
            formats.insert(FORMAT_IMAGE_PNG);
        }
        if clipboard.get_text().is_ok() {
            formats.insert(FORMAT_TEXT_PLAIN);
        }
        Ok(formats)
    }

    pub fn read_data(_format: &str) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(None)
    }

    pub fn change_count() -> Option<i64> {
        None
    }
}
