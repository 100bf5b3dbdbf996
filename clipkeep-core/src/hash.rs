use sha2::{Digest, Sha256};

use crate::EntryKind;

/// Fingerprint used for dedupe. Image payloads are hashed without their
/// `data:<mime>;base64,` wrapper so identical pixels collide regardless of MIME.
pub fn content_hash(kind: EntryKind, content: &str) -> String {
    let payload = if kind.is_image() {
        strip_data_uri_prefix(content)
    } else {
        content
    };
    hex::encode(Sha256::digest(payload.as_bytes()))
}

pub fn strip_data_uri_prefix(content: &str) -> &str {
    if !content.starts_with("data:") {
        return content;
    }
    match content.split_once(',') {
        Some((_, body)) => body,
        None => content,
    }
}
