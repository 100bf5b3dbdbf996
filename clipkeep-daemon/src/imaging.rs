use base64::Engine;
use clipkeep_core::{CoreError, PNG_DATA_URI_PREFIX, RgbaImage};
use image::{ExtendedColorType, ImageEncoder, codecs::png::PngEncoder};

use crate::DaemonError;

pub fn encode_png_data_uri(image: &RgbaImage) -> Result<String, DaemonError> {
    // The encoder asserts on the buffer length; reject mismatches up front.
    let expected = u64::from(image.width)
        .checked_mul(u64::from(image.height))
        .and_then(|pixels| pixels.checked_mul(4));
    if expected != Some(image.bytes.len() as u64) {
        return Err(DaemonError::Image(format!(
            "pixel buffer holds {} bytes, expected {} for {}x{} RGBA",
            image.bytes.len(),
            expected.map_or_else(|| "overflow".to_owned(), |n| n.to_string()),
            image.width,
            image.height
        )));
    }

    let mut png: Vec<u8> = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(
            &image.bytes,
            image.width,
            image.height,
            ExtendedColorType::Rgba8,
        )
        .map_err(|err| DaemonError::Image(err.to_string()))?;

    let engine = base64::engine::general_purpose::STANDARD;
    Ok(format!("{PNG_DATA_URI_PREFIX}{}", engine.encode(png)))
}

pub fn decode_data_uri(uri: &str) -> Result<RgbaImage, DaemonError> {
    let body = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, body)| body)
        .ok_or(CoreError::InvalidDataUri)?;

    let engine = base64::engine::general_purpose::STANDARD;
    let bytes = engine
        .decode(body.trim())
        .map_err(|_| CoreError::InvalidDataUri)?;
    let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
        .map_err(|err| DaemonError::Image(err.to_string()))?
        .to_rgba8();

    Ok(RgbaImage {
        width: decoded.width(),
        height: decoded.height(),
        bytes: decoded.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> RgbaImage {
        RgbaImage {
            width: 2,
            height: 2,
            bytes: vec![
                255, 0, 0, 255, 0, 255, 0, 255, //
                0, 0, 255, 255, 255, 255, 255, 0,
            ],
        }
    }

    #[test]
    fn encoded_pixels_decode_back() {
        let uri = encode_png_data_uri(&checker()).expect("encode png");
        assert!(uri.starts_with(PNG_DATA_URI_PREFIX));
        assert_eq!(decode_data_uri(&uri).expect("decode png"), checker());
    }

    #[test]
    fn encoding_is_stable() {
        assert_eq!(
            encode_png_data_uri(&checker()).expect("encode png"),
            encode_png_data_uri(&checker()).expect("encode png")
        );
    }

    #[test]
    fn rejects_non_base64_uri() {
        assert!(decode_data_uri("data:image/png,raw").is_err());
        assert!(decode_data_uri("hello").is_err());
    }

    #[test]
    fn short_pixel_buffer_is_an_error() {
        let broken = RgbaImage {
            width: 4,
            height: 4,
            bytes: vec![0; 3],
        };
        let err = encode_png_data_uri(&broken).expect_err("short buffer must be rejected");
        assert!(err.to_string().contains("expected 64"), "unexpected error: {err}");
    }

    #[test]
    fn oversized_pixel_buffer_is_an_error() {
        let mut padded = checker();
        padded.bytes.extend_from_slice(&[0; 4]);
        assert!(encode_png_data_uri(&padded).is_err());
    }
}
