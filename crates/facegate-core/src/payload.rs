//! Decoding of client-supplied image payloads.
//!
//! Payloads are standard base64, optionally preceded by a data URI header such
//! as `data:image/jpeg;base64,`. Everything up to and including the first comma
//! of a `data:` payload is discarded before decoding.

use base64::{engine::general_purpose, Engine as _};
use image::RgbImage;
use tracing::debug;

use crate::errors::{AppError, AppResult};

const DATA_URI_SCHEME: &str = "data:";

/// Returns the base64 body of `payload`, dropping a leading data URI header.
pub fn strip_data_uri_prefix(payload: &str) -> &str {
    let trimmed = payload.trim();
    if trimmed.starts_with(DATA_URI_SCHEME) {
        if let Some((_, body)) = trimmed.split_once(',') {
            return body;
        }
    }
    trimmed
}

/// Decodes a base64 (or data URI) payload into its raw bytes.
pub fn decode_base64_payload(payload: &str) -> AppResult<Vec<u8>> {
    let body: String = strip_data_uri_prefix(payload)
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    if body.is_empty() {
        return Err(AppError::EmptyPayload);
    }

    general_purpose::STANDARD
        .decode(body.as_bytes())
        .map_err(|source| AppError::Base64 { source })
}

/// Decodes raw image bytes of any format the `image` crate understands into
/// an 8-bit RGB buffer.
pub fn decode_image_bytes(bytes: &[u8]) -> AppResult<RgbImage> {
    if bytes.is_empty() {
        return Err(AppError::EmptyPayload);
    }
    let image = image::load_from_memory(bytes).map_err(|source| AppError::ImageDecode { source })?;
    let rgb = image.to_rgb8();
    debug!(width = rgb.width(), height = rgb.height(), "decoded image payload");
    Ok(rgb)
}

/// Full payload pipeline: strip prefix, base64-decode, image-decode.
pub fn decode_image_payload(payload: &str) -> AppResult<RgbImage> {
    let bytes = decode_base64_payload(payload)?;
    decode_image_bytes(&bytes)
}
