use anyhow::{Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

/// Whether the image is carried inline as a `data:` URL rather than a
/// reference the store already resolved.
pub fn is_inline(image_url: &str) -> bool {
    image_url.starts_with("data:")
}

/// Decode the base64 payload of a `data:` URL.
pub fn decode_data_url(image_url: &str) -> Result<Vec<u8>> {
    let (header, payload) = image_url
        .split_once(',')
        .ok_or_else(|| anyhow!("data URL has no payload separator"))?;
    if !header.ends_with(";base64") {
        bail!("data URL is not base64 encoded: {}", header);
    }

    let bytes = B64.decode(payload.trim())?;
    if bytes.is_empty() {
        bail!("data URL payload is empty");
    }
    Ok(bytes)
}

/// File or blob name of a plant's externalized image.
pub fn image_name(plant_id: u32) -> String {
    format!("plant-{}.jpg", plant_id)
}
