/// Image loading for job submission: file or bytes → base64 data URL.
use std::path::Path;

use base64::Engine as _;

use crate::errors::{ProbeError, ProbeResult};
use crate::remote::types::ImageRef;

/// MIME type for the image header, PNG when the format is not recognised.
pub fn guess_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type(),
        Err(_) => "image/png",
    }
}

/// Encode raw image bytes as an inline `data:` reference.
pub fn image_ref_from_bytes(bytes: &[u8]) -> ProbeResult<ImageRef> {
    if bytes.is_empty() {
        return Err(ProbeError::InvalidInput("image is empty".into()));
    }
    let mime = guess_mime(bytes);
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    tracing::debug!(mime, bytes = bytes.len(), base64_len = encoded.len(), "image encoded");
    Ok(ImageRef::new(format!("data:{mime};base64,{encoded}")))
}

/// Width and height of an encoded image.
pub fn image_dimensions(bytes: &[u8]) -> ProbeResult<(u32, u32)> {
    let img = image::load_from_memory(bytes)?;
    Ok((img.width(), img.height()))
}

/// Read an image file and encode it as an inline `data:` reference.
pub fn image_ref_from_path(path: &Path) -> ProbeResult<ImageRef> {
    let bytes = std::fs::read(path)?;
    match image_dimensions(&bytes) {
        Ok((width, height)) => tracing::debug!(
            path = %path.display(),
            width,
            height,
            "image loaded"
        ),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "image header not decodable, sending as-is")
        }
    }
    image_ref_from_bytes(&bytes)
}

/// Resolve a command-line image argument. `http(s)://` references are passed
/// to the service untouched; anything else is read from disk.
pub fn image_ref_from_arg(arg: &str) -> ProbeResult<ImageRef> {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        tracing::debug!(url = arg, "using remote image reference");
        return Ok(ImageRef::new(arg));
    }
    image_ref_from_path(Path::new(arg))
}
