use std::io::{self, Cursor};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::RgbaImage;
use tracing::debug;

use crate::config::{AssetLocation, FrameId, Readback};
use crate::error::SessionError;
use crate::events::DecodedImage;

/// Source of raw frame bytes.
pub trait AssetFetcher: Send + Sync + 'static {
    fn fetch(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads assets straight from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsFetcher;

impl AssetFetcher for FsFetcher {
    fn fetch(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// True when `mime` names a raster image type.
///
/// Parameters (`; charset=...`) and case are ignored. SVG is vector and rejected.
pub fn is_raster_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    let essence = essence.to_ascii_lowercase();
    match essence.split_once('/') {
        Some(("image", subtype)) => !subtype.is_empty() && subtype != "svg+xml",
        _ => false,
    }
}

/// Best-effort MIME type for an image path, from its extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

// Decodes in-memory bytes to RGBA8 and applies EXIF orientation if available.
pub fn decode_rgba8_apply_exif(bytes: &[u8]) -> Result<RgbaImage> {
    let img = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to sniff image format")?
        .decode()
        .context("failed to decode image")?
        .to_rgba8();
    let orientation = read_orientation(bytes).unwrap_or(1);
    Ok(apply_orientation(img, orientation))
}

fn read_orientation(bytes: &[u8]) -> Option<u16> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)? as u16;
    debug!(orientation = o, "exif orientation");
    Some(o)
}

fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    use image::imageops::{flip_horizontal, flip_vertical, rotate90, rotate180, rotate270};
    match orientation {
        2 => flip_horizontal(&img),
        3 => rotate180(&img),
        4 => flip_vertical(&img),
        5 => flip_horizontal(&rotate90(&img)),
        6 => rotate90(&img),
        7 => flip_horizontal(&rotate270(&img)),
        8 => rotate270(&img),
        _ => img,
    }
}

/// Fetch and decode one frame location off the async runtime.
///
/// The error is a human-readable reason; the caller decides whether to retry.
pub async fn load_frame(
    fetcher: Arc<dyn AssetFetcher>,
    frame: FrameId,
    location: AssetLocation,
) -> std::result::Result<DecodedImage, String> {
    let joined = tokio::task::spawn_blocking(move || -> Result<DecodedImage> {
        let bytes = fetcher
            .fetch(&location.path)
            .with_context(|| format!("failed to read {}", location.path.display()))?;
        let pixels = decode_rgba8_apply_exif(&bytes)
            .with_context(|| format!("failed to decode {}", location.path.display()))?;
        debug!(
            frame = %frame,
            path = %location.path.display(),
            width = pixels.width(),
            height = pixels.height(),
            "frame decoded"
        );
        Ok(DecodedImage::new(
            location.path.display().to_string(),
            pixels,
            location.readback,
        ))
    })
    .await;
    match joined {
        Ok(Ok(img)) => Ok(img),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(err) => Err(format!("decode task failed: {err}")),
    }
}

/// Decode an uploaded photo from memory off the async runtime.
///
/// Uploads never touch the network, so they are always readable.
pub async fn load_user_image(bytes: Vec<u8>) -> std::result::Result<DecodedImage, SessionError> {
    let joined = tokio::task::spawn_blocking(move || decode_rgba8_apply_exif(&bytes)).await;
    match joined {
        Ok(Ok(pixels)) => Ok(DecodedImage::new("upload", pixels, Readback::Allowed)),
        Ok(Err(err)) => Err(SessionError::ImageDecode(format!("{err:#}"))),
        Err(err) => Err(SessionError::ImageDecode(format!("decode task failed: {err}"))),
    }
}
