use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::oneshot;

use crate::config::{FrameId, Readback};
use crate::error::SessionError;

/// A decoded RGBA8 image ready to be drawn.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Where the pixels came from (for logging).
    pub source: String,
    pub pixels: Arc<RgbaImage>,
    pub readback: Readback,
}

impl DecodedImage {
    pub fn new(source: impl Into<String>, pixels: RgbaImage, readback: Readback) -> Self {
        Self {
            source: source.into(),
            pixels: Arc::new(pixels),
            readback,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Requests sent to the session controller.
#[derive(Debug)]
pub enum Command {
    /// Switch to another frame from the configured set.
    SelectFrame(FrameId),
    /// A freshly uploaded photo with its declared MIME type.
    UploadImage { bytes: Vec<u8>, mime: String },
    SetZoom(f64),
    /// Encode the current composite and hand it to the sink.
    Export,
    /// Report the current session state.
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Reports emitted by the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    FrameLoaded {
        frame: FrameId,
        width: u32,
        height: u32,
    },
    /// The primary location failed; the fallback is being tried.
    FrameRetrying { frame: FrameId, reason: String },
    UserImageLoaded { width: u32, height: u32 },
    Rendered { width: u32, height: u32 },
    Exported { path: PathBuf },
    Failed(SessionError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub frame: Option<FrameId>,
    pub frame_ready: bool,
    pub user_ready: bool,
    pub zoom: f64,
    /// Dimensions of the composite surface; `(0, 0)` before the first render.
    pub surface: (u32, u32),
    pub surface_tainted: bool,
}
