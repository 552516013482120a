//! PNG export of the composite surface.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::render::composite::CompositeSurface;
use crate::session::SessionState;

/// Where encoded exports end up.
pub trait ImageSink: Send + Sync {
    /// Persist `bytes` under `file_name`, returning where they went.
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Writes exports into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageSink for DirectorySink {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create export dir {}", self.dir.display()))?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[derive(Debug)]
struct ReadbackDenied;

/// Isolated copy of the composite taken for one export.
#[derive(Debug)]
struct ScratchSurface {
    pixels: RgbaImage,
    tainted: bool,
}

impl ScratchSurface {
    fn copy_of(surface: &CompositeSurface) -> Self {
        Self {
            pixels: surface.pixels().clone(),
            tainted: surface.is_tainted(),
        }
    }

    fn read_pixels(&self) -> std::result::Result<&RgbaImage, ReadbackDenied> {
        if self.tainted {
            Err(ReadbackDenied)
        } else {
            Ok(&self.pixels)
        }
    }
}

/// Source of epoch milliseconds for export names.
pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

pub struct Exporter {
    prefix: String,
    sink: Box<dyn ImageSink>,
    clock: Clock,
    last_stamp: Option<i64>,
}

impl Exporter {
    pub fn new(prefix: impl Into<String>, sink: Box<dyn ImageSink>) -> Self {
        Self::with_clock(
            prefix,
            sink,
            Box::new(|| chrono::Utc::now().timestamp_millis()),
        )
    }

    pub fn with_clock(prefix: impl Into<String>, sink: Box<dyn ImageSink>, clock: Clock) -> Self {
        Self {
            prefix: prefix.into(),
            sink,
            clock,
            last_stamp: None,
        }
    }

    /// Encode the current composite as PNG and hand it to the sink.
    pub fn export_as_image(
        &mut self,
        state: &SessionState,
        surface: &CompositeSurface,
    ) -> std::result::Result<PathBuf, SessionError> {
        if !state.user_loaded() {
            return Err(SessionError::NothingToExport);
        }
        let (width, height) = surface.dimensions();
        if width == 0 || height == 0 {
            return Err(SessionError::ExportFailed(
                "the composite has not been rendered yet".to_string(),
            ));
        }

        let scratch = ScratchSurface::copy_of(surface);
        let pixels = scratch.read_pixels().map_err(|ReadbackDenied| {
            warn!("export refused: composite contains non-readable pixels");
            SessionError::ExportSecurityRestricted
        })?;
        let bytes = encode_png(pixels).map_err(|e| SessionError::ExportFailed(format!("{e:#}")))?;

        let stamp = self.next_stamp();
        let file_name = format!("{}-{}.png", self.prefix, stamp);
        let saved = self
            .sink
            .save(&file_name, &bytes)
            .map_err(|e| SessionError::ExportFailed(format!("{e:#}")))?;
        drop(scratch);
        debug!("scratch surface released");
        info!(path = %saved.display(), width, height, "composite exported");
        Ok(saved)
    }

    // Epoch millis, bumped when the clock has not advanced since the last export.
    fn next_stamp(&mut self) -> i64 {
        let now = (self.clock)();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    pixels
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(buf)
}
