use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Basename of a frame asset, e.g. `1styear.png`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct FrameId(String);

impl FrameId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Whether pixels drawn from a location may be read back for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Readback {
    #[default]
    Allowed,
    Denied,
}

impl Readback {
    pub const fn is_denied(self) -> bool {
        matches!(self, Self::Denied)
    }
}

/// Which of the two locations a frame is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAttempt {
    Primary,
    Fallback,
}

/// A concrete place to fetch frame bytes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    pub path: PathBuf,
    pub readback: Readback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ZoomOptions {
    /// Zoom applied before the user touches the control.
    pub default: f64,
    /// Lower bound enforced by the CLI; the renderer itself is unbounded.
    pub min: f64,
    /// Upper bound enforced by the CLI.
    pub max: f64,
}

impl ZoomOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.min.is_finite() && self.min > 0.0,
            "zoom.min must be a positive number"
        );
        ensure!(
            self.max.is_finite() && self.max >= self.min,
            "zoom.max must be a finite number no smaller than zoom.min"
        );
        ensure!(
            (self.min..=self.max).contains(&self.default),
            "zoom.default must lie within [zoom.min, zoom.max]"
        );
        Ok(())
    }

    /// Clamp a requested zoom into the configured range.
    pub fn clamp(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min, self.max)
    }
}

impl Default for ZoomOptions {
    fn default() -> Self {
        Self {
            default: 1.0,
            min: 0.1,
            max: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExportOptions {
    /// Directory exported composites are written into.
    pub dir: PathBuf,
    /// File name prefix, followed by `-<epoch millis>.png`.
    pub prefix: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: "mrsp-dpblast".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Primary root frames are fetched from.
    pub asset_root: PathBuf,
    /// Local root tried once when the primary location fails.
    pub fallback_root: PathBuf,
    /// Readback policy of the primary root. The fallback root is always readable.
    pub primary_readback: Readback,
    /// The selectable frames, by basename.
    pub frames: Vec<FrameId>,
    /// Frame selected at startup; the first entry of `frames` when absent.
    pub default_frame: Option<FrameId>,
    pub zoom: ZoomOptions,
    pub export: ExportOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(!self.frames.is_empty(), "frames must list at least one frame");
        for frame in &self.frames {
            ensure!(
                is_plain_basename(frame.as_str()),
                "frame '{}' must be a plain file name",
                frame
            );
        }
        if let Some(default) = &self.default_frame {
            ensure!(
                self.frames.contains(default),
                "default-frame '{}' must be one of the configured frames",
                default
            );
        }
        ensure!(
            !self.export.prefix.trim().is_empty(),
            "export.prefix must not be empty"
        );
        self.zoom.validate()?;
        Ok(self)
    }

    pub fn initial_frame(&self) -> Option<&FrameId> {
        self.default_frame.as_ref().or_else(|| self.frames.first())
    }

    pub fn knows_frame(&self, frame: &FrameId) -> bool {
        self.frames.contains(frame)
    }

    /// Resolve a frame to the location used by the given attempt.
    ///
    /// Both attempts share the frame's basename.
    pub fn resolve_frame(&self, frame: &FrameId, attempt: FrameAttempt) -> AssetLocation {
        match attempt {
            FrameAttempt::Primary => AssetLocation {
                path: self.asset_root.join(frame.as_str()),
                readback: self.primary_readback,
            },
            FrameAttempt::Fallback => AssetLocation {
                path: self.fallback_root.join(frame.as_str()),
                readback: Readback::Allowed,
            },
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            fallback_root: PathBuf::from("."),
            primary_readback: Readback::Allowed,
            frames: vec![FrameId::new("1styear.png")],
            default_frame: None,
            zoom: ZoomOptions::default(),
            export: ExportOptions::default(),
        }
    }
}

fn is_plain_basename(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path.file_name().and_then(|n| n.to_str()) == Some(name)
        && name != "."
        && name != ".."
}
