//! Two-layer compositing: the user photo underneath, the frame on top.

use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::{RgbaImage, imageops};
use tracing::debug;

use crate::processing::layout::{PixelRect, Placement, place_user_image};
use crate::session::SessionState;

/// The pixel buffer holding the latest composite.
#[derive(Debug, Clone, Default)]
pub struct CompositeSurface {
    pixels: RgbaImage,
    tainted: bool,
}

impl CompositeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// True when a drawn source forbids pixel readback.
    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// Raw pixels, for display. Exports go through [`crate::export::Exporter`].
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Redraw `surface` from `state`.
///
/// Returns `Ok(false)` without touching the surface unless both the frame and
/// the user photo are ready.
pub fn render(state: &SessionState, surface: &mut CompositeSurface) -> Result<bool> {
    let Some((frame, user)) = state.renderable() else {
        return Ok(false);
    };
    let (fw, fh) = frame.pixels.dimensions();

    let mut canvas = RgbaImage::new(fw, fh);
    let placement = place_user_image(fw, fh, user.width(), user.height(), state.zoom());
    draw_user_layer(&mut canvas, &user.pixels, &placement)?;
    imageops::overlay(&mut canvas, &*frame.pixels, 0, 0);

    surface.pixels = canvas;
    surface.tainted = frame.readback.is_denied() || user.readback.is_denied();
    debug!(
        width = fw,
        height = fh,
        zoom = state.zoom(),
        x = placement.x,
        y = placement.y,
        tainted = surface.tainted,
        "composite rendered"
    );
    Ok(true)
}

fn draw_user_layer(canvas: &mut RgbaImage, user: &RgbaImage, placement: &Placement) -> Result<()> {
    let (cw, ch) = canvas.dimensions();
    let Some(visible) = placement.visible_in(cw, ch) else {
        debug!(?placement, "user photo entirely off-surface");
        return Ok(());
    };
    if user.width() == 0 || user.height() == 0 {
        return Ok(());
    }

    let uw = f64::from(user.width());
    let uh = f64::from(user.height());
    // Source pixels per surface pixel.
    let sx = uw / placement.width;
    let sy = uh / placement.height;
    let left =
        source_coord(f64::from(visible.x0), placement.x, placement.width, uw).clamp(0.0, uw);
    let top =
        source_coord(f64::from(visible.y0), placement.y, placement.height, uh).clamp(0.0, uh);
    let crop_w = (f64::from(visible.width()) * sx).min(uw - left);
    let crop_h = (f64::from(visible.height()) * sy).min(uh - top);

    let patch = if crop_w >= 1.0 && crop_h >= 1.0 {
        resample_crop(user, left, top, crop_w, crop_h, &visible)?
    } else {
        sample_nearest(user, placement, &visible)
    };
    imageops::replace(canvas, &patch, i64::from(visible.x0), i64::from(visible.y0));
    Ok(())
}

fn resample_crop(
    source: &RgbaImage,
    left: f64,
    top: f64,
    crop_w: f64,
    crop_h: f64,
    visible: &PixelRect,
) -> Result<RgbaImage> {
    let (target_w, target_h) = (visible.width(), visible.height());
    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for user photo")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom))
        .crop(left, top, crop_w, crop_h);
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("user photo resize failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| anyhow::anyhow!("failed to construct resized user photo"))
}

// Less than one source pixel spans the visible area; convolution has nothing
// to filter, so pick the covering source pixel for each surface pixel.
fn sample_nearest(source: &RgbaImage, placement: &Placement, visible: &PixelRect) -> RgbaImage {
    let max_x = source.width() - 1;
    let max_y = source.height() - 1;
    let uw = f64::from(source.width());
    let uh = f64::from(source.height());
    RgbaImage::from_fn(visible.width(), visible.height(), |dx, dy| {
        let px = source_coord(
            f64::from(visible.x0 + dx) + 0.5,
            placement.x,
            placement.width,
            uw,
        );
        let py = source_coord(
            f64::from(visible.y0 + dy) + 0.5,
            placement.y,
            placement.height,
            uh,
        );
        let ix = (px.max(0.0) as u32).min(max_x);
        let iy = (py.max(0.0) as u32).min(max_y);
        *source.get_pixel(ix, iy)
    })
}

// Source coordinate under surface position `pos` along one axis.
fn source_coord(pos: f64, start: f64, len: f64, src_len: f64) -> f64 {
    if len.is_finite() {
        (pos - start) * src_len / len
    } else {
        // An unbounded span is centered, so only its middle is on the surface.
        src_len / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FrameId, Readback};
    use crate::events::DecodedImage;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    fn assert_near(actual: Rgba<u8>, expected: Rgba<u8>) {
        for (a, e) in actual.0.iter().zip(expected.0.iter()) {
            assert!(a.abs_diff(*e) <= 2, "{actual:?} vs {expected:?}");
        }
    }

    fn ready_state(frame: RgbaImage, user: RgbaImage, zoom: f64) -> SessionState {
        let mut state = SessionState::new(zoom);
        let seq = state.begin_frame_load(FrameId::new("frame.png"));
        state.frame.complete(
            seq,
            Ok(DecodedImage::new("frame", frame, Readback::Allowed)),
        );
        let seq = state.begin_user_load();
        state
            .user
            .complete(seq, Ok(DecodedImage::new("user", user, Readback::Allowed)));
        state
    }

    #[test]
    fn noop_until_both_ready() {
        let mut state = SessionState::default();
        let mut surface = CompositeSurface::new();
        assert!(!render(&state, &mut surface).unwrap());
        let seq = state.begin_user_load();
        state.user.complete(
            seq,
            Ok(DecodedImage::new(
                "user",
                RgbaImage::new(2, 2),
                Readback::Allowed,
            )),
        );
        assert!(!render(&state, &mut surface).unwrap());
        assert_eq!(surface.dimensions(), (0, 0));
    }

    #[test]
    fn frame_defines_surface_and_covers_photo() {
        // Transparent frame with an opaque top row.
        let mut frame = RgbaImage::new(4, 6);
        for x in 0..4 {
            frame.put_pixel(x, 0, Rgba([0, 0, 255, 255]));
        }
        let user = RgbaImage::from_pixel(8, 4, RED);
        let state = ready_state(frame, user, 1.0);
        let mut surface = CompositeSurface::new();
        assert!(render(&state, &mut surface).unwrap());
        assert_eq!(surface.dimensions(), (4, 6));
        // Photo occupies rows 2..4; the rest stays clear.
        assert_eq!(*surface.pixels().get_pixel(1, 0), Rgba([0, 0, 255, 255]));
        assert_eq!(*surface.pixels().get_pixel(1, 1), CLEAR);
        assert_near(*surface.pixels().get_pixel(1, 2), RED);
        assert_near(*surface.pixels().get_pixel(3, 3), RED);
        assert_eq!(*surface.pixels().get_pixel(0, 4), CLEAR);
    }

    #[test]
    fn extreme_zoom_fills_from_covering_pixel() {
        let frame = RgbaImage::new(10, 10);
        let user = RgbaImage::from_pixel(3, 3, RED);
        let state = ready_state(frame, user, 1e12);
        let mut surface = CompositeSurface::new();
        assert!(render(&state, &mut surface).unwrap());
        assert!(surface.pixels().pixels().all(|p| *p == RED));
    }

    #[test]
    fn render_is_idempotent() {
        let frame = RgbaImage::from_fn(30, 40, |x, y| {
            if (x + y) % 3 == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([10, 200, 30, 128])
            }
        });
        let user = RgbaImage::from_fn(17, 9, |x, y| Rgba([(x * 13) as u8, (y * 27) as u8, 99, 255]));
        let state = ready_state(frame, user, 1.37);
        let mut surface = CompositeSurface::new();
        render(&state, &mut surface).unwrap();
        let first = surface.pixels().clone();
        render(&state, &mut surface).unwrap();
        assert_eq!(first.as_raw(), surface.pixels().as_raw());
    }

    #[test]
    fn taint_follows_sources() {
        let mut state = ready_state(RgbaImage::new(2, 2), RgbaImage::new(2, 2), 1.0);
        let seq = state.begin_frame_load(FrameId::new("remote.png"));
        state.frame.complete(
            seq,
            Ok(DecodedImage::new(
                "remote",
                RgbaImage::new(2, 2),
                Readback::Denied,
            )),
        );
        let mut surface = CompositeSurface::new();
        render(&state, &mut surface).unwrap();
        assert!(surface.is_tainted());
    }

    #[test]
    fn overflowing_height_still_draws_photo() {
        let user = RgbaImage::from_pixel(2, 8, RED);
        let state = ready_state(RgbaImage::new(40, 60), user, f64::MAX / 80.0);
        let mut surface = CompositeSurface::new();
        assert!(render(&state, &mut surface).unwrap());
        for (x, y) in [(0, 0), (20, 30), (39, 59)] {
            assert_eq!(*surface.pixels().get_pixel(x, y), RED);
        }
    }
}
