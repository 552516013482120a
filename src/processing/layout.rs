/// Where the user photo lands on the frame surface, in surface pixels.
///
/// The rect may extend past the surface on any side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Integer pixel rect `[x0, x1) x [y0, y1)` inside the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Scale the user photo to `zoom` times the frame width, keep its aspect
/// ratio, and center it on both axes.
pub fn place_user_image(
    frame_w: u32,
    frame_h: u32,
    user_w: u32,
    user_h: u32,
    zoom: f64,
) -> Placement {
    let fw = f64::from(frame_w);
    let fh = f64::from(frame_h);
    let width = fw * zoom;
    let height = width * (f64::from(user_h) / f64::from(user_w.max(1)));
    Placement {
        x: (fw - width) / 2.0,
        y: (fh - height) / 2.0,
        width,
        height,
    }
}

impl Placement {
    /// The part of this rect that falls on a `surface_w` x `surface_h` surface,
    /// snapped to whole pixels. `None` when nothing is visible.
    pub fn visible_in(&self, surface_w: u32, surface_h: u32) -> Option<PixelRect> {
        let (x0, x1) = snap_span(self.x, self.width, surface_w)?;
        let (y0, y1) = snap_span(self.y, self.height, surface_h)?;
        Some(PixelRect { x0, y0, x1, y1 })
    }
}

fn snap_span(start: f64, len: f64, limit: u32) -> Option<(u32, u32)> {
    if len == f64::INFINITY {
        // Centered and unbounded: covers the whole axis.
        return (limit > 0).then_some((0, limit));
    }
    if !len.is_finite() {
        return None;
    }
    let lo = start.round().max(0.0);
    let hi = (start + len).round().min(f64::from(limit));
    if hi <= lo {
        return None;
    }
    Some((lo as u32, hi as u32))
}
