//! Pure calculation functions for display geometry.
//!
//! All functions here are pure and testable without any I/O or images.
//! They turn an image size plus the viewer's zoom, viewport and pan offset
//! into a [`Layout`]: how large the image is rendered, which window of it is
//! visible, and where that window starts.

use serde::{Deserialize, Serialize};

/// Largest rendered size along either axis.
pub const MAX_RENDER_DIMENSION: i64 = 65535;

/// How the target size is chosen when no explicit zoom factor is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoZoomMode {
    /// Whole image visible, scaled up or down to touch the viewport.
    #[default]
    Fit,
    /// Like `Fit`, but never enlarges.
    FitNoZoom,
    /// Viewport fully covered, cropping the overhang.
    Fill,
    /// Like `Fill`, but never enlarges.
    FillNoZoom,
}

/// Where and how large the image is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Layout {
    /// Rendered size of the whole image.
    pub full: (u32, u32),
    /// Visible window: `full` clipped to the viewport.
    pub clip: (u32, u32),
    /// Pan offset after clamping.
    pub offset: (i32, i32),
    /// Top-left corner of the visible window inside the rendered image.
    pub origin: (u32, u32),
}

/// Size the image takes under an auto-zoom policy.
///
/// # Examples
/// ```
/// # use pixload::imaging::{AutoZoomMode, auto_zoom_size};
/// // 4000x3000 fitted into 800x600 → 800x600
/// assert_eq!(auto_zoom_size((4000, 3000), (800, 600), AutoZoomMode::Fit), (800, 600));
///
/// // Small images are not enlarged under FitNoZoom
/// assert_eq!(auto_zoom_size((200, 100), (800, 600), AutoZoomMode::FitNoZoom), (200, 100));
/// ```
pub fn auto_zoom_size(image: (u32, u32), viewport: (u32, u32), mode: AutoZoomMode) -> (i64, i64) {
    let (w, h) = (image.0.max(1) as f64, image.1.max(1) as f64);
    let (vw, vh) = (viewport.0 as f64, viewport.1 as f64);

    let fit = (vw / w).min(vh / h);
    let fill = (vw / w).max(vh / h);
    let scale = match mode {
        AutoZoomMode::Fit => fit,
        AutoZoomMode::FitNoZoom => fit.min(1.0),
        AutoZoomMode::Fill => fill,
        AutoZoomMode::FillNoZoom => fill.min(1.0),
    };
    ((w * scale).round() as i64, (h * scale).round() as i64)
}

/// Target size for an explicit zoom factor, or an auto-zoom policy when
/// `zoom` is negative.
pub fn target_size(
    image: (u32, u32),
    viewport: (u32, u32),
    zoom: f64,
    mode: AutoZoomMode,
) -> (u32, u32) {
    let (w, h) = if zoom < 0.0 {
        auto_zoom_size(image, viewport, mode)
    } else {
        (
            (image.0 as f64 * zoom + 0.5) as i64,
            (image.1 as f64 * zoom + 0.5) as i64,
        )
    };
    (clamp_dimension(w), clamp_dimension(h))
}

fn clamp_dimension(v: i64) -> u32 {
    v.clamp(1, MAX_RENDER_DIMENSION) as u32
}

/// Largest pan offset that keeps the clip window inside the rendered image.
pub fn offset_limit(full: u32, clip: u32) -> i32 {
    (full.saturating_sub(clip) / 2) as i32
}

/// Clamp a pan offset into `[-limit, +limit]`.
pub fn limit_offset(offset: i32, full: u32, clip: u32) -> i32 {
    let max = offset_limit(full, clip);
    offset.clamp(-max, max)
}

/// Compute the full layout for an image of size `image`.
///
/// The clip window is centred and then shifted against the pan offset, so a
/// positive offset reveals content towards the top-left.
pub fn compute_layout(
    image: (u32, u32),
    viewport: (u32, u32),
    zoom: f64,
    mode: AutoZoomMode,
    offset: (i32, i32),
) -> Layout {
    let full = target_size(image, viewport, zoom, mode);
    let clip = (full.0.min(viewport.0.max(1)), full.1.min(viewport.1.max(1)));
    let offset = (
        limit_offset(offset.0, full.0, clip.0),
        limit_offset(offset.1, full.1, clip.1),
    );
    let origin = (
        (offset_limit(full.0, clip.0) - offset.0) as u32,
        (offset_limit(full.1, clip.1) - offset.1) as u32,
    );
    Layout {
        full,
        clip,
        offset,
        origin,
    }
}
