//! Post-decode geometry.
//!
//! [`finalize`] runs once per decoded image on the worker thread:
//!
//! ```text
//! 1. rotate       source rotation + user rotation, multiples of 90 only
//! 2. stop here    when display processing is disabled
//! 3. target size  explicit zoom, or auto-zoom when zoom < 0
//! 4. clamp        each axis into [1, 65535]
//! 5. clip         min(size, viewport) per axis
//! 6. pan          offset clamped to ±max(0, (size - clip) / 2)
//! 7. render       visible window scaled with Lanczos3, expanded to RGBA
//! ```
//!
//! Steps 3 to 6 are the pure functions in [`crate::imaging::calculations`].
//! Rendering only touches the part of the source that ends up visible, so a
//! deep zoom into a large photo stays cheap.

use crate::config::DisplayConfig;
use crate::imaging::pixels::{rotate, to_rgba};
use crate::imaging::{AutoZoomMode, Layout, compute_layout};
use crate::types::{DecodedImage, DisplayBuffer};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};
use std::collections::TryReserveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("rotation by {0} degrees is not a multiple of 90")]
    UnsupportedRotation(i32),
    #[error("out of memory rendering the display buffer: {0}")]
    OutOfMemory(String),
}

impl From<TryReserveError> for FinalizeError {
    fn from(err: TryReserveError) -> Self {
        FinalizeError::OutOfMemory(err.to_string())
    }
}

/// How the caller wants the image shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    /// Explicit zoom factor; negative selects auto-zoom.
    pub zoom: f64,
    /// Auto-zoom policy; `None` uses the configured default.
    pub auto_zoom: Option<AutoZoomMode>,
    pub viewport: (u32, u32),
    /// Pan offset from the centred position, in rendered pixels.
    pub offset: (i32, i32),
    /// Rotation the file itself calls for (e.g. from EXIF), in degrees.
    pub rotation: i32,
    /// Rotation the user applied on top, in degrees.
    pub user_rotation: i32,
}

impl ViewParams {
    /// Auto-zoom into a viewport, no pan, no rotation.
    pub fn fit(width: u32, height: u32) -> Self {
        Self {
            zoom: -1.0,
            auto_zoom: None,
            viewport: (width, height),
            offset: (0, 0),
            rotation: 0,
            user_rotation: 0,
        }
    }
}

/// Normalise a rotation sum into 0, 90, 180 or 270.
pub fn normalize_rotation(degrees: i32) -> Result<i32, FinalizeError> {
    if degrees % 90 != 0 {
        return Err(FinalizeError::UnsupportedRotation(degrees));
    }
    Ok(degrees.rem_euclid(360))
}

/// Rotate, lay out and render `image` for display.
///
/// On error the image is left in an unspecified state and must be discarded.
pub fn finalize(
    image: &mut DecodedImage,
    view: &ViewParams,
    config: &DisplayConfig,
) -> Result<(), FinalizeError> {
    let degrees = normalize_rotation(view.rotation.saturating_add(view.user_rotation))?;
    if degrees != 0 {
        let (pixels, width, height) = rotate(
            &image.pixels,
            image.width,
            image.height,
            image.channels,
            (degrees / 90) as u32,
        )?;
        image.pixels = pixels;
        image.width = width;
        image.height = height;
    }
    image.rotation = degrees;

    if !config.process_after_load {
        return Ok(());
    }

    let mode = view.auto_zoom.unwrap_or(config.auto_zoom);
    let layout = compute_layout(
        (image.width, image.height),
        view.viewport,
        view.zoom,
        mode,
        view.offset,
    );
    image.layout = Some(layout);
    image.display(layout)?;
    Ok(())
}

impl DecodedImage {
    /// The RGBA display buffer for `layout`, rendered on first use and
    /// re-rendered only when the layout changes.
    pub fn display(&mut self, layout: Layout) -> Result<&DisplayBuffer, FinalizeError> {
        let buffer = match self.display.take() {
            Some(cached) if cached.layout == layout => cached,
            _ => render(self, layout)?,
        };
        Ok(self.display.insert(buffer))
    }
}

/// Source rectangle (x, y, width, height) that maps onto the clip window.
fn source_region(image: (u32, u32), layout: &Layout) -> (u32, u32, u32, u32) {
    let sx = image.0 as f64 / layout.full.0 as f64;
    let sy = image.1 as f64 / layout.full.1 as f64;
    let x0 = ((layout.origin.0 as f64 * sx).floor() as u32).min(image.0 - 1);
    let y0 = ((layout.origin.1 as f64 * sy).floor() as u32).min(image.1 - 1);
    let x1 = (((layout.origin.0 + layout.clip.0) as f64 * sx).ceil() as u32).clamp(x0 + 1, image.0);
    let y1 = (((layout.origin.1 + layout.clip.1) as f64 * sy).ceil() as u32).clamp(y0 + 1, image.1);
    (x0, y0, x1 - x0, y1 - y0)
}

fn render_region<P>(
    pixels: &[u8],
    size: (u32, u32),
    region: (u32, u32, u32, u32),
    out: (u32, u32),
) -> Option<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let source = ImageBuffer::<P, &[u8]>::from_raw(size.0, size.1, pixels)?;
    let (x, y, w, h) = region;
    let cropped: ImageBuffer<P, Vec<u8>> =
        ImageBuffer::from_fn(w, h, |i, j| *source.get_pixel(x + i, y + j));
    let scaled = if cropped.dimensions() == out {
        cropped
    } else {
        imageops::resize(&cropped, out.0, out.1, FilterType::Lanczos3)
    };
    Some(scaled.into_raw())
}

/// Bytes alive at once while rendering: the cropped copy plus the scaled
/// RGBA output.
fn render_footprint(region: (u32, u32, u32, u32), clip: (u32, u32), channels: u8) -> usize {
    let area = |w: u32, h: u32, bytes: usize| {
        (w as usize).saturating_mul(h as usize).saturating_mul(bytes)
    };
    area(region.2, region.3, channels as usize).saturating_add(area(clip.0, clip.1, 4))
}

fn render(image: &DecodedImage, layout: Layout) -> Result<DisplayBuffer, FinalizeError> {
    let (cw, ch) = layout.clip;
    let region = source_region((image.width, image.height), &layout);

    // Reserve the peak allocation up front so a failure surfaces as an error
    // instead of an abort inside the resampler.
    let mut headroom: Vec<u8> = Vec::new();
    headroom.try_reserve_exact(render_footprint(region, layout.clip, image.channels))?;
    drop(headroom);

    let size = (image.width, image.height);
    let rendered = match image.channels {
        1 => render_region::<Luma<u8>>(&image.pixels, size, region, layout.clip),
        3 => render_region::<Rgb<u8>>(&image.pixels, size, region, layout.clip),
        _ => render_region::<Rgba<u8>>(&image.pixels, size, region, layout.clip),
    };
    let Some(rendered) = rendered else {
        return Err(FinalizeError::OutOfMemory(format!(
            "{} byte buffer does not hold a {}x{}x{} image",
            image.pixels.len(),
            image.width,
            image.height,
            image.channels
        )));
    };
    Ok(DisplayBuffer {
        pixels: to_rgba(&rendered, image.channels)?,
        width: cw,
        height: ch,
        layout,
    })
}
