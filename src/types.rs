//! Shared types passed between the dispatcher, the post-decode processor
//! and the caller.

use crate::format::FormatTag;
use crate::imaging::Layout;
use crate::metadata::ImageMetadata;
use std::time::Duration;

/// A decoded frame plus everything known about where it came from.
///
/// Pixels are tightly packed with 1, 3 or 4 bytes per pixel in R, G, B(, A)
/// order. After [`finalize`](crate::process::finalize) the pixels are
/// rotated and, unless processing is disabled, [`layout`](Self::layout) and
/// [`display`](Self::display) describe what goes on screen.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub format: FormatTag,
    /// Index of the frame actually decoded, after clamping.
    pub frame_index: u32,
    pub frame_count: u32,
    /// Display time of this frame in milliseconds; 0 for stills.
    pub duration_ms: u32,
    pub animated: bool,
    pub metadata: Option<ImageMetadata>,
    /// First 8 bytes of the file's SHA-256 for JPEG, 0 otherwise.
    pub content_hash: u64,
    /// Time spent reading and decoding.
    pub load_duration: Duration,
    /// Clockwise rotation applied to `pixels`, in degrees.
    pub rotation: i32,
    pub layout: Option<Layout>,
    pub(crate) display: Option<DisplayBuffer>,
}

/// RGBA pixels of the visible window, rendered for one [`Layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayBuffer {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
}

impl DecodedImage {
    pub fn bytes_per_pixel(&self) -> u8 {
        self.channels
    }

    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    /// The display buffer rendered for the current layout, if any.
    pub fn display_buffer(&self) -> Option<&DisplayBuffer> {
        self.display.as_ref()
    }
}
