//! Codec traits and shared types.
//!
//! A [`Codec`] turns the bytes of a file into a [`FrameDecoder`]. The
//! decoder hands out individual frames on request, so an animated file that
//! stays open in the [decoder cache](crate::cache) can serve frame after
//! frame without touching the disk again.
//!
//! Codecs report failure through [`CodecError`], which keeps the three
//! outcomes the dispatcher cares about apart:
//!
//! - [`CodecError::Declined`]: the data is not something this codec handles.
//!   Benign; the next fallback step runs.
//! - [`CodecError::OutOfMemory`]: a size limit or allocation failure.
//! - [`CodecError::Fault`]: an unexpected error inside the codec.

use crate::metadata::ImageMetadata;
use std::collections::TryReserveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("declined: {0}")]
    Declined(String),
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("decoder fault: {0}")]
    Fault(String),
}

impl From<image::ImageError> for CodecError {
    fn from(err: image::ImageError) -> Self {
        use image::ImageError;
        match err {
            ImageError::Limits(e) => CodecError::OutOfMemory(e.to_string()),
            ImageError::Encoding(e) => CodecError::Fault(e.to_string()),
            ImageError::Decoding(e) => CodecError::Declined(e.to_string()),
            ImageError::Unsupported(e) => CodecError::Declined(e.to_string()),
            ImageError::Parameter(e) => CodecError::Declined(e.to_string()),
            ImageError::IoError(e) => CodecError::Declined(e.to_string()),
        }
    }
}

impl From<TryReserveError> for CodecError {
    fn from(err: TryReserveError) -> Self {
        CodecError::OutOfMemory(err.to_string())
    }
}

/// One decoded frame, tightly packed, channel order R, G, B(, A).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel: 1 (gray), 3 (RGB) or 4 (RGBA).
    pub channels: u8,
    /// Display time of this frame; 0 for still images.
    pub duration_ms: u32,
}

impl RawFrame {
    /// Wrap a pixel buffer, checking that its length matches the geometry.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self, CodecError> {
        let expected = width as usize * height as usize * channels as usize;
        if width == 0 || height == 0 || !matches!(channels, 1 | 3 | 4) || pixels.len() != expected {
            return Err(CodecError::Fault(format!(
                "frame buffer of {} bytes does not match {width}x{height}x{channels}",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
            channels,
            duration_ms: 0,
        })
    }

    pub fn with_duration(mut self, duration_ms: u32) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// An opened image that can produce its frames.
///
/// Decoders are created and used on the loader's worker thread only, so
/// they need not be `Send`.
pub trait FrameDecoder {
    /// Number of frames; at least 1.
    fn frame_count(&self) -> u32;

    /// Decode frame `index`. Callers clamp the index into range first.
    fn decode_frame(&mut self, index: u32) -> Result<RawFrame, CodecError>;
}

/// A decoder implementation for one family of encodings.
pub trait Codec: Send {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Parse `data` and return a decoder positioned on the first frame.
    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError>;
}

/// A decoder together with metadata pulled from the file when it was opened.
///
/// This is what the decoder cache keeps alive between frame requests.
pub struct OpenDecoder {
    pub decoder: Box<dyn FrameDecoder>,
    pub metadata: Option<ImageMetadata>,
}

/// A single-frame image decoded eagerly at open time.
pub struct StillImage {
    frame: Option<RawFrame>,
}

impl StillImage {
    pub fn new(frame: RawFrame) -> Self {
        Self { frame: Some(frame) }
    }
}

impl FrameDecoder for StillImage {
    fn frame_count(&self) -> u32 {
        1
    }

    fn decode_frame(&mut self, _index: u32) -> Result<RawFrame, CodecError> {
        self.frame
            .take()
            .ok_or_else(|| CodecError::Declined("still image already consumed".into()))
    }
}

/// Placeholder for a codec slot with no decoder compiled in.
///
/// Declines everything, so fallback chains move on as if the file were not
/// in this format.
pub struct Unavailable {
    name: &'static str,
}

impl Unavailable {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Codec for Unavailable {
    fn name(&self) -> &'static str {
        self.name
    }

    fn open(&self, _data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        Err(CodecError::Declined(format!(
            "no {} decoder installed",
            self.name
        )))
    }
}
