//! Codecs backed by the pure Rust decoders of the `image` crate.
//!
//! ## Crate mapping
//!
//! | Codec | Crate / function |
//! |---|---|
//! | [`ImageCodec`] (JPEG, BMP, TGA, QOI) | `ImageReader::with_format` |
//! | [`WebpCodec`] | `WebPDecoder`, animated files via `AnimationDecoder` |
//! | [`PngCodec`] | `PngDecoder`, APNG via `PngDecoder::apng` |
//! | [`NativeCodec`] | `ImageReader::with_guessed_format`, GIF via `GifDecoder` |
//!
//! Animated files are served by an [`Animation`], which composites frames
//! one at a time as they are asked for. Frame delays of zero fall back to
//! 100 ms. Every codec checks the canvas size against the pixel budget
//! before decoding any pixels.

use super::backend::{Codec, CodecError, FrameDecoder, RawFrame, StillImage};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, Frame, Frames, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::sync::Arc;

/// Frame delay used when the container specifies none.
pub const DEFAULT_FRAME_DELAY_MS: u32 = 100;

/// Convert a decoded image into a tightly packed frame with 1, 3 or 4
/// channels, whichever loses nothing.
pub(crate) fn frame_from_dynamic(img: DynamicImage) -> Result<RawFrame, CodecError> {
    let (width, height) = (img.width(), img.height());
    match img {
        DynamicImage::ImageLuma8(buf) => RawFrame::new(buf.into_raw(), width, height, 1),
        DynamicImage::ImageRgb8(buf) => RawFrame::new(buf.into_raw(), width, height, 3),
        DynamicImage::ImageRgba8(buf) => RawFrame::new(buf.into_raw(), width, height, 4),
        other if other.color().has_alpha() => {
            RawFrame::new(other.into_rgba8().into_raw(), width, height, 4)
        }
        other if other.color().has_color() => {
            RawFrame::new(other.into_rgb8().into_raw(), width, height, 3)
        }
        other => RawFrame::new(other.into_luma8().into_raw(), width, height, 1),
    }
}

fn frame_delay_ms(frame: &Frame) -> u32 {
    let (numer, denom) = frame.delay().numer_denom_ms();
    match numer.checked_div(denom) {
        Some(ms) if ms > 0 => ms,
        _ => DEFAULT_FRAME_DELAY_MS,
    }
}

fn raw_from_frame(frame: Frame) -> Result<RawFrame, CodecError> {
    let delay = frame_delay_ms(&frame);
    let buf = frame.into_buffer();
    let (w, h) = buf.dimensions();
    Ok(RawFrame::new(buf.into_raw(), w, h, 4)?.with_duration(delay))
}

/// Refuse canvases above `max_pixels` before anything is decoded.
fn check_pixels((width, height): (u32, u32), max_pixels: u64) -> Result<(), CodecError> {
    if width as u64 * height as u64 > max_pixels {
        return Err(CodecError::OutOfMemory(format!(
            "{width}x{height} exceeds the {max_pixels} pixel budget"
        )));
    }
    Ok(())
}

type FileCursor = Cursor<Arc<[u8]>>;

/// Starts a fresh frame iterator over the file bytes.
type Rewind = fn(FileCursor) -> Result<Frames<'static>, CodecError>;

fn gif_frames(cursor: FileCursor) -> Result<Frames<'static>, CodecError> {
    Ok(GifDecoder::new(cursor)?.into_frames())
}

fn apng_frames(cursor: FileCursor) -> Result<Frames<'static>, CodecError> {
    Ok(PngDecoder::new(cursor)?.apng()?.into_frames())
}

fn webp_frames(cursor: FileCursor) -> Result<Frames<'static>, CodecError> {
    Ok(WebPDecoder::new(cursor)?.into_frames())
}

/// An animation composited on demand.
///
/// Only the frame last handed out is kept in memory. Asking for a later
/// frame composites forward from the current position; asking for an earlier
/// one rewinds to the first frame. Opening walks the file once to count its
/// frames, discarding each as it goes.
pub struct Animation {
    data: Arc<[u8]>,
    rewind: Rewind,
    frames: Frames<'static>,
    count: u32,
    /// Index of the frame `frames` yields next.
    next: u32,
    current: Option<RawFrame>,
}

impl Animation {
    fn open(data: Vec<u8>, rewind: Rewind) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let data: Arc<[u8]> = data.into();
        let mut count = 0u32;
        for frame in rewind(Cursor::new(Arc::clone(&data)))? {
            frame?;
            count += 1;
        }
        if count == 0 {
            return Err(CodecError::Declined("animation has no frames".into()));
        }
        let frames = rewind(Cursor::new(Arc::clone(&data)))?;
        Ok(Box::new(Self {
            data,
            rewind,
            frames,
            count,
            next: 0,
            current: None,
        }))
    }
}

impl FrameDecoder for Animation {
    fn frame_count(&self) -> u32 {
        self.count
    }

    fn decode_frame(&mut self, index: u32) -> Result<RawFrame, CodecError> {
        if index < self.next {
            if index + 1 == self.next {
                if let Some(frame) = &self.current {
                    return Ok(frame.clone());
                }
            }
            self.frames = (self.rewind)(Cursor::new(Arc::clone(&self.data)))?;
            self.next = 0;
        }
        self.current = None;
        while self.next <= index {
            let frame = self.frames.next().ok_or_else(|| {
                CodecError::Declined(format!("animation ended before frame {index}"))
            })??;
            self.next += 1;
            if self.next > index {
                self.current = Some(raw_from_frame(frame)?);
            }
        }
        self.current
            .clone()
            .ok_or_else(|| CodecError::Declined(format!("frame {index} out of range")))
    }
}

fn decode_as(data: &[u8], format: ImageFormat) -> Result<DynamicImage, CodecError> {
    Ok(ImageReader::with_format(Cursor::new(data), format).decode()?)
}

/// A single-frame format decoded by the `image` crate.
pub struct ImageCodec {
    name: &'static str,
    format: ImageFormat,
}

impl ImageCodec {
    pub fn new(name: &'static str, format: ImageFormat) -> Self {
        Self { name, format }
    }
}

impl Codec for ImageCodec {
    fn name(&self) -> &'static str {
        self.name
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let img = decode_as(&data, self.format)?;
        Ok(Box::new(StillImage::new(frame_from_dynamic(img)?)))
    }
}

pub struct WebpCodec {
    max_pixels: u64,
}

impl WebpCodec {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }
}

impl Codec for WebpCodec {
    fn name(&self) -> &'static str {
        "webp"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let decoder = WebPDecoder::new(Cursor::new(data.as_slice()))?;
        check_pixels(decoder.dimensions(), self.max_pixels)?;
        if !decoder.has_animation() {
            let img = DynamicImage::from_decoder(decoder)?;
            return Ok(Box::new(StillImage::new(frame_from_dynamic(img)?)));
        }
        drop(decoder);
        Animation::open(data, webp_frames)
    }
}

pub struct PngCodec {
    max_pixels: u64,
}

impl PngCodec {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }
}

impl Codec for PngCodec {
    fn name(&self) -> &'static str {
        "png"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let decoder = PngDecoder::new(Cursor::new(data.as_slice()))?;
        check_pixels(decoder.dimensions(), self.max_pixels)?;
        if !decoder.is_apng()? {
            let img = DynamicImage::from_decoder(decoder)?;
            return Ok(Box::new(StillImage::new(frame_from_dynamic(img)?)));
        }
        drop(decoder);
        Animation::open(data, apng_frames)
    }
}

/// Catch-all decoder: guesses the format from content.
///
/// Frames wider or taller than `max_dimension` are declined; frames with
/// more than `max_pixels` pixels are reported as out of memory. Both checks
/// run on the header before any pixel is decoded.
pub struct NativeCodec {
    max_dimension: u32,
    max_pixels: u64,
}

impl NativeCodec {
    pub fn new(max_dimension: u32, max_pixels: u64) -> Self {
        Self {
            max_dimension,
            max_pixels,
        }
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), CodecError> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(CodecError::Declined(format!(
                "{width}x{height} exceeds the {} pixel side limit",
                self.max_dimension
            )));
        }
        check_pixels((width, height), self.max_pixels)
    }
}

fn guessed_reader(data: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, CodecError> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| CodecError::Declined(e.to_string()))
}

impl Codec for NativeCodec {
    fn name(&self) -> &'static str {
        "native"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let (width, height) = guessed_reader(&data)?.into_dimensions()?;
        self.check_size(width, height)?;

        if guessed_reader(&data)?.format() == Some(ImageFormat::Gif) {
            return Animation::open(data, gif_frames);
        }
        let img = guessed_reader(&data)?.decode()?;
        Ok(Box::new(StillImage::new(frame_from_dynamic(img)?)))
    }
}
