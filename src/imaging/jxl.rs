//! JPEG XL decoding via `jxl-oxide`.
//!
//! The codestream is parsed once when the file is opened. Frames are
//! rendered only when asked for, so an animation parked in the decoder cache
//! pays for each frame when the viewer reaches it.
//!
//! Output follows the rendered channel count: gray, RGB and RGBA pass
//! through, gray with alpha is widened to RGBA.

use super::backend::{Codec, CodecError, FrameDecoder, RawFrame};
use super::pixels::alloc;
use jxl_oxide::JxlImage;
use std::io::Cursor;

pub struct JxlCodec {
    max_pixels: u64,
}

impl JxlCodec {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }
}

impl Codec for JxlCodec {
    fn name(&self) -> &'static str {
        "jxl"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let image = JxlImage::builder()
            .read(Cursor::new(data))
            .map_err(|e| CodecError::Declined(format!("not a JPEG XL file: {e}")))?;

        let (width, height) = (image.width(), image.height());
        if width as u64 * height as u64 > self.max_pixels {
            return Err(CodecError::OutOfMemory(format!(
                "{width}x{height} exceeds the {} pixel budget",
                self.max_pixels
            )));
        }

        let count = u32::try_from(image.num_loaded_keyframes()).unwrap_or(u32::MAX);
        if count == 0 {
            return Err(CodecError::Declined("JPEG XL file has no complete frame".into()));
        }
        let tick_ms = image
            .image_header()
            .metadata
            .animation
            .as_ref()
            .filter(|anim| anim.tps_numerator > 0)
            .map(|anim| 1000.0 * anim.tps_denominator as f64 / anim.tps_numerator as f64);

        Ok(Box::new(JxlFrames {
            image,
            count,
            tick_ms,
        }))
    }
}

struct JxlFrames {
    image: JxlImage,
    count: u32,
    /// Milliseconds per animation tick; `None` for stills.
    tick_ms: Option<f64>,
}

impl FrameDecoder for JxlFrames {
    fn frame_count(&self) -> u32 {
        self.count
    }

    fn decode_frame(&mut self, index: u32) -> Result<RawFrame, CodecError> {
        let render = self
            .image
            .render_frame(index as usize)
            .map_err(|e| CodecError::Declined(format!("cannot render frame {index}: {e}")))?;
        let duration_ms = match self.tick_ms {
            Some(tick) if self.count > 1 => (render.duration() as f64 * tick).round() as u32,
            _ => 0,
        };

        let mut stream = render.stream();
        let (width, height, channels) = (stream.width(), stream.height(), stream.channels());
        let mut samples = alloc(width as usize * height as usize * channels as usize)?;
        stream.write_to_buffer(&mut samples[..]);

        let (pixels, channels) = match channels {
            1 | 3 | 4 => (samples, channels as u8),
            2 => (gray_alpha_to_rgba(&samples)?, 4),
            n => {
                return Err(CodecError::Declined(format!(
                    "{n}-channel JPEG XL output is not supported"
                )));
            }
        };
        Ok(RawFrame::new(pixels, width, height, channels)?.with_duration(duration_ms))
    }
}

fn gray_alpha_to_rgba(samples: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut rgba = alloc(samples.len() * 2)?;
    for (out, ga) in rgba.chunks_exact_mut(4).zip(samples.chunks_exact(2)) {
        out.copy_from_slice(&[ga[0], ga[0], ga[0], ga[1]]);
    }
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_alpha_widens() {
        assert_eq!(
            gray_alpha_to_rgba(&[10, 255, 200, 0]).unwrap(),
            vec![10, 10, 10, 255, 200, 200, 200, 0]
        );
    }

    #[test]
    fn garbage_is_declined() {
        let codec = JxlCodec::new(u64::MAX);
        assert!(matches!(
            codec.open(b"\xFF\x0Anot really a codestream".to_vec()),
            Err(CodecError::Declined(_))
        ));
        assert!(matches!(codec.open(Vec::new()), Err(CodecError::Declined(_))));
    }
}
