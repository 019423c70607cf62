//! Photoshop documents (PSD and the large-document PSB variant).
//!
//! Two codecs read the same file:
//!
//! - [`PsdCodec`] decodes the flattened composite stored after the layer
//!   section. Supported: grayscale and RGB, 8 or 16 bits per channel, raw
//!   or PackBits-compressed, with an optional alpha channel.
//! - [`PsdThumbnailCodec`] decodes the JPEG thumbnail from image resource
//!   1036. It is the fallback for everything the composite reader declines
//!   (CMYK, Lab, 32-bit, files saved without "maximize compatibility").
//!
//! ## File layout
//!
//! ```text
//! header (26)  "8BPS" version channels height width depth mode
//! color mode data      u32 length + data
//! image resources      u32 length + 8BIM blocks
//! layer and mask info  u32 (PSD) / u64 (PSB) length + data
//! image data           u16 compression + planar channel data
//! ```

use super::backend::{Codec, CodecError, FrameDecoder, RawFrame, StillImage};
use super::markers::find_8bim_resource;
use super::pixels::alloc;
use super::rust_backend::frame_from_dynamic;
use image::ImageFormat;

const SIGNATURE: &[u8] = b"8BPS";
const THUMBNAIL_RESOURCE: u16 = 1036;
const THUMBNAIL_HEADER_LEN: usize = 28;

const MODE_GRAYSCALE: u16 = 1;
const MODE_RGB: u16 = 3;

struct Header {
    large: bool,
    channels: usize,
    height: u32,
    width: u32,
    depth: u16,
    mode: u16,
}

/// Big-endian cursor over the file.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(truncated)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok(hi << 32 | lo)
    }

    /// A u32-length-prefixed section.
    fn section(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

fn truncated() -> CodecError {
    CodecError::Declined("PSD file is truncated".into())
}

fn read_header(r: &mut Reader<'_>) -> Result<Header, CodecError> {
    if r.take(4)? != SIGNATURE {
        return Err(CodecError::Declined("not a Photoshop file".into()));
    }
    let large = match r.u16()? {
        1 => false,
        2 => true,
        v => return Err(CodecError::Declined(format!("unknown PSD version {v}"))),
    };
    r.take(6)?; // reserved
    Ok(Header {
        large,
        channels: r.u16()? as usize,
        height: r.u32()?,
        width: r.u32()?,
        depth: r.u16()?,
        mode: r.u16()?,
    })
}

/// Expand PackBits-compressed `src` into exactly `out.len()` bytes.
fn unpack_bits(src: &[u8], out: &mut [u8]) -> Result<(), CodecError> {
    let (mut i, mut o) = (0, 0);
    while o < out.len() {
        let n = *src.get(i).ok_or_else(truncated)? as i8;
        i += 1;
        match n {
            -128 => {}
            0..=127 => {
                let len = n as usize + 1;
                let lit = src.get(i..i + len).ok_or_else(truncated)?;
                out.get_mut(o..o + len).ok_or_else(truncated)?.copy_from_slice(lit);
                i += len;
                o += len;
            }
            _ => {
                let len = 1 - n as isize;
                let len = len as usize;
                let byte = *src.get(i).ok_or_else(truncated)?;
                out.get_mut(o..o + len).ok_or_else(truncated)?.fill(byte);
                i += 1;
                o += len;
            }
        }
    }
    Ok(())
}

/// Composite image decoder.
pub struct PsdCodec {
    max_pixels: u64,
}

impl PsdCodec {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }
}

impl Codec for PsdCodec {
    fn name(&self) -> &'static str {
        "psd-image"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let mut r = Reader::new(&data);
        let header = read_header(&mut r)?;

        let color_channels = match header.mode {
            MODE_GRAYSCALE => 1,
            MODE_RGB => 3,
            other => {
                return Err(CodecError::Declined(format!(
                    "PSD color mode {other} has no composite reader"
                )));
            }
        };
        if !matches!(header.depth, 8 | 16) {
            return Err(CodecError::Declined(format!(
                "{}-bit PSD composite is not supported",
                header.depth
            )));
        }
        if header.channels < color_channels || header.width == 0 || header.height == 0 {
            return Err(CodecError::Declined("PSD has no pixel data".into()));
        }
        if header.width as u64 * header.height as u64 > self.max_pixels {
            return Err(CodecError::OutOfMemory(format!(
                "{}x{} PSD exceeds the pixel budget",
                header.width, header.height
            )));
        }

        r.section()?; // color mode data
        r.section()?; // image resources
        if header.large {
            let len = r.u64()?;
            r.take(usize::try_from(len).map_err(|_| truncated())?)?;
        } else {
            r.section()?;
        }

        let has_alpha = header.channels > color_channels;
        let planes = color_channels + has_alpha as usize;
        let (w, h) = (header.width as usize, header.height as usize);
        let sample_len = header.depth as usize / 8;
        let row_len = w * sample_len;
        let plane_len = row_len * h;

        let compression = r.u16()?;
        let mut planar = alloc(plane_len * planes)?;
        match compression {
            0 => {
                let raw = r.take(plane_len * planes)?;
                planar.copy_from_slice(raw);
            }
            1 => {
                // Row byte counts cover every channel in the file, not
                // just the ones we decode.
                let rows_total = header.channels * h;
                let mut counts = Vec::with_capacity(rows_total);
                for _ in 0..rows_total {
                    counts.push(if header.large {
                        r.u32()? as usize
                    } else {
                        r.u16()? as usize
                    });
                }
                for (row, out) in planar.chunks_exact_mut(row_len).enumerate() {
                    let packed = r.take(counts[row])?;
                    unpack_bits(packed, out)?;
                }
            }
            other => {
                return Err(CodecError::Declined(format!(
                    "PSD compression {other} is not supported"
                )));
            }
        }

        let out_channels = match (color_channels, has_alpha) {
            (3, false) => 3,
            (1, false) => 1,
            _ => 4,
        };
        let mut pixels = alloc(w * h * out_channels)?;
        for i in 0..w * h {
            // high byte of 16-bit samples
            let sample = |plane: usize| planar[plane * plane_len + i * sample_len];
            let dst = &mut pixels[i * out_channels..(i + 1) * out_channels];
            match (color_channels, has_alpha) {
                (1, false) => dst[0] = sample(0),
                (1, true) => {
                    let v = sample(0);
                    dst.copy_from_slice(&[v, v, v, sample(1)]);
                }
                (_, false) => dst.copy_from_slice(&[sample(0), sample(1), sample(2)]),
                _ => dst.copy_from_slice(&[sample(0), sample(1), sample(2), sample(3)]),
            }
        }

        Ok(Box::new(StillImage::new(RawFrame::new(
            pixels,
            header.width,
            header.height,
            out_channels as u8,
        )?)))
    }
}

/// Embedded JPEG thumbnail decoder.
pub struct PsdThumbnailCodec;

impl Codec for PsdThumbnailCodec {
    fn name(&self) -> &'static str {
        "psd-thumb"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let mut r = Reader::new(&data);
        read_header(&mut r)?;
        r.section()?; // color mode data
        let resources = r.section()?;
        let thumb = find_8bim_resource(resources, THUMBNAIL_RESOURCE)
            .and_then(|res| res.get(THUMBNAIL_HEADER_LEN..))
            .ok_or_else(|| CodecError::Declined("PSD has no JPEG thumbnail".into()))?;
        let img = image::load_from_memory_with_format(thumb, ImageFormat::Jpeg)?;
        Ok(Box::new(StillImage::new(frame_from_dynamic(img)?)))
    }
}
