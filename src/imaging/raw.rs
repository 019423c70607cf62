//! Camera RAW decoders.
//!
//! [`DevelopedRawCodec`] develops the sensor data itself: `rawloader` reads
//! the raw samples and `imagepipe` demosaics, white balances and converts to
//! 8-bit sRGB.
//!
//! [`EmbeddedPreviewCodec`] is the cheap path. Almost every camera stores a
//! full-size (or near full-size) JPEG rendering inside the RAW file; this
//! codec finds those JPEGs and decodes the largest one that works.
//!
//! Candidate locations:
//!
//! - TIFF-based RAW (CR2, NEF, ARW, DNG, ORF, RW2, PEF, ...): every IFD in
//!   the main chain and in SubIFDs (tag 0x014A), through
//!   `JPEGInterchangeFormat`/`Length` (0x0201/0x0202) or a single strip
//!   (0x0111/0x0117) compressed as JPEG (Compression 6 or 7) that starts
//!   with an SOI marker.
//! - Fuji RAF: the JPEG offset and length stored big-endian at bytes 84 and 88.

use super::backend::{Codec, CodecError, FrameDecoder, RawFrame, StillImage};
use super::markers::TiffReader;
use super::rust_backend::frame_from_dynamic;
use image::ImageFormat;
use log::debug;
use std::io::Cursor;

const RAF_MAGIC: &[u8] = b"FUJIFILMCCD-RAW";
const SOI: &[u8] = &[0xFF, 0xD8];
const MAX_IFDS: usize = 64;

const TAG_COMPRESSION: u16 = 0x0103;
const TAG_STRIP_OFFSETS: u16 = 0x0111;
const TAG_STRIP_BYTE_COUNTS: u16 = 0x0117;
const TAG_SUB_IFDS: u16 = 0x014A;
const TAG_JPEG_OFFSET: u16 = 0x0201;
const TAG_JPEG_LENGTH: u16 = 0x0202;

/// Byte ranges inside `data` that hold an embedded JPEG.
fn preview_candidates(data: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    if data.starts_with(RAF_MAGIC) {
        let be = |at: usize| {
            data.get(at..at + 4)
                .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
        };
        if let (Some(offset), Some(len)) = (be(84), be(88)) {
            out.extend(data.get(offset..offset.saturating_add(len)));
        }
    } else if let Some(tiff) = TiffReader::new(data) {
        collect_tiff_previews(&tiff, &mut out);
    }
    out.retain(|jpeg| jpeg.starts_with(SOI));
    out.sort_by_key(|jpeg| std::cmp::Reverse(jpeg.len()));
    out
}

fn collect_tiff_previews<'a>(tiff: &TiffReader<'a>, out: &mut Vec<&'a [u8]>) {
    let data = tiff.data();
    let mut pending: Vec<usize> = tiff.first_ifd().into_iter().collect();
    let mut visited = Vec::new();

    while let Some(offset) = pending.pop() {
        if visited.contains(&offset) || visited.len() >= MAX_IFDS {
            continue;
        }
        visited.push(offset);
        let Some((entries, next)) = tiff.read_ifd(offset) else {
            continue;
        };
        pending.extend(next);

        let find = |tag| entries.iter().find(|e| e.tag == tag);
        let value = |tag| find(tag).and_then(|e| tiff.value(e)).map(|v| v as usize);

        if let Some(sub) = find(TAG_SUB_IFDS) {
            pending.extend(tiff.values(sub).into_iter().map(|v| v as usize));
        }

        if let (Some(start), Some(len)) = (value(TAG_JPEG_OFFSET), value(TAG_JPEG_LENGTH)) {
            out.extend(data.get(start..start.saturating_add(len)));
        }

        if matches!(value(TAG_COMPRESSION), Some(6 | 7)) {
            let offsets = find(TAG_STRIP_OFFSETS).map(|e| tiff.values(e)).unwrap_or_default();
            let counts = find(TAG_STRIP_BYTE_COUNTS).map(|e| tiff.values(e)).unwrap_or_default();
            if let ([start], [len]) = (offsets.as_slice(), counts.as_slice()) {
                let (start, len) = (*start as usize, *len as usize);
                out.extend(data.get(start..start.saturating_add(len)));
            }
        }
    }
}

pub struct DevelopedRawCodec {
    max_pixels: u64,
}

impl DevelopedRawCodec {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }
}

impl Codec for DevelopedRawCodec {
    fn name(&self) -> &'static str {
        "raw-full"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let raw = rawloader::decode(&mut Cursor::new(&data))
            .map_err(|e| CodecError::Declined(format!("RAW decode error: {e}")))?;
        if raw.width as u64 * raw.height as u64 > self.max_pixels {
            return Err(CodecError::OutOfMemory(format!(
                "{}x{} sensor exceeds the pixel budget",
                raw.width, raw.height
            )));
        }
        drop(data);

        let mut pipeline = imagepipe::Pipeline::new_from_source(imagepipe::ImageSource::Raw(raw))
            .map_err(|e| CodecError::Declined(format!("RAW pipeline error: {e}")))?;
        let srgb = pipeline
            .output_8bit(None)
            .map_err(|e| CodecError::Declined(format!("RAW processing error: {e}")))?;

        let (width, height) = (srgb.width as u32, srgb.height as u32);
        Ok(Box::new(StillImage::new(RawFrame::new(srgb.data, width, height, 3)?)))
    }
}

pub struct EmbeddedPreviewCodec;

impl Codec for EmbeddedPreviewCodec {
    fn name(&self) -> &'static str {
        "raw-builtin"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        for jpeg in preview_candidates(&data) {
            match image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg) {
                Ok(img) => return Ok(Box::new(StillImage::new(frame_from_dynamic(img)?))),
                Err(e) => debug!("embedded preview of {} bytes rejected: {e}", jpeg.len()),
            }
        }
        Err(CodecError::Declined("no decodable embedded preview".into()))
    }
}
