//! Metadata carried alongside decoded pixels.
//!
//! The viewer needs two things from a file beyond its pixels: the raw EXIF
//! block (for orientation and the info panel) and, for JPEG, the COM comment
//! and a content hash used to recognise the same photo under another name.
//!
//! ## Where EXIF lives
//!
//! | Container | Location |
//! |---|---|
//! | JPEG | APP1 segment starting with `Exif\0\0` |
//! | PNG | `eXIf` chunk |
//! | WebP | RIFF `EXIF` chunk (some writers keep the `Exif\0\0` prefix) |
//! | TIFF, camera RAW | the file itself is a TIFF structure; IFD0 is kept |
//!
//! Extraction never fails: a missing or malformed block is simply absent.

use crate::format::FormatTag;
use crate::imaging::markers::{TiffReader, find_jpeg_segment, find_png_chunk, find_riff_chunk};
use sha2::{Digest, Sha256};

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const ORIENTATION_TAG: u16 = 0x0112;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    /// TIFF-structured EXIF block, without the `Exif\0\0` preamble.
    pub exif: Option<Vec<u8>>,
    /// JPEG COM segment text.
    pub comment: Option<String>,
}

impl ImageMetadata {
    pub fn is_empty(&self) -> bool {
        self.exif.is_none() && self.comment.is_none()
    }

    /// Clockwise rotation requested by the EXIF orientation tag.
    ///
    /// Only the pure rotations (orientations 1, 3, 6 and 8) are mapped;
    /// mirrored orientations return `None`.
    pub fn orientation_degrees(&self) -> Option<i32> {
        let exif = self.exif.as_deref()?;
        let tiff = TiffReader::new(exif)?;
        let (entries, _) = tiff.read_ifd(tiff.first_ifd()?)?;
        let entry = entries.iter().find(|e| e.tag == ORIENTATION_TAG)?;
        match tiff.value(entry)? {
            1 => Some(0),
            3 => Some(180),
            6 => Some(90),
            8 => Some(270),
            _ => None,
        }
    }
}

/// Pull metadata out of a whole file already read into memory.
///
/// Returns `None` when the format carries nothing we extract.
pub fn for_format(format: FormatTag, data: &[u8]) -> Option<ImageMetadata> {
    let meta = match format {
        FormatTag::Jpeg => ImageMetadata {
            exif: find_jpeg_segment(data, 0xE1, EXIF_PREFIX).map(<[u8]>::to_vec),
            comment: find_jpeg_segment(data, 0xFE, b"").and_then(comment_text),
        },
        FormatTag::Png => ImageMetadata {
            exif: find_png_chunk(data, b"eXIf").map(<[u8]>::to_vec),
            comment: None,
        },
        FormatTag::Webp => ImageMetadata {
            exif: find_riff_chunk(data, b"EXIF")
                .map(|block| block.strip_prefix(EXIF_PREFIX).unwrap_or(block).to_vec()),
            comment: None,
        },
        FormatTag::Tiff | FormatTag::CameraRaw => ImageMetadata {
            exif: tiff_ifd0(data).map(<[u8]>::to_vec),
            comment: None,
        },
        _ => return None,
    };
    (!meta.is_empty()).then_some(meta)
}

/// The TIFF header plus IFD0's entry table. Inline values (orientation
/// among them) stay readable; values stored out of line are cut off.
fn tiff_ifd0(data: &[u8]) -> Option<&[u8]> {
    let tiff = TiffReader::new(data)?;
    let ifd0 = tiff.first_ifd()?;
    let count = tiff.read_u16(ifd0)? as usize;
    let end = ifd0 + 2 + count * 12 + 4;
    data.get(..end)
}

fn comment_text(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches('\0').trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// First 8 bytes of the SHA-256 of `data`, big-endian.
pub fn content_hash(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}
