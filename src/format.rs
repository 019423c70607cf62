//! Image format identification.
//!
//! [`identify`] reads the first 16 bytes of a file and classifies it. The
//! order of checks matters and is fixed:
//!
//! 1. Magic signatures (BMP, JPEG, PNG, GIF, WebP, JPEG XL, `ftyp` brands,
//!    QOI, PSD, DDS).
//! 2. The file extension.
//! 3. Unbranded ISO-BMFF `ftyp` boxes, treated as AVIF.
//! 4. TIFF byte-order magic.
//!
//! TIFF comes last because most camera RAW formats are TIFF containers and
//! must be classified by their extension first. A RAW file renamed without
//! an extension is reported as [`FormatTag::Tiff`].

use crate::cache::Family;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Number of leading bytes inspected by [`identify`].
pub const HEADER_LEN: usize = 16;

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JXL_CODESTREAM: &[u8] = &[0xFF, 0x0A];
const JXL_CONTAINER: &[u8] = &[
    0x00, 0x00, 0x00, 0x0C, b'J', b'X', b'L', b' ', 0x0D, 0x0A, 0x87, 0x0A,
];

/// Detected encoding of an image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatTag {
    Jpeg,
    Bmp,
    Png,
    Gif,
    Tiff,
    Webp,
    Jxl,
    Avif,
    Heif,
    Tga,
    Qoi,
    Psd,
    Dds,
    CameraRaw,
    /// Formats only the platform imaging API understands (JPEG XR and friends).
    Wic,
    Unknown,
}

impl FormatTag {
    pub fn name(self) -> &'static str {
        match self {
            FormatTag::Jpeg => "jpeg",
            FormatTag::Bmp => "bmp",
            FormatTag::Png => "png",
            FormatTag::Gif => "gif",
            FormatTag::Tiff => "tiff",
            FormatTag::Webp => "webp",
            FormatTag::Jxl => "jxl",
            FormatTag::Avif => "avif",
            FormatTag::Heif => "heif",
            FormatTag::Tga => "tga",
            FormatTag::Qoi => "qoi",
            FormatTag::Psd => "psd",
            FormatTag::Dds => "dds",
            FormatTag::CameraRaw => "camera-raw",
            FormatTag::Wic => "wic",
            FormatTag::Unknown => "unknown",
        }
    }

    /// The decoder-cache family allowed to stay alive while this format loads.
    ///
    /// Formats without a family clear every cache entry before decoding.
    /// GIF, TIFF and unknown files go through the native decoder, so they
    /// keep the native cache.
    pub fn family(self) -> Option<Family> {
        match self {
            FormatTag::Webp => Some(Family::Webp),
            FormatTag::Png => Some(Family::Png),
            FormatTag::Jxl => Some(Family::Jxl),
            FormatTag::Avif => Some(Family::Avif),
            FormatTag::Gif | FormatTag::Tiff | FormatTag::Unknown => Some(Family::Native),
            _ => None,
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const RAW_EXTENSIONS: &[&str] = &[
    "crw", "cr2", "cr3", "nef", "nrw", "arw", "srf", "sr2", "dng", "orf", "rw2", "raf", "pef",
    "srw", "x3f", "kdc", "mrw", "3fr", "erf", "mef", "mos", "rwl", "iiq",
];

const EXTENSIONS: &[(&str, FormatTag)] = &[
    ("jpg", FormatTag::Jpeg),
    ("jpeg", FormatTag::Jpeg),
    ("jpe", FormatTag::Jpeg),
    ("jfif", FormatTag::Jpeg),
    ("bmp", FormatTag::Bmp),
    ("dib", FormatTag::Bmp),
    ("png", FormatTag::Png),
    ("gif", FormatTag::Gif),
    ("tif", FormatTag::Tiff),
    ("tiff", FormatTag::Tiff),
    ("webp", FormatTag::Webp),
    ("jxl", FormatTag::Jxl),
    ("avif", FormatTag::Avif),
    ("heic", FormatTag::Heif),
    ("heif", FormatTag::Heif),
    ("tga", FormatTag::Tga),
    ("qoi", FormatTag::Qoi),
    ("psd", FormatTag::Psd),
    ("psb", FormatTag::Psd),
    ("dds", FormatTag::Dds),
    ("jxr", FormatTag::Wic),
    ("wdp", FormatTag::Wic),
    ("hdp", FormatTag::Wic),
];

/// Classify a file by extension alone (case-insensitive).
pub fn from_extension(path: &Path) -> Option<FormatTag> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if RAW_EXTENSIONS.contains(&ext.as_str()) {
        return Some(FormatTag::CameraRaw);
    }
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, tag)| *tag)
}

/// Identify the format of the file at `path`.
///
/// Unreadable files and files shorter than two bytes are [`FormatTag::Unknown`].
pub fn identify(path: &Path) -> FormatTag {
    let mut header = [0u8; HEADER_LEN];
    let read = match File::open(path) {
        Ok(mut file) => read_header(&mut file, &mut header),
        Err(_) => 0,
    };
    identify_bytes(&header[..read], path)
}

/// Fill `buf` from `reader` as far as possible, stopping at EOF or on error.
fn read_header(reader: &mut impl Read, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    filled
}

/// Classify from already-read leading bytes plus the file name.
pub fn identify_bytes(header: &[u8], path: &Path) -> FormatTag {
    if header.len() < 2 {
        return FormatTag::Unknown;
    }
    if let Some(tag) = sniff_magic(header) {
        return tag;
    }
    if let Some(tag) = from_extension(path) {
        return tag;
    }
    if has_ftyp_box(header) {
        return FormatTag::Avif;
    }
    if header.starts_with(b"II*\0") || header.starts_with(b"MM\0*") {
        return FormatTag::Tiff;
    }
    FormatTag::Unknown
}

fn has_ftyp_box(header: &[u8]) -> bool {
    header.get(4..8) == Some(b"ftyp".as_slice())
}

fn sniff_magic(h: &[u8]) -> Option<FormatTag> {
    if h.starts_with(b"BM") {
        return Some(FormatTag::Bmp);
    }
    if h.starts_with(&[0xFF, 0xD8]) {
        return Some(FormatTag::Jpeg);
    }
    if h.starts_with(PNG_SIGNATURE) {
        return Some(FormatTag::Png);
    }
    if h.starts_with(b"GIF87a") || h.starts_with(b"GIF89a") {
        return Some(FormatTag::Gif);
    }
    if h.starts_with(b"RIFF") && h.get(8..12) == Some(b"WEBP".as_slice()) {
        return Some(FormatTag::Webp);
    }
    if h.starts_with(JXL_CODESTREAM) || h.starts_with(JXL_CONTAINER) {
        return Some(FormatTag::Jxl);
    }
    if has_ftyp_box(h) {
        if let Some(brand) = h.get(8..12) {
            if brand.starts_with(b"avi") {
                return Some(FormatTag::Avif);
            }
            if brand.starts_with(b"hei") || brand.starts_with(b"hev") {
                return Some(FormatTag::Heif);
            }
            if brand == b"crx " {
                return Some(FormatTag::CameraRaw);
            }
        }
    }
    if h.starts_with(b"qoif") {
        return Some(FormatTag::Qoi);
    }
    if h.starts_with(b"8BPS") {
        return Some(FormatTag::Psd);
    }
    if h.starts_with(b"DDS ") {
        return Some(FormatTag::Dds);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(bytes: &[u8], name: &str) -> FormatTag {
        identify_bytes(bytes, Path::new(name))
    }

    fn ftyp(brand: &[u8; 4]) -> Vec<u8> {
        let mut h = vec![0x00, 0x00, 0x00, 0x1C];
        h.extend_from_slice(b"ftyp");
        h.extend_from_slice(brand);
        h.extend_from_slice(&[0, 0, 0, 0]);
        h
    }

    // =========================================================================
    // Magic signatures
    // =========================================================================

    #[test]
    fn magic_signatures() {
        assert_eq!(id(b"BM\x36\x00\x00\x00", "x"), FormatTag::Bmp);
        assert_eq!(id(&[0xFF, 0xD8, 0xFF, 0xE0], "x"), FormatTag::Jpeg);
        assert_eq!(id(PNG_SIGNATURE, "x"), FormatTag::Png);
        assert_eq!(id(b"GIF87a\x01\x00", "x"), FormatTag::Gif);
        assert_eq!(id(b"GIF89a\x01\x00", "x"), FormatTag::Gif);
        assert_eq!(id(b"RIFF\x10\x00\x00\x00WEBPVP8 ", "x"), FormatTag::Webp);
        assert_eq!(id(&[0xFF, 0x0A, 0x00], "x"), FormatTag::Jxl);
        assert_eq!(id(JXL_CONTAINER, "x"), FormatTag::Jxl);
        assert_eq!(id(b"qoif\x00\x00\x00\x01", "x"), FormatTag::Qoi);
        assert_eq!(id(b"8BPS\x00\x01", "x"), FormatTag::Psd);
        assert_eq!(id(b"DDS \x7C\x00\x00\x00", "x"), FormatTag::Dds);
    }

    #[test]
    fn ftyp_brands() {
        assert_eq!(id(&ftyp(b"avif"), "x"), FormatTag::Avif);
        assert_eq!(id(&ftyp(b"avis"), "x"), FormatTag::Avif);
        assert_eq!(id(&ftyp(b"heic"), "x"), FormatTag::Heif);
        assert_eq!(id(&ftyp(b"hevc"), "x"), FormatTag::Heif);
        assert_eq!(id(&ftyp(b"crx "), "x"), FormatTag::CameraRaw);
    }

    #[test]
    fn magic_wins_over_extension() {
        assert_eq!(id(&[0xFF, 0xD8, 0xFF], "photo.png"), FormatTag::Jpeg);
        assert_eq!(id(b"DDS \x7C", "texture.bmp"), FormatTag::Dds);
    }

    // =========================================================================
    // Extension fallback and late signatures
    // =========================================================================

    #[test]
    fn raw_in_tiff_container_uses_extension() {
        assert_eq!(id(b"II*\0\x08\0\0\0", "DSC_0001.NEF"), FormatTag::CameraRaw);
        assert_eq!(id(b"MM\0*\0\0\0\x08", "IMG_0001.cr2"), FormatTag::CameraRaw);
    }

    #[test]
    fn tiff_magic_without_extension_is_tiff() {
        assert_eq!(id(b"II*\0\x08\0\0\0", "DSC_0001"), FormatTag::Tiff);
        assert_eq!(id(b"MM\0*\0\0\0\x08", "scan.tif"), FormatTag::Tiff);
    }

    #[test]
    fn unbranded_ftyp_defaults_to_avif() {
        assert_eq!(id(&ftyp(b"mif1"), "noext"), FormatTag::Avif);
    }

    #[test]
    fn unbranded_ftyp_prefers_extension() {
        assert_eq!(id(&ftyp(b"mif1"), "photo.heic"), FormatTag::Heif);
    }

    #[test]
    fn extension_only_formats() {
        assert_eq!(id(b"\x00\x00\x02\x00", "sprite.TGA"), FormatTag::Tga);
        assert_eq!(id(b"II\xBC\x01", "photo.jxr"), FormatTag::Wic);
    }

    #[test]
    fn unrecognized_is_unknown() {
        assert_eq!(id(b"hello world", "notes"), FormatTag::Unknown);
    }

    #[test]
    fn short_header_is_unknown_even_with_extension() {
        assert_eq!(id(b"B", "tiny.bmp"), FormatTag::Unknown);
        assert_eq!(id(b"", "empty.jpg"), FormatTag::Unknown);
    }

    // =========================================================================
    // File access
    // =========================================================================

    #[test]
    fn identify_reads_file_header() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("texture");
        std::fs::write(&path, b"DDS \x7C\x00\x00\x00rest of header").unwrap();
        assert_eq!(identify(&path), FormatTag::Dds);
    }

    #[test]
    fn identify_missing_file_is_unknown() {
        assert_eq!(
            identify(Path::new("/nonexistent/photo.jpg")),
            FormatTag::Unknown
        );
    }

    #[test]
    fn family_mapping() {
        assert_eq!(FormatTag::Webp.family(), Some(Family::Webp));
        assert_eq!(FormatTag::Gif.family(), Some(Family::Native));
        assert_eq!(FormatTag::Unknown.family(), Some(Family::Native));
        assert_eq!(FormatTag::Jpeg.family(), None);
        assert_eq!(FormatTag::Dds.family(), None);
    }

    #[test]
    fn from_extension_is_case_insensitive() {
        assert_eq!(from_extension(Path::new("a.JPEG")), Some(FormatTag::Jpeg));
        assert_eq!(from_extension(Path::new("a.Dng")), Some(FormatTag::CameraRaw));
        assert_eq!(from_extension(Path::new("a")), None);
    }
}
