//! Shared test utilities: in-memory fixture encoders.
//!
//! Every fixture is produced on the fly with the `image` encoders (or by
//! hand for containers the `image` crate cannot write), so the test suite
//! carries no binary files.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = write_fixture(tmp.path(), "photo.jpg", &encode_jpeg(64, 48));
//! ```

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, ExtendedColorType, Frame, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};

// =========================================================================
// Files
// =========================================================================

pub fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

// =========================================================================
// Encoders
// =========================================================================

/// Gradient JPEG.
pub fn encode_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Solid red PNG with a uniform alpha value.
pub fn encode_png_rgba(width: u32, height: u32, alpha: u8) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, alpha]));
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
    out
}

/// Looping GIF whose frame `i` is filled with gray level `i * 40`.
pub fn encode_gif_animation(width: u32, height: u32, frames: u32) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        let frames = (0..frames).map(|i| {
            let level = (i * 40 % 256) as u8;
            Frame::from_parts(
                RgbaImage::from_pixel(width, height, Rgba([level, level, level, 255])),
                0,
                0,
                Delay::from_numer_denom_ms(50, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
    }
    out
}

/// Legacy-header BC1 (DXT1) DDS whose every block is one RGB565 color.
pub fn encode_dds_bc1_solid(width: u32, height: u32, rgb565: u16) -> Vec<u8> {
    let blocks = width.div_ceil(4) * height.div_ceil(4);
    let mut out = b"DDS ".to_vec();
    let mut header = [0u32; 31];
    header[0] = 124; // dwSize
    header[1] = 0x1 | 0x2 | 0x4 | 0x1000 | 0x80000; // CAPS | HEIGHT | WIDTH | PIXELFORMAT | LINEARSIZE
    header[2] = height;
    header[3] = width;
    header[4] = blocks * 8;
    header[18] = 32; // ddspf.dwSize
    header[19] = 0x4; // DDPF_FOURCC
    header[20] = u32::from_le_bytes(*b"DXT1");
    header[26] = 0x1000; // DDSCAPS_TEXTURE
    for word in header {
        out.extend_from_slice(&word.to_le_bytes());
    }
    for _ in 0..blocks {
        out.extend_from_slice(&rgb565.to_le_bytes());
        out.extend_from_slice(&rgb565.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
    }
    out
}
