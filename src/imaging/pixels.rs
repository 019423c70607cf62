//! Pixel buffer helpers shared by the dispatcher and the post-decode processor.
//!
//! All buffers are tightly packed rows of 1, 3 or 4 bytes per pixel.
//! Functions that allocate report failure as [`TryReserveError`] so large
//! images surface as out-of-memory instead of aborting the process.

use std::collections::TryReserveError;

pub(crate) fn alloc(len: usize) -> Result<Vec<u8>, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Composite RGBA pixels over an opaque `background`, leaving alpha at 255.
pub fn blend_background(pixels: &mut [u8], background: [u8; 3]) {
    for px in pixels.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 255 {
            continue;
        }
        for (c, bg) in px[..3].iter_mut().zip(background) {
            *c = ((*c as u32 * a + bg as u32 * (255 - a) + 127) / 255) as u8;
        }
        px[3] = 255;
    }
}

/// Rotate clockwise by `turns` quarter turns (taken modulo 4).
///
/// Returns the new buffer with its width and height.
pub fn rotate(
    pixels: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    turns: u32,
) -> Result<(Vec<u8>, u32, u32), TryReserveError> {
    let (w, h, ch) = (width as usize, height as usize, channels as usize);
    let turns = turns % 4;
    let mut out = alloc(pixels.len())?;
    if turns == 0 {
        out.copy_from_slice(pixels);
        return Ok((out, width, height));
    }

    let (out_w, out_h) = if turns == 2 { (w, h) } else { (h, w) };
    for y in 0..h {
        for x in 0..w {
            let (nx, ny) = match turns {
                1 => (h - 1 - y, x),
                2 => (w - 1 - x, h - 1 - y),
                _ => (y, w - 1 - x),
            };
            let src = (y * w + x) * ch;
            let dst = (ny * out_w + nx) * ch;
            out[dst..dst + ch].copy_from_slice(&pixels[src..src + ch]);
        }
    }
    Ok((out, out_w as u32, out_h as u32))
}

/// Expand gray, RGB or RGBA pixels to RGBA.
pub fn to_rgba(pixels: &[u8], channels: u8) -> Result<Vec<u8>, TryReserveError> {
    let ch = channels as usize;
    let count = pixels.len() / ch;
    let mut out = Vec::new();
    out.try_reserve_exact(count * 4)?;
    for px in pixels.chunks_exact(ch) {
        match ch {
            1 => out.extend_from_slice(&[px[0], px[0], px[0], 255]),
            3 => out.extend_from_slice(&[px[0], px[1], px[2], 255]),
            _ => out.extend_from_slice(&px[..4]),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 3x2 gray image:
    // 1 2 3
    // 4 5 6
    const GRAY: [u8; 6] = [1, 2, 3, 4, 5, 6];

    #[test]
    fn rotate_zero_copies() {
        let (out, w, h) = rotate(&GRAY, 3, 2, 1, 0).unwrap();
        assert_eq!((w, h), (3, 2));
        assert_eq!(out, GRAY);
    }

    #[test]
    fn rotate_quarter_turn_clockwise() {
        let (out, w, h) = rotate(&GRAY, 3, 2, 1, 1).unwrap();
        assert_eq!((w, h), (2, 3));
        // 4 1
        // 5 2
        // 6 3
        assert_eq!(out, vec![4, 1, 5, 2, 6, 3]);
    }

    #[test]
    fn rotate_half_turn() {
        let (out, w, h) = rotate(&GRAY, 3, 2, 1, 2).unwrap();
        assert_eq!((w, h), (3, 2));
        assert_eq!(out, vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn rotate_three_quarter_turns() {
        let (out, w, h) = rotate(&GRAY, 3, 2, 1, 3).unwrap();
        assert_eq!((w, h), (2, 3));
        // 3 6
        // 2 5
        // 1 4
        assert_eq!(out, vec![3, 6, 2, 5, 1, 4]);
    }

    #[test]
    fn rotate_keeps_pixels_together() {
        let rgb = [1, 1, 1, 2, 2, 2];
        let (out, w, h) = rotate(&rgb, 2, 1, 3, 1).unwrap();
        assert_eq!((w, h), (1, 2));
        assert_eq!(out, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn blend_against_background() {
        let mut px = [255, 0, 0, 0, 0, 0, 255, 255, 100, 100, 100, 128];
        blend_background(&mut px, [255, 255, 255]);
        // transparent becomes background
        assert_eq!(&px[0..4], &[255, 255, 255, 255]);
        // opaque unchanged
        assert_eq!(&px[4..8], &[0, 0, 255, 255]);
        // half alpha lands half way
        assert_eq!(px[8], ((100 * 128 + 255 * 127 + 127) / 255) as u8);
        assert_eq!(px[11], 255);
    }

    #[test]
    fn expand_to_rgba() {
        assert_eq!(to_rgba(&[9], 1).unwrap(), vec![9, 9, 9, 255]);
        assert_eq!(to_rgba(&[1, 2, 3], 3).unwrap(), vec![1, 2, 3, 255]);
        assert_eq!(to_rgba(&[1, 2, 3, 4], 4).unwrap(), vec![1, 2, 3, 4]);
    }
}
