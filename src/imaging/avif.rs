//! AVIF decoding via `avif-parse` (container) + `rav1d` (AV1 decode).
//!
//! The `image` crate's `"avif"` feature only provides the encoder (rav1e).
//! Decoding through `image` requires `"avif-native"`, which links the C
//! library dav1d. `rav1d` is a pure Rust port of dav1d, driven here through
//! its C-compatible API.
//!
//! The primary item becomes 8-bit RGB. When the container carries an alpha
//! item it is decoded through the same path and merged into RGBA, undoing
//! premultiplication if the file declares it.
//!
//! rav1d reports errors as negative errno values. `ENOMEM` maps to
//! [`CodecError::OutOfMemory`]; everything else means the bitstream was not
//! decodable and is [`CodecError::Declined`].

use super::backend::{Codec, CodecError, FrameDecoder, RawFrame, StillImage};
use super::pixels::alloc;
use log::warn;
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::Dav1dSettings;
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use std::ptr::NonNull;

const ENOMEM: i32 = 12;

pub struct AvifCodec;

impl Codec for AvifCodec {
    fn name(&self) -> &'static str {
        "avif"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let avif = avif_parse::read_avif(&mut std::io::Cursor::new(&data))
            .map_err(|e| CodecError::Declined(format!("not an AVIF container: {e:?}")))?;
        let color = decode_picture(&avif.primary_item, |pic| {
            YuvPlanes::from_picture(pic)?.to_rgb()
        })?;

        let Some(alpha_item) = &avif.alpha_item else {
            return still(color, 3);
        };
        let alpha = decode_picture(alpha_item, alpha_plane)?;
        if (alpha.width, alpha.height) != (color.width, color.height) {
            warn!(
                "AVIF alpha plane is {}x{} but the image is {}x{}; ignoring it",
                alpha.width, alpha.height, color.width, color.height
            );
            return still(color, 3);
        }
        let rgba = merge_alpha(&color, &alpha, avif.premultiplied_alpha)?;
        still(rgba, 4)
    }
}

/// An 8-bit interleaved plane set straight out of the converter.
struct Plane {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

fn still(plane: Plane, channels: u8) -> Result<Box<dyn FrameDecoder>, CodecError> {
    let frame = RawFrame::new(plane.samples, plane.width, plane.height, channels)?;
    Ok(Box::new(StillImage::new(frame)))
}

fn rav1d_error(what: &str, rc: i32) -> CodecError {
    if rc == -ENOMEM {
        CodecError::OutOfMemory(format!("rav1d {what} ran out of memory"))
    } else {
        CodecError::Declined(format!("rav1d {what} failed ({rc})"))
    }
}

/// Decode one AV1 still and hand the picture to `convert` before it is
/// released.
fn decode_picture<T>(
    av1_bytes: &[u8],
    convert: impl FnOnce(&Dav1dPicture) -> Result<T, CodecError>,
) -> Result<T, CodecError> {
    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let settings_ptr = NonNull::new(settings.as_mut_ptr())
        .ok_or_else(|| CodecError::Fault("rav1d settings pointer is null".into()))?;
    unsafe { rav1d::src::lib::dav1d_default_settings(settings_ptr) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc =
        unsafe { rav1d::src::lib::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(rav1d_error("open", rc.0));
    }

    let mut data = Dav1dData::default();
    let buf_ptr =
        unsafe { rav1d::src::lib::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf_ptr.is_null() {
        unsafe { rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(CodecError::OutOfMemory(
            "rav1d could not allocate its input buffer".into(),
        ));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

    let rc = unsafe { rav1d::src::lib::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            rav1d::src::lib::dav1d_data_unref(NonNull::new(&mut data));
            rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(rav1d_error("send_data", rc.0));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { rav1d::src::lib::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(rav1d_error("get_picture", rc.0));
    }

    let converted = convert(&pic);

    unsafe {
        rav1d::src::lib::dav1d_picture_unref(NonNull::new(&mut pic));
        rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx));
    }
    converted
}

/// The luma plane of an alpha picture, scaled to 8 bits.
fn alpha_plane(pic: &Dav1dPicture) -> Result<Plane, CodecError> {
    let ptr = pic.data[0]
        .map(|p| p.as_ptr() as *const u8)
        .ok_or_else(|| CodecError::Fault("rav1d alpha picture has no luma plane".into()))?;
    let (width, height, bpc) = (pic.p.w as u32, pic.p.h as u32, pic.p.bpc as u32);
    let scale = 255.0 / ((1u32 << bpc) - 1) as f32;

    let mut samples = alloc(width as usize * height as usize)?;
    for row in 0..height {
        for col in 0..width {
            let value = read_pixel(ptr, pic.stride[0], col, row, bpc) * scale;
            samples[row as usize * width as usize + col as usize] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(Plane {
        width,
        height,
        samples,
    })
}

/// Interleave `alpha` into `color`, dividing premultiplied color back out.
fn merge_alpha(color: &Plane, alpha: &Plane, premultiplied: bool) -> Result<Plane, CodecError> {
    let mut rgba = alloc(alpha.samples.len() * 4)?;
    for ((out, rgb), &a) in rgba
        .chunks_exact_mut(4)
        .zip(color.samples.chunks_exact(3))
        .zip(&alpha.samples)
    {
        for (dst, &c) in out.iter_mut().zip(rgb) {
            *dst = match a {
                _ if !premultiplied => c,
                0 => 0,
                a => ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8,
            };
        }
        out[3] = a;
    }
    Ok(Plane {
        width: color.width,
        height: color.height,
        samples: rgba,
    })
}

/// Decoded YUV plane data from rav1d, ready for RGB conversion.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling: horizontal, vertical (e.g. I420 = true, true)
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    fn from_picture(pic: &Dav1dPicture) -> Result<Self, CodecError> {
        let plane = |i: usize| {
            pic.data[i]
                .map(|p| p.as_ptr() as *const u8)
                .ok_or_else(|| CodecError::Fault(format!("rav1d picture lacks plane {i}")))
        };
        let y_ptr = plane(0)?;
        let layout = pic.p.layout;
        let (u_ptr, v_ptr, ss_x, ss_y, monochrome) = match layout {
            DAV1D_PIXEL_LAYOUT_I400 => (y_ptr, y_ptr, false, false, true),
            DAV1D_PIXEL_LAYOUT_I420 => (plane(1)?, plane(2)?, true, true, false),
            DAV1D_PIXEL_LAYOUT_I422 => (plane(1)?, plane(2)?, true, false, false),
            DAV1D_PIXEL_LAYOUT_I444 => (plane(1)?, plane(2)?, false, false, false),
            _ => {
                return Err(CodecError::Declined(format!(
                    "unsupported AVIF pixel layout: {layout}"
                )));
            }
        };
        Ok(Self {
            y_ptr,
            u_ptr,
            v_ptr,
            y_stride: pic.stride[0],
            uv_stride: if monochrome { 0 } else { pic.stride[1] },
            width: pic.p.w as u32,
            height: pic.p.h as u32,
            bpc: pic.p.bpc as u32,
            ss_x,
            ss_y,
            monochrome,
        })
    }

    /// Convert YUV planes to interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Result<Plane, CodecError> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;

        let mut rgb = alloc(self.width as usize * self.height as usize * 3)?;

        for row in 0..self.height {
            for col in 0..self.width {
                let y_val = read_pixel(self.y_ptr, self.y_stride, col, row, self.bpc);

                let (r, g, b) = if self.monochrome {
                    let v = (y_val * scale).clamp(0.0, 255.0);
                    (v, v, v)
                } else {
                    let u_col = if self.ss_x { col / 2 } else { col };
                    let u_row = if self.ss_y { row / 2 } else { row };
                    let cb = read_pixel(self.u_ptr, self.uv_stride, u_col, u_row, self.bpc) - center;
                    let cr = read_pixel(self.v_ptr, self.uv_stride, u_col, u_row, self.bpc) - center;
                    (
                        ((y_val + 1.402 * cr) * scale).clamp(0.0, 255.0),
                        ((y_val - 0.344136 * cb - 0.714136 * cr) * scale).clamp(0.0, 255.0),
                        ((y_val + 1.772 * cb) * scale).clamp(0.0, 255.0),
                    )
                };

                let idx = (row as usize * self.width as usize + col as usize) * 3;
                rgb[idx] = r as u8;
                rgb[idx + 1] = g as u8;
                rgb[idx + 2] = b as u8;
            }
        }

        Ok(Plane {
            width: self.width,
            height: self.height,
            samples: rgb,
        })
    }
}

/// Read a single sample from a plane; 10- and 12-bit samples are stored as u16.
#[inline]
fn read_pixel(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    if bpc <= 8 {
        (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
    } else {
        let byte_offset = y as isize * stride + x as isize * 2;
        (unsafe { (ptr.offset(byte_offset) as *const u16).read_unaligned() }) as f32
    }
}
