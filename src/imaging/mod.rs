//! Codecs and pixel operations in pure Rust, no system libraries.
//!
//! | Concern | Crate / module |
//! |---|---|
//! | **JPEG, PNG/APNG, GIF, WebP, BMP, TGA, QOI, TIFF** | `image` crate ([`rust_backend`]) |
//! | **AVIF** | `avif-parse` + `rav1d` ([`avif`]) |
//! | **JPEG XL** | `jxl-oxide` ([`jxl`]) |
//! | **DDS** | `image_dds` ([`dds`]) |
//! | **PSD / PSB** | built-in composite reader + JPEG thumbnail ([`psd`]) |
//! | **Camera RAW** | `rawloader` + `imagepipe`, embedded JPEG preview extractor ([`raw`]) |
//! | **Container metadata** | byte-level walkers ([`markers`]) |
//! | **Display geometry** | pure calculations ([`calculations`]) |
//!
//! The module is split into:
//! - **Backend**: the [`Codec`] / [`FrameDecoder`] traits and shared frame types
//! - **Codecs**: [`Source`] slots and the [`CodecSet`] registry
//! - **Calculations**: pure functions for zoom, clip and pan math (unit testable)
//! - **Pixels**: rotation, alpha blending and RGBA expansion

pub mod avif;
pub mod backend;
mod calculations;
pub mod codecs;
pub mod dds;
pub mod jxl;
pub(crate) mod markers;
pub mod pixels;
pub mod psd;
pub mod raw;
pub mod rust_backend;

pub use backend::{
    Codec, CodecError, FrameDecoder, OpenDecoder, RawFrame, StillImage, Unavailable,
};
pub use calculations::{
    AutoZoomMode, Layout, MAX_RENDER_DIMENSION, auto_zoom_size, compute_layout, limit_offset,
    offset_limit, target_size,
};
pub use codecs::{CodecSet, Source};
