//! # pixload
//!
//! The loading half of an image viewer: identify a file, decode the frame the
//! viewer asked for, and lay it out for the screen, all on a background
//! thread so the UI never waits on a codec.
//!
//! # Architecture: One Worker, Many Codecs
//!
//! ```text
//! submit ─► queue ─► worker ─┬─ 1. Sniff     first 16 bytes  →  FormatTag
//!                            ├─ 2. Dispatch  fallback chain   →  DecodedImage
//!                            ├─ 3. Finalize  rotate + layout  →  DisplayBuffer
//!                            └─ 4. Store     handle → result  →  LoadCompleted
//! ```
//!
//! Each stage is a plain function or struct that can be driven without the
//! loader, so unit tests exercise format detection, fallback order and
//! geometry without spinning up a thread.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`format`] | Magic-byte and extension sniffing into a [`FormatTag`] |
//! | [`dispatch`] | Per-format fallback chains, file-size caps, outcome flags |
//! | [`cache`] | One open decoder per codec family for cheap frame stepping |
//! | [`imaging`] | Codec traits, the codec registry and the shipped decoders |
//! | [`process`] | Rotation, zoom, clip and pan, plus the cached display render |
//! | [`loader`] | The request queue, the worker thread and the result store |
//! | [`metadata`] | EXIF blocks, JPEG comments and the JPEG content hash |
//! | [`config`] | `config.toml` loading, validation and the stock defaults |
//! | [`types`] | [`DecodedImage`] and [`DisplayBuffer`] |
//! | [`scan`] | Batch identification for the `identify` command |
//! | [`output`] | CLI output formatting, text and JSON |
//!
//! # Design Decisions
//!
//! ## Fallback Chains Are Data
//!
//! The order in which decoders are tried is a table ([`dispatch::attempts`]),
//! not nested `if`s. Each step says whether a benign failure or an
//! out-of-memory falls through to the next decoder. The steps a load actually
//! ran are returned with its result, so the order is observable in tests and
//! in `pixload decode` output.
//!
//! ## Exactly One Decoding Thread
//!
//! All codec work and every decoder-cache mutation happen on the worker. The
//! only locks guard the request queue and the result store, and both are held
//! for a push or a pop. A panicking codec is caught at the request boundary:
//! the request reports `exception`, the decoder cache is cleared, and the
//! next request runs normally.
//!
//! ## Pure-Rust Codecs
//!
//! Everything decodes through the `image` crate, `avif-parse` + `rav1d`,
//! `jxl-oxide`, `image_dds`, `rawloader` + `imagepipe`, or small built-in
//! readers (PSD, RAW previews). Formats that need a platform library (HEIF,
//! external RAW previews, JPEG XR) have slots in the registry that decline
//! until a codec is installed with [`imaging::CodecSet::with`].

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod format;
pub mod imaging;
pub mod loader;
pub mod metadata;
pub mod output;
pub mod process;
pub mod scan;
pub mod types;

pub use format::FormatTag;
pub use loader::{ImageLoader, LoadCompleted, LoadResult, RequestHandle, RequestState};
pub use process::ViewParams;
pub use types::{DecodedImage, DisplayBuffer};

#[cfg(test)]
pub(crate) mod test_helpers;
