//! Decode dispatcher: format tag in, pixels out.
//!
//! Every format maps to an ordered list of [`Step`]s. Each step names a codec
//! [`Source`] and says what to do when that codec declines the file, runs out
//! of memory or faults. Faults end the chain unless the step says otherwise;
//! AVIF is the one format that still tries HEIF after a faulting decoder.
//!
//! ```text
//! identify ─► retain_only(family) ─► step 1 ─► step 2 ─► ...
//!                                      │
//!                     cache hit? ──────┤ no: read_capped + open
//!                                      ▼
//!                         decode_frame ─► blend ─► DecodedImage
//! ```
//!
//! The dispatcher owns the [`DecoderCache`] and is driven from the loader's
//! worker thread only.

use crate::cache::DecoderCache;
use crate::config::{DecodeConfig, LimitsConfig, LoaderConfig};
use crate::format::{self, FormatTag};
use crate::imaging::pixels::blend_background;
use crate::imaging::rust_backend::DEFAULT_FRAME_DELAY_MS;
use crate::imaging::{CodecError, CodecSet, OpenDecoder, Source};
use crate::metadata::{self, content_hash};
use crate::types::DecodedImage;
use log::{debug, warn};
use serde::Serialize;
use std::collections::TryReserveError;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// What a failed step lets the chain do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnFailure {
    Next,
    Stop,
}

/// One entry of a fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Step {
    pub source: Source,
    pub on_declined: OnFailure,
    pub on_oom: OnFailure,
    pub on_fault: OnFailure,
}

impl Step {
    pub const fn new(source: Source) -> Self {
        Self {
            source,
            on_declined: OnFailure::Next,
            on_oom: OnFailure::Next,
            on_fault: OnFailure::Stop,
        }
    }

    pub const fn stop_on_oom(mut self) -> Self {
        self.on_oom = OnFailure::Stop;
        self
    }

    pub const fn next_on_fault(mut self) -> Self {
        self.on_fault = OnFailure::Next;
        self
    }
}

/// The fallback chain for `format`.
pub fn attempts(format: FormatTag, config: &DecodeConfig) -> Vec<Step> {
    match format {
        FormatTag::Jpeg if config.prefers_native_jpeg() => vec![
            Step::new(Source::Native),
            Step::new(Source::Jpeg).stop_on_oom(),
        ],
        FormatTag::Jpeg => vec![
            Step::new(Source::Jpeg).stop_on_oom(),
            Step::new(Source::Native),
        ],
        FormatTag::Bmp => vec![
            Step::new(Source::Bmp).stop_on_oom(),
            Step::new(Source::Native),
        ],
        FormatTag::Png => vec![
            Step::new(Source::Png).stop_on_oom(),
            Step::new(Source::Native),
        ],
        FormatTag::Avif => vec![
            Step::new(Source::Avif).next_on_fault(),
            Step::new(Source::Heif),
        ],
        FormatTag::Psd => vec![
            Step::new(Source::PsdImage).stop_on_oom(),
            Step::new(Source::PsdThumb),
        ],
        FormatTag::Tga => vec![Step::new(Source::Tga)],
        FormatTag::Webp => vec![Step::new(Source::Webp)],
        FormatTag::Jxl => vec![Step::new(Source::Jxl)],
        FormatTag::Heif => vec![Step::new(Source::Heif)],
        FormatTag::Qoi => vec![Step::new(Source::Qoi)],
        FormatTag::Dds => vec![Step::new(Source::Dds)],
        FormatTag::Wic => vec![Step::new(Source::Vendor)],
        FormatTag::CameraRaw => raw_steps(config.raw_preference),
        FormatTag::Gif | FormatTag::Tiff | FormatTag::Unknown => vec![Step::new(Source::Native)],
    }
}

/// RAW chains by preference:
///
/// | Preference | Order |
/// |---|---|
/// | 0 | full render, built-in preview |
/// | 1 | external preview only |
/// | 2 | full render, built-in preview, external preview |
/// | 3 | external preview, full render, built-in preview |
fn raw_steps(preference: u8) -> Vec<Step> {
    let order: &[Source] = match preference {
        1 => &[Source::RawPreview],
        2 => &[Source::RawFull, Source::RawBuiltin, Source::RawPreview],
        3 => &[Source::RawPreview, Source::RawFull, Source::RawBuiltin],
        _ => &[Source::RawFull, Source::RawBuiltin],
    };
    order.iter().copied().map(Step::new).collect()
}

/// File-size ceiling applied before `source` sees the bytes.
pub fn cap_for(source: Source, limits: &LimitsConfig) -> u64 {
    match source {
        Source::Jpeg => limits.max_jpeg_file_size,
        Source::Png | Source::Qoi => limits.max_png_file_size,
        Source::Webp => limits.max_webp_file_size,
        Source::Jxl => limits.max_jxl_file_size,
        Source::Avif | Source::Heif => limits.max_heif_file_size,
        _ => limits.max_file_size,
    }
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("file is {size} bytes, limit is {cap}")]
    TooLarge { size: u64, cap: u64 },
    #[error("cannot allocate read buffer: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

/// Read a whole file, refusing anything larger than `cap` bytes.
pub fn read_capped(path: &Path, cap: u64) -> Result<Vec<u8>, ReadError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size > cap {
        return Err(ReadError::TooLarge { size, cap });
    }
    let mut data = Vec::new();
    data.try_reserve_exact(usize::try_from(size).unwrap_or(usize::MAX))?;
    (&mut file).take(cap.saturating_add(1)).read_to_end(&mut data)?;
    let read = data.len() as u64;
    if read > cap {
        return Err(ReadError::TooLarge { size: read, cap });
    }
    Ok(data)
}

/// How one step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "outcome", content = "detail")]
pub enum StepOutcome {
    Decoded,
    /// The file could not be opened or read.
    Unreadable(String),
    Declined(String),
    OutOfMemory(String),
    Fault(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Decoded => f.write_str("decoded"),
            StepOutcome::Unreadable(msg) => write!(f, "unreadable: {msg}"),
            StepOutcome::Declined(msg) => write!(f, "declined: {msg}"),
            StepOutcome::OutOfMemory(msg) => write!(f, "out of memory: {msg}"),
            StepOutcome::Fault(msg) => write!(f, "fault: {msg}"),
        }
    }
}

impl From<CodecError> for StepOutcome {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Declined(msg) => StepOutcome::Declined(msg),
            CodecError::OutOfMemory(msg) => StepOutcome::OutOfMemory(msg),
            CodecError::Fault(msg) => StepOutcome::Fault(msg),
        }
    }
}

impl From<ReadError> for StepOutcome {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Io(e) => StepOutcome::Unreadable(e.to_string()),
            other => StepOutcome::OutOfMemory(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub source: Source,
    pub outcome: StepOutcome,
}

/// Everything one dispatch produced.
#[derive(Debug, Default)]
pub struct DecodeReport {
    pub image: Option<DecodedImage>,
    pub out_of_memory: bool,
    pub exception: bool,
    pub steps: Vec<StepRecord>,
}

impl DecodeReport {
    /// Sources tried, in order.
    pub fn sources(&self) -> Vec<Source> {
        self.steps.iter().map(|s| s.source).collect()
    }
}

pub struct Dispatcher {
    codecs: CodecSet,
    cache: DecoderCache,
    decode: DecodeConfig,
    limits: LimitsConfig,
}

impl Dispatcher {
    pub fn new(codecs: CodecSet, config: &LoaderConfig) -> Self {
        Self {
            codecs,
            cache: DecoderCache::new(),
            decode: config.decode.clone(),
            limits: config.limits.clone(),
        }
    }

    pub fn cache(&self) -> &DecoderCache {
        &self.cache
    }

    /// Drop cached decoders holding `path`.
    pub fn release(&mut self, path: &Path) -> bool {
        self.cache.release(path)
    }

    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
    }

    /// Identify `path` and run its fallback chain.
    pub fn decode(&mut self, path: &Path, frame: u32) -> DecodeReport {
        let format = format::identify(path);
        self.decode_as(path, format, frame)
    }

    /// Run the fallback chain for an already identified file.
    pub fn decode_as(&mut self, path: &Path, format: FormatTag, frame: u32) -> DecodeReport {
        self.cache.retain_only(format.family());

        let mut report = DecodeReport::default();
        for step in attempts(format, &self.decode) {
            let outcome = match self.attempt(step.source, path, format, frame) {
                Ok(image) => {
                    report.image = Some(image);
                    report.out_of_memory = false;
                    StepOutcome::Decoded
                }
                Err(outcome) => outcome,
            };
            debug!("{} via {}: {outcome}", path.display(), step.source);

            let proceed = match &outcome {
                StepOutcome::Decoded | StepOutcome::Unreadable(_) => false,
                StepOutcome::Declined(_) => step.on_declined == OnFailure::Next,
                StepOutcome::OutOfMemory(_) => {
                    report.out_of_memory = true;
                    step.on_oom == OnFailure::Next
                }
                StepOutcome::Fault(msg) => {
                    warn!("{} decoder fault in {}: {msg}", step.source, path.display());
                    report.exception = true;
                    step.on_fault == OnFailure::Next
                }
            };
            report.steps.push(StepRecord {
                source: step.source,
                outcome,
            });
            if !proceed {
                break;
            }
        }
        report
    }

    fn attempt(
        &mut self,
        source: Source,
        path: &Path,
        format: FormatTag,
        frame: u32,
    ) -> Result<DecodedImage, StepOutcome> {
        let family = source.family();
        let cached = family.and_then(|f| self.cache.checkout(f, path));

        let (mut open, hash) = match cached {
            Some(open) => (open, 0),
            None => {
                let data = read_capped(path, cap_for(source, &self.limits))?;
                let metadata = metadata::for_format(format, &data);
                let hash = if format == FormatTag::Jpeg {
                    content_hash(&data)
                } else {
                    0
                };
                let decoder = self.codecs.get(source).open(data)?;
                (OpenDecoder { decoder, metadata }, hash)
            }
        };

        let frame_count = open.decoder.frame_count().max(1);
        let index = frame.min(frame_count - 1);
        let raw = open.decoder.decode_frame(index)?;

        let mut pixels = raw.pixels;
        if raw.channels == 4 && source.blends_alpha() {
            blend_background(&mut pixels, self.decode.background);
        }
        let animated = frame_count > 1;
        let duration_ms = match raw.duration_ms {
            0 if animated => DEFAULT_FRAME_DELAY_MS,
            ms => ms,
        };
        let metadata = open.metadata.clone();

        if animated {
            if let Some(family) = family {
                self.cache.put(family, path, open);
            }
        }

        Ok(DecodedImage {
            pixels,
            width: raw.width,
            height: raw.height,
            channels: raw.channels,
            format,
            frame_index: index,
            frame_count,
            duration_ms,
            animated,
            metadata,
            content_hash: hash,
            load_duration: Duration::ZERO,
            rotation: 0,
            layout: None,
            display: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Family;
    use crate::imaging::Codec;
    use crate::imaging::backend::tests::{CallLog, MockBehavior, MockCodec, new_log, opened};
    use crate::test_helpers::{encode_jpeg, write_fixture};
    use tempfile::TempDir;

    fn declining(log: &CallLog) -> CodecSet {
        CodecSet::from_fn(|source| -> Box<dyn Codec> {
            Box::new(MockCodec::new(source.name(), MockBehavior::Decline, log))
        })
    }

    fn sources(steps: &[Step]) -> Vec<Source> {
        steps.iter().map(|s| s.source).collect()
    }

    // =========================================================================
    // Step tables
    // =========================================================================

    #[test]
    fn jpeg_chain_depends_on_native_preference() {
        let mut config = DecodeConfig::default();
        let steps = attempts(FormatTag::Jpeg, &config);
        assert_eq!(sources(&steps), vec![Source::Jpeg, Source::Native]);
        assert_eq!(steps[0].on_oom, OnFailure::Stop);

        config.use_color_profiles = true;
        let steps = attempts(FormatTag::Jpeg, &config);
        assert_eq!(sources(&steps), vec![Source::Native, Source::Jpeg]);
        assert_eq!(steps[0].on_oom, OnFailure::Next);
        assert_eq!(steps[1].on_oom, OnFailure::Stop);
    }

    #[test]
    fn single_and_paired_chains() {
        let config = DecodeConfig::default();
        let chain = |f| sources(&attempts(f, &config));
        assert_eq!(chain(FormatTag::Png), vec![Source::Png, Source::Native]);
        assert_eq!(chain(FormatTag::Bmp), vec![Source::Bmp, Source::Native]);
        assert_eq!(chain(FormatTag::Avif), vec![Source::Avif, Source::Heif]);
        assert_eq!(chain(FormatTag::Psd), vec![Source::PsdImage, Source::PsdThumb]);
        assert_eq!(chain(FormatTag::Wic), vec![Source::Vendor]);
        assert_eq!(chain(FormatTag::Tga), vec![Source::Tga]);
        for f in [FormatTag::Gif, FormatTag::Tiff, FormatTag::Unknown] {
            assert_eq!(chain(f), vec![Source::Native]);
        }
        let avif = attempts(FormatTag::Avif, &config);
        assert_eq!(avif[0].on_oom, OnFailure::Next);
        assert_eq!(avif[0].on_fault, OnFailure::Next);
        assert_eq!(avif[1].on_fault, OnFailure::Stop);
        assert!(
            attempts(FormatTag::Jpeg, &config)
                .iter()
                .all(|s| s.on_fault == OnFailure::Stop)
        );
    }

    #[test]
    fn raw_preference_orders() {
        let mut config = DecodeConfig::default();
        let expected = [
            vec![Source::RawFull, Source::RawBuiltin],
            vec![Source::RawPreview],
            vec![Source::RawFull, Source::RawBuiltin, Source::RawPreview],
            vec![Source::RawPreview, Source::RawFull, Source::RawBuiltin],
        ];
        for (pref, want) in expected.into_iter().enumerate() {
            config.raw_preference = pref as u8;
            let steps = attempts(FormatTag::CameraRaw, &config);
            assert_eq!(sources(&steps), want);
            assert!(steps.iter().all(|s| s.on_oom == OnFailure::Next));
        }
    }

    #[test]
    fn caps_per_source() {
        let limits = LimitsConfig::default();
        assert_eq!(cap_for(Source::Jpeg, &limits), limits.max_jpeg_file_size);
        assert_eq!(cap_for(Source::Qoi, &limits), limits.max_png_file_size);
        assert_eq!(cap_for(Source::Heif, &limits), limits.max_heif_file_size);
        assert_eq!(cap_for(Source::Dds, &limits), limits.max_file_size);
    }

    // =========================================================================
    // read_capped
    // =========================================================================

    #[test]
    fn read_capped_enforces_limit() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), "f.bin", &[7u8; 10]);
        assert_eq!(read_capped(&path, 10).unwrap().len(), 10);
        assert!(matches!(
            read_capped(&path, 9),
            Err(ReadError::TooLarge { size: 10, cap: 9 })
        ));
        assert!(matches!(
            read_capped(&tmp.path().join("missing"), 10),
            Err(ReadError::Io(_))
        ));
    }

    // =========================================================================
    // Fallback behaviour
    // =========================================================================

    #[test]
    fn declined_step_falls_through() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), "a.jpg", b"\xFF\xD8 not really");
        let log = new_log();
        let codecs = declining(&log).with(Source::Native, MockCodec::rgb("native", 4, 3, &log));
        let mut dispatcher = Dispatcher::new(codecs, &LoaderConfig::default());

        let report = dispatcher.decode(&path, 0);
        let image = report.image.as_ref().unwrap();
        assert_eq!((image.width, image.height, image.channels), (4, 3, 3));
        assert_eq!(image.format, FormatTag::Jpeg);
        assert_eq!(report.sources(), vec![Source::Jpeg, Source::Native]);
        assert_eq!(opened(&log), vec!["jpeg", "native"]);
        assert!(!report.out_of_memory && !report.exception);
    }

    #[test]
    fn oom_with_stop_policy_ends_chain() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), "a.png", b"not a png");
        let log = new_log();
        let codecs = declining(&log)
            .with(Source::Png, MockCodec::new("png", MockBehavior::OutOfMemory, &log))
            .with(Source::Native, MockCodec::rgb("native", 2, 2, &log));
        let mut dispatcher = Dispatcher::new(codecs, &LoaderConfig::default());

        let report = dispatcher.decode(&path, 0);
        assert!(report.image.is_none());
        assert!(report.out_of_memory);
        assert_eq!(opened(&log), vec!["png"]);
    }

    #[test]
    fn later_success_clears_oom() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), "a.avif", b"....");
        let log = new_log();
        let codecs = declining(&log)
            .with(Source::Avif, MockCodec::new("avif", MockBehavior::OutOfMemory, &log))
            .with(Source::Heif, MockCodec::rgb("heif", 2, 2, &log));
        let mut dispatcher = Dispatcher::new(codecs, &LoaderConfig::default());

        let report = dispatcher.decode(&path, 0);
        assert!(report.image.is_some());
        assert!(!report.out_of_memory);
        assert!(matches!(report.steps[0].outcome, StepOutcome::OutOfMemory(_)));
        assert_eq!(report.steps[1].outcome, StepOutcome::Decoded);
    }

    #[test]
    fn fault_stops_and_sets_exception() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), "a.bmp", b"BM junk");
        let log = new_log();
        let codecs = declining(&log)
            .with(Source::Bmp, MockCodec::new("bmp", MockBehavior::Fault, &log))
            .with(Source::Native, MockCodec::rgb("native", 2, 2, &log));
        let mut dispatcher = Dispatcher::new(codecs, &LoaderConfig::default());

        let report = dispatcher.decode(&path, 0);
        assert!(report.image.is_none());
        assert!(report.exception);
        assert!(!report.out_of_memory);
        assert_eq!(opened(&log), vec!["bmp"]);
    }

    #[test]
    fn avif_fault_still_tries_heif() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), "a.avif", b"\0\0\0\x1cftypavif");
        let log = new_log();
        let codecs = declining(&log)
            .with(Source::Avif, MockCodec::new("avif", MockBehavior::Fault, &log))
            .with(Source::Heif, MockCodec::rgb("heif", 3, 2, &log));
        let mut dispatcher = Dispatcher::new(codecs, &LoaderConfig::default());

        let report = dispatcher.decode(&path, 0);
        assert_eq!(opened(&log), vec!["avif", "heif"]);
        let image = report.image.as_ref().unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(image.format, FormatTag::Avif);
        assert!(matches!(report.steps[0].outcome, StepOutcome::Fault(_)));
        assert_eq!(report.steps[1].outcome, StepOutcome::Decoded);
        // The fault is still reported alongside the fallback image.
        assert!(report.exception);
        assert!(!report.out_of_memory);
    }

    #[test]
    fn missing_file_sets_no_flags() {
        let tmp = TempDir::new().unwrap();
        let log = new_log();
        let mut dispatcher = Dispatcher::new(declining(&log), &LoaderConfig::default());

        let report = dispatcher.decode(&tmp.path().join("gone.jpg"), 0);
        assert!(report.image.is_none());
        assert!(!report.out_of_memory && !report.exception);
        assert_eq!(report.steps.len(), 1);
        assert!(matches!(report.steps[0].outcome, StepOutcome::Unreadable(_)));
        assert!(opened(&log).is_empty());
    }

    #[test]
    fn oversized_file_is_oom_without_calling_codec() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), "big.jpg", &[0xFF, 0xD8, 0, 0, 0, 0, 0, 0]);
        let log = new_log();
        let codecs = declining(&log).with(Source::Jpeg, MockCodec::rgb("jpeg", 2, 2, &log));
        let mut config = LoaderConfig::default();
        config.limits.max_jpeg_file_size = 4;
        let mut dispatcher = Dispatcher::new(codecs, &config);

        let report = dispatcher.decode(&path, 0);
        assert!(report.image.is_none());
        assert!(report.out_of_memory);
        assert_eq!(report.sources(), vec![Source::Jpeg]);
        assert!(opened(&log).is_empty());
    }

    // =========================================================================
    // Pixels
    // =========================================================================

    #[test]
    fn alpha_blended_for_blending_sources_only() {
        let tmp = TempDir::new().unwrap();
        let png = write_fixture(tmp.path(), "a.png", b"\x89PNG\r\n\x1a\n");
        let dds = write_fixture(tmp.path(), "a.dds", b"DDS ");
        let rgba = MockBehavior::Succeed {
            width: 2,
            height: 1,
            channels: 4,
            frames: 1,
        };
        let log = new_log();
        let codecs = declining(&log)
            .with(Source::Png, MockCodec::new("png", rgba, &log))
            .with(Source::Dds, MockCodec::new("dds", rgba, &log));
        let mut dispatcher = Dispatcher::new(codecs, &LoaderConfig::default());

        let blended = dispatcher.decode(&png, 0).image.unwrap();
        assert_eq!(blended.channels, 4);
        assert!(blended.pixels.chunks(4).all(|px| px[3] == 255));
        assert!(blended.pixels[0] > 0x80);

        let untouched = dispatcher.decode(&dds, 0).image.unwrap();
        assert!(untouched.pixels.iter().all(|&b| b == 0x80));
    }

    #[test]
    fn jpeg_carries_hash_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let data = encode_jpeg(16, 8);
        let path = write_fixture(tmp.path(), "photo.jpg", &data);
        let config = LoaderConfig::default();
        let mut dispatcher = Dispatcher::new(CodecSet::builtin(&config.limits), &config);

        let image = dispatcher.decode(&path, 0).image.unwrap();
        assert_eq!((image.width, image.height), (16, 8));
        assert_eq!(image.content_hash, content_hash(&data));
        assert!(!image.animated);
        assert_eq!(image.duration_ms, 0);
    }

    // =========================================================================
    // Decoder cache
    // =========================================================================

    fn animated(log: &CallLog) -> CodecSet {
        declining(log).with(
            Source::Native,
            MockCodec::new(
                "native",
                MockBehavior::Succeed {
                    width: 2,
                    height: 2,
                    channels: 3,
                    frames: 3,
                },
                log,
            ),
        )
    }

    #[test]
    fn animated_decoder_is_reused_across_frames() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), "anim.gif", b"GIF89a....");
        let log = new_log();
        let mut dispatcher = Dispatcher::new(animated(&log), &LoaderConfig::default());

        let first = dispatcher.decode(&path, 0).image.unwrap();
        assert!(first.animated);
        assert_eq!(first.frame_count, 3);
        assert_eq!(first.duration_ms, 100);
        assert_eq!(dispatcher.cache().cached_file(Family::Native), Some(path.as_path()));

        // A hit must not touch the file.
        std::fs::remove_file(&path).unwrap();
        let clamped = dispatcher.decode_as(&path, FormatTag::Gif, 9).image.unwrap();
        assert_eq!(clamped.frame_index, 2);
        assert_eq!(clamped.pixels[0], 2);
        assert_eq!(opened(&log), vec!["native"]);
    }

    #[test]
    fn other_family_evicts_cache() {
        let tmp = TempDir::new().unwrap();
        let gif = write_fixture(tmp.path(), "anim.gif", b"GIF89a....");
        let png = write_fixture(tmp.path(), "still.png", b"\x89PNG\r\n\x1a\n");
        let log = new_log();
        let codecs = animated(&log).with(Source::Png, MockCodec::rgb("png", 1, 1, &log));
        let mut dispatcher = Dispatcher::new(codecs, &LoaderConfig::default());

        dispatcher.decode(&gif, 0);
        assert!(!dispatcher.cache().is_empty());
        dispatcher.decode(&png, 0);
        assert!(dispatcher.cache().is_empty());
    }

    #[test]
    fn release_drops_matching_entry() {
        let tmp = TempDir::new().unwrap();
        let gif = write_fixture(tmp.path(), "anim.gif", b"GIF89a....");
        let log = new_log();
        let mut dispatcher = Dispatcher::new(animated(&log), &LoaderConfig::default());

        dispatcher.decode(&gif, 1);
        assert!(!dispatcher.release(&tmp.path().join("other.gif")));
        assert!(dispatcher.release(&gif));
        assert!(dispatcher.cache().is_empty());
    }
}
