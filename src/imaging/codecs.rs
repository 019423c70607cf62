//! Codec slots and the registry that fills them.
//!
//! A [`Source`] names one place a decode step can get pixels from. The
//! dispatcher's fallback tables are written in terms of sources; the
//! [`CodecSet`] decides which [`Codec`] actually sits behind each one.
//!
//! | Source | Built-in codec |
//! |---|---|
//! | Jpeg, Bmp, Tga, Qoi | `image` crate, fixed format |
//! | Webp, Png | `image` crate, animation aware |
//! | Native | `image` crate, guessed format (GIF, TIFF, anything else) |
//! | Avif | `avif-parse` + `rav1d` |
//! | Jxl | `jxl-oxide`, frames rendered on demand |
//! | Dds | `image_dds` |
//! | PsdImage, PsdThumb | built-in composite reader, embedded JPEG thumbnail |
//! | RawFull | `rawloader` + `imagepipe` development |
//! | RawBuiltin | embedded JPEG preview extractor |
//! | Heif, RawPreview, Vendor | none: declines until replaced |

use super::avif::AvifCodec;
use super::backend::{Codec, Unavailable};
use super::dds::DdsCodec;
use super::jxl::JxlCodec;
use super::psd::{PsdCodec, PsdThumbnailCodec};
use super::raw::{DevelopedRawCodec, EmbeddedPreviewCodec};
use super::rust_backend::{ImageCodec, NativeCodec, PngCodec, WebpCodec};
use crate::cache::Family;
use crate::config::LimitsConfig;
use image::ImageFormat;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Jpeg,
    Native,
    Bmp,
    Tga,
    Webp,
    Png,
    Jxl,
    Avif,
    Heif,
    Qoi,
    PsdImage,
    PsdThumb,
    Dds,
    /// Full RAW development.
    RawFull,
    /// External RAW developer, embedded preview.
    RawPreview,
    /// Built-in embedded-preview extractor.
    RawBuiltin,
    /// Platform imaging API (JPEG XR and friends).
    Vendor,
}

impl Source {
    pub const ALL: [Source; 17] = [
        Source::Jpeg,
        Source::Native,
        Source::Bmp,
        Source::Tga,
        Source::Webp,
        Source::Png,
        Source::Jxl,
        Source::Avif,
        Source::Heif,
        Source::Qoi,
        Source::PsdImage,
        Source::PsdThumb,
        Source::Dds,
        Source::RawFull,
        Source::RawPreview,
        Source::RawBuiltin,
        Source::Vendor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Source::Jpeg => "jpeg",
            Source::Native => "native",
            Source::Bmp => "bmp",
            Source::Tga => "tga",
            Source::Webp => "webp",
            Source::Png => "png",
            Source::Jxl => "jxl",
            Source::Avif => "avif",
            Source::Heif => "heif",
            Source::Qoi => "qoi",
            Source::PsdImage => "psd-image",
            Source::PsdThumb => "psd-thumb",
            Source::Dds => "dds",
            Source::RawFull => "raw-full",
            Source::RawPreview => "raw-preview",
            Source::RawBuiltin => "raw-builtin",
            Source::Vendor => "vendor",
        }
    }

    /// Cache slot for decoders opened through this source.
    pub fn family(self) -> Option<Family> {
        match self {
            Source::Webp => Some(Family::Webp),
            Source::Png => Some(Family::Png),
            Source::Jxl => Some(Family::Jxl),
            Source::Avif => Some(Family::Avif),
            Source::Native => Some(Family::Native),
            _ => None,
        }
    }

    /// Whether RGBA output from this source is composited over the
    /// configured background before display.
    pub fn blends_alpha(self) -> bool {
        matches!(
            self,
            Source::Webp
                | Source::Png
                | Source::Jxl
                | Source::Avif
                | Source::Heif
                | Source::Qoi
                | Source::Tga
                | Source::Native
                | Source::Bmp
        )
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One codec per [`Source`].
pub struct CodecSet {
    codecs: Vec<Box<dyn Codec>>,
}

impl CodecSet {
    /// The codecs compiled into this crate.
    pub fn builtin(limits: &LimitsConfig) -> Self {
        Self::from_fn(|source| -> Box<dyn Codec> {
            match source {
                Source::Jpeg => Box::new(ImageCodec::new("jpeg", ImageFormat::Jpeg)),
                Source::Bmp => Box::new(ImageCodec::new("bmp", ImageFormat::Bmp)),
                Source::Tga => Box::new(ImageCodec::new("tga", ImageFormat::Tga)),
                Source::Qoi => Box::new(ImageCodec::new("qoi", ImageFormat::Qoi)),
                Source::Webp => Box::new(WebpCodec::new(limits.max_image_pixels)),
                Source::Png => Box::new(PngCodec::new(limits.max_image_pixels)),
                Source::Jxl => Box::new(JxlCodec::new(limits.max_image_pixels)),
                Source::Native => Box::new(NativeCodec::new(
                    limits.max_image_dimension,
                    limits.max_image_pixels,
                )),
                Source::Avif => Box::new(AvifCodec),
                Source::Dds => Box::new(DdsCodec::new(limits.max_image_pixels)),
                Source::PsdImage => Box::new(PsdCodec::new(limits.max_image_pixels)),
                Source::PsdThumb => Box::new(PsdThumbnailCodec),
                Source::RawFull => Box::new(DevelopedRawCodec::new(limits.max_image_pixels)),
                Source::RawBuiltin => Box::new(EmbeddedPreviewCodec),
                other => Box::new(Unavailable::new(other.name())),
            }
        })
    }

    pub fn from_fn(make: impl FnMut(Source) -> Box<dyn Codec>) -> Self {
        Self {
            codecs: Source::ALL.into_iter().map(make).collect(),
        }
    }

    /// Replace the codec behind `source`.
    pub fn with(mut self, source: Source, codec: impl Codec + 'static) -> Self {
        self.codecs[source as usize] = Box::new(codec);
        self
    }

    pub fn get(&self, source: Source) -> &dyn Codec {
        self.codecs[source as usize].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockCodec, new_log};

    #[test]
    fn all_is_in_discriminant_order() {
        for (i, source) in Source::ALL.iter().enumerate() {
            assert_eq!(*source as usize, i, "{source}");
        }
    }

    #[test]
    fn builtin_names_match_sources() {
        let set = CodecSet::builtin(&LimitsConfig::default());
        for source in [Source::Jpeg, Source::Jxl, Source::RawFull, Source::Vendor, Source::Heif] {
            assert_eq!(set.get(source).name(), source.name());
        }
    }

    #[test]
    fn missing_codecs_decline() {
        let set = CodecSet::builtin(&LimitsConfig::default());
        for source in [Source::Heif, Source::RawPreview, Source::Vendor] {
            assert!(set.get(source).open(vec![0; 32]).is_err(), "{source}");
        }
    }

    #[test]
    fn with_replaces_one_slot() {
        let log = new_log();
        let set = CodecSet::builtin(&LimitsConfig::default())
            .with(Source::Jxl, MockCodec::rgb("mock-jxl", 2, 2, &log));
        assert_eq!(set.get(Source::Jxl).name(), "mock-jxl");
        assert_eq!(set.get(Source::Png).name(), "png");
    }

    #[test]
    fn cached_families() {
        let cached: Vec<Source> = Source::ALL
            .into_iter()
            .filter(|s| s.family().is_some())
            .collect();
        assert_eq!(
            cached,
            vec![Source::Native, Source::Webp, Source::Png, Source::Jxl, Source::Avif]
        );
    }

    #[test]
    fn alpha_blending_sources() {
        assert!(Source::Png.blends_alpha());
        assert!(Source::Qoi.blends_alpha());
        assert!(!Source::Dds.blends_alpha());
        assert!(!Source::Jpeg.blends_alpha());
        assert!(!Source::PsdImage.blends_alpha());
    }
}
