//! Loader configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults
//! are the base layer; a user `config.toml` only needs the keys it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [decode]
//! force_native = false          # JPEG through the generic decoder first
//! use_color_profiles = false    # implies force_native
//! background = [255, 255, 255]  # RGB behind transparent pixels
//! raw_preference = 0            # 0-3, see below
//!
//! [limits]
//! max_jpeg_file_size = 314572800
//! max_png_file_size = 314572800
//! max_webp_file_size = 104857600
//! max_jxl_file_size = 209715200
//! max_heif_file_size = 209715200
//! max_file_size = 524288000
//! max_image_pixels = 300000000
//! max_image_dimension = 65535
//!
//! [display]
//! auto_zoom = "fit"             # fit | fit-no-zoom | fill | fill-no-zoom
//! process_after_load = true
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::AutoZoomMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Loader configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Decoder selection and pixel handling.
    pub decode: DecodeConfig,
    /// File and image size ceilings.
    pub limits: LimitsConfig,
    /// Post-decode geometry.
    pub display: DisplayConfig,
}

impl LoaderConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decode.raw_preference > 3 {
            return Err(ConfigError::Validation(
                "decode.raw_preference must be 0-3".into(),
            ));
        }
        let limits = &self.limits;
        let caps = [
            ("max_jpeg_file_size", limits.max_jpeg_file_size),
            ("max_png_file_size", limits.max_png_file_size),
            ("max_webp_file_size", limits.max_webp_file_size),
            ("max_jxl_file_size", limits.max_jxl_file_size),
            ("max_heif_file_size", limits.max_heif_file_size),
            ("max_file_size", limits.max_file_size),
            ("max_image_pixels", limits.max_image_pixels),
        ];
        if let Some((name, _)) = caps.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Validation(format!(
                "limits.{name} must be non-zero"
            )));
        }
        if limits.max_image_dimension == 0 {
            return Err(ConfigError::Validation(
                "limits.max_image_dimension must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeConfig {
    /// Decode JPEG through the generic decoder before the dedicated one.
    pub force_native: bool,
    /// Color-managed decoding; routes JPEG like `force_native`.
    pub use_color_profiles: bool,
    /// Background composited behind transparent pixels.
    pub background: [u8; 3],
    /// Camera RAW strategy:
    /// 0 = full render, built-in fallback; 1 = preview only;
    /// 2 = full, built-in, then preview; 3 = preview, full, then built-in.
    pub raw_preference: u8,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            force_native: false,
            use_color_profiles: false,
            background: [255, 255, 255],
            raw_preference: 0,
        }
    }
}

impl DecodeConfig {
    pub fn prefers_native_jpeg(&self) -> bool {
        self.force_native || self.use_color_profiles
    }
}

/// Size ceilings. File sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_jpeg_file_size: u64,
    pub max_png_file_size: u64,
    pub max_webp_file_size: u64,
    pub max_jxl_file_size: u64,
    pub max_heif_file_size: u64,
    /// Ceiling for every format without its own.
    pub max_file_size: u64,
    /// Largest frame the generic decoder accepts, in pixels.
    pub max_image_pixels: u64,
    /// Largest frame side the generic decoder accepts.
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_jpeg_file_size: 300 * MIB,
            max_png_file_size: 300 * MIB,
            max_webp_file_size: 100 * MIB,
            max_jxl_file_size: 200 * MIB,
            max_heif_file_size: 200 * MIB,
            max_file_size: 500 * MIB,
            max_image_pixels: 300_000_000,
            max_image_dimension: 65535,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Policy used when a request asks for automatic zoom.
    pub auto_zoom: AutoZoomMode,
    /// When false, processing stops after rotation and no display buffer
    /// is rendered.
    pub process_after_load: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            auto_zoom: AutoZoomMode::Fit,
            process_after_load: true,
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(LoaderConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<LoaderConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: LoaderConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<LoaderConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(dir)?)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixload configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Decoding
# ---------------------------------------------------------------------------
[decode]
# Decode JPEG with the generic decoder first, falling back to the
# dedicated JPEG decoder.
force_native = false

# Color-managed decoding. Routes JPEG through the generic decoder, like
# force_native.
use_color_profiles = false

# RGB color composited behind transparent pixels.
background = [255, 255, 255]

# Camera RAW strategy:
#   0 = full render, then the built-in embedded-preview reader
#   1 = embedded preview only
#   2 = full render, built-in reader, then embedded preview
#   3 = embedded preview, full render, then built-in reader
raw_preference = 0

# ---------------------------------------------------------------------------
# Size ceilings
# ---------------------------------------------------------------------------
# Files above their ceiling are rejected as out-of-memory without being
# decoded. Sizes are in bytes.
[limits]
max_jpeg_file_size = 314572800   # 300 MiB
max_png_file_size = 314572800    # 300 MiB, also QOI
max_webp_file_size = 104857600   # 100 MiB
max_jxl_file_size = 209715200    # 200 MiB
max_heif_file_size = 209715200   # 200 MiB, also AVIF
max_file_size = 524288000        # 500 MiB, every other format

# Frames beyond these are rejected by the generic decoder. Too many pixels
# counts as out-of-memory; a side over the limit just skips the decoder.
max_image_pixels = 300000000
max_image_dimension = 65535

# ---------------------------------------------------------------------------
# Display geometry
# ---------------------------------------------------------------------------
[display]
# Used when a request asks for automatic zoom:
#   fit          - whole image visible
#   fit-no-zoom  - like fit, never enlarges
#   fill         - viewport fully covered
#   fill-no-zoom - like fill, never enlarges
auto_zoom = "fit"

# Set to false to stop after rotation and skip rendering a display buffer.
process_after_load = true
"##
}
