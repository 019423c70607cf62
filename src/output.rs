//! CLI output formatting.
//!
//! Each command has a `format_*` function returning `Vec<String>` and a
//! `print_*` wrapper that writes to stdout. Format functions are pure, so
//! the layout is tested without capturing stdout.
//!
//! ## Decode
//!
//! ```text
//! photo.jpg
//!     Format: jpeg, frame 1/1
//!     Pixels: 640x480, 3 channels
//!     Display: 320x240 of 320x240 at (0, 0)
//!     Hash: 1f0e3dad99908345
//!     EXIF: 2048 bytes, orientation 90
//!     Steps: jpeg decoded
//!     Loaded in 12.3ms
//! ```
//!
//! ## Identify
//!
//! ```text
//! jpeg      640x480     1.2 MiB  photos/photo.jpg
//! unknown         -        10 B  notes.txt
//! ```

use crate::dispatch::{StepOutcome, StepRecord};
use crate::format::FormatTag;
use crate::imaging::Layout;
use crate::loader::LoadResult;
use crate::scan::ScanEntry;
use serde::Serialize;
use std::path::Path;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Bytes with a binary unit, one decimal above bytes.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn step_line(step: &StepRecord) -> String {
    match &step.outcome {
        StepOutcome::Decoded => format!("{} decoded", step.source),
        other => format!("{} {other}", step.source),
    }
}

// ============================================================================
// Decode
// ============================================================================

pub fn format_decode_result(path: &Path, result: &LoadResult) -> Vec<String> {
    let pad = indent(1);
    let mut lines = vec![path.display().to_string()];

    match &result.image {
        Some(image) => {
            lines.push(format!(
                "{pad}Format: {}, frame {}/{}{}",
                image.format,
                image.frame_index + 1,
                image.frame_count,
                if image.animated {
                    format!(", {} ms", image.duration_ms)
                } else {
                    String::new()
                }
            ));
            lines.push(format!(
                "{pad}Pixels: {}x{}, {} channels",
                image.width, image.height, image.channels
            ));
            if image.rotation != 0 {
                lines.push(format!("{pad}Rotated: {} degrees", image.rotation));
            }
            if let Some(layout) = &image.layout {
                lines.push(format!(
                    "{pad}Display: {}x{} of {}x{} at ({}, {})",
                    layout.clip.0,
                    layout.clip.1,
                    layout.full.0,
                    layout.full.1,
                    layout.origin.0,
                    layout.origin.1
                ));
            }
            if image.format == FormatTag::Jpeg {
                lines.push(format!("{pad}Hash: {:016x}", image.content_hash));
            }
            if let Some(meta) = &image.metadata {
                if let Some(exif) = &meta.exif {
                    match meta.orientation_degrees() {
                        Some(deg) => lines.push(format!(
                            "{pad}EXIF: {} bytes, orientation {deg}",
                            exif.len()
                        )),
                        None => lines.push(format!("{pad}EXIF: {} bytes", exif.len())),
                    }
                }
                if let Some(comment) = &meta.comment {
                    lines.push(format!("{pad}Comment: {comment}"));
                }
            }
        }
        None if result.exception => lines.push(format!("{pad}Failed: decoder error")),
        None if result.out_of_memory => lines.push(format!("{pad}Failed: out of memory")),
        None => lines.push(format!("{pad}Failed: not decodable")),
    }

    if !result.steps.is_empty() {
        let steps: Vec<String> = result.steps.iter().map(step_line).collect();
        lines.push(format!("{pad}Steps: {}", steps.join(", ")));
    }
    if let Some(image) = &result.image {
        lines.push(format!("{pad}Loaded in {:.1?}", image.load_duration));
    }
    lines
}

pub fn print_decode_result(path: &Path, result: &LoadResult) {
    for line in format_decode_result(path, result) {
        println!("{}", line);
    }
}

/// Serializable view of a [`LoadResult`] for `--json`.
#[derive(Debug, Serialize)]
pub struct DecodeSummary<'a> {
    pub path: &'a Path,
    pub out_of_memory: bool,
    pub exception: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSummary<'a>>,
    pub steps: &'a [StepRecord],
}

#[derive(Debug, Serialize)]
pub struct ImageSummary<'a> {
    pub format: FormatTag,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub frame_index: u32,
    pub frame_count: u32,
    pub duration_ms: u32,
    pub animated: bool,
    pub rotation: i32,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    pub load_ms: f64,
}

pub fn decode_summary<'a>(path: &'a Path, result: &'a LoadResult) -> DecodeSummary<'a> {
    let image = result.image.as_ref().map(|image| {
        let meta = image.metadata.as_ref();
        ImageSummary {
            format: image.format,
            width: image.width,
            height: image.height,
            channels: image.channels,
            frame_index: image.frame_index,
            frame_count: image.frame_count,
            duration_ms: image.duration_ms,
            animated: image.animated,
            rotation: image.rotation,
            content_hash: format!("{:016x}", image.content_hash),
            exif_bytes: meta.and_then(|m| m.exif.as_ref()).map(Vec::len),
            comment: meta.and_then(|m| m.comment.as_deref()),
            layout: image.layout,
            load_ms: image.load_duration.as_secs_f64() * 1000.0,
        }
    });
    DecodeSummary {
        path,
        out_of_memory: result.out_of_memory,
        exception: result.exception,
        image,
        steps: &result.steps,
    }
}

// ============================================================================
// Identify
// ============================================================================

pub fn format_scan_entries(entries: &[ScanEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let dims = entry
                .dimensions
                .map(|(w, h)| format!("{w}x{h}"))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{:<8} {:>11} {:>10}  {}",
                entry.format.name(),
                dims,
                human_size(entry.size),
                entry.path.display()
            )
        })
        .collect()
}

pub fn print_scan_entries(entries: &[ScanEntry]) {
    for line in format_scan_entries(entries) {
        println!("{}", line);
    }
    println!("{} files", entries.len());
}
