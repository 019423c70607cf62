//! Batch identification for the `identify` command.
//!
//! Walks every path given (files as-is, directories recursively, hidden
//! entries skipped), then sniffs each file in parallel. Nothing is decoded:
//! dimensions come from the image header where the `image` crate can read
//! one cheaply.

use crate::config::DecodeConfig;
use crate::dispatch::attempts;
use crate::format::{self, FormatTag};
use crate::imaging::Source;
use image::ImageReader;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("No such file or directory: {0}")]
    NotFound(PathBuf),
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanEntry {
    pub path: PathBuf,
    pub format: FormatTag,
    /// File size in bytes.
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
    /// Decode chain a load of this file would run.
    pub sources: Vec<Source>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Expand `roots` into a sorted list of files.
pub fn collect_files(roots: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for root in roots {
        if root.is_file() {
            files.push(root.clone());
        } else if root.is_dir() {
            let walker = WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !is_hidden(e));
            for entry in walker {
                let entry = entry?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            return Err(ScanError::NotFound(root.clone()));
        }
    }
    Ok(files)
}

fn header_dimensions(path: &Path) -> Option<(u32, u32)> {
    ImageReader::open(path)
        .ok()?
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Identify one file.
pub fn describe(path: &Path, decode: &DecodeConfig) -> Result<ScanEntry, ScanError> {
    let size = fs::metadata(path)?.len();
    let format = format::identify(path);
    Ok(ScanEntry {
        path: path.to_path_buf(),
        format,
        size,
        dimensions: header_dimensions(path),
        sources: attempts(format, decode).iter().map(|s| s.source).collect(),
    })
}

/// Identify every file under `roots`, in path order.
pub fn scan(roots: &[PathBuf], decode: &DecodeConfig) -> Result<Vec<ScanEntry>, ScanError> {
    let files = collect_files(roots)?;
    files.par_iter().map(|path| describe(path, decode)).collect()
}
