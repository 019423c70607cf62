//! In-process decoder cache.
//!
//! Animated files are decoded frame by frame: the viewer asks for frame 0,
//! then frame 1, and so on. Re-reading and re-parsing the file for every
//! frame is wasteful, so the last opened multi-frame decoder of each
//! [`Family`] is kept alive, keyed by filename.
//!
//! ## Rules
//!
//! - At most one entry per family.
//! - A hit requires the exact same filename; a different file evicts the
//!   entry first ([`DecoderCache::checkout`]).
//! - Loading a file of another family evicts every family except that one
//!   ([`DecoderCache::retain_only`]). Only the family of the file being
//!   loaded may hold a live decoder.
//! - A release request drops every entry caching that exact file.
//!
//! The cache lives on the loader's worker thread and is never shared, so it
//! has no internal locking.

use crate::imaging::OpenDecoder;
use log::debug;
use std::path::{Path, PathBuf};

const FAMILY_COUNT: usize = 5;

/// A group of codecs sharing one cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Webp,
    Png,
    Jxl,
    Avif,
    /// The generic platform decoder (GIF animations, TIFF pages, unknown files).
    Native,
}

impl Family {
    pub const ALL: [Family; FAMILY_COUNT] = [
        Family::Webp,
        Family::Png,
        Family::Jxl,
        Family::Avif,
        Family::Native,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

struct CacheEntry {
    filename: PathBuf,
    open: OpenDecoder,
}

/// One optional open decoder per [`Family`].
pub struct DecoderCache {
    slots: [Option<CacheEntry>; FAMILY_COUNT],
}

impl Default for DecoderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderCache {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// The cached decoder for `family`, if it was opened for `filename`.
    pub fn get(&mut self, family: Family, filename: &Path) -> Option<&mut OpenDecoder> {
        self.slots[family.slot()]
            .as_mut()
            .filter(|entry| entry.filename == filename)
            .map(|entry| &mut entry.open)
    }

    /// Take the cached decoder out of its slot for use.
    ///
    /// On a filename mismatch the stale entry is evicted and `None` is
    /// returned. A decoder taken out is gone from the cache until it is
    /// [`put`](Self::put) back, so a failed decode leaves nothing dangling.
    pub fn checkout(&mut self, family: Family, filename: &Path) -> Option<OpenDecoder> {
        let slot = &mut self.slots[family.slot()];
        match slot.take() {
            Some(entry) if entry.filename == filename => {
                debug!("decoder cache hit: {family:?} {}", filename.display());
                Some(entry.open)
            }
            Some(entry) => {
                debug!(
                    "decoder cache evict: {family:?} {} (requested {})",
                    entry.filename.display(),
                    filename.display()
                );
                None
            }
            None => None,
        }
    }

    /// Store `open` as the live decoder of `family`, replacing any previous one.
    pub fn put(&mut self, family: Family, filename: &Path, open: OpenDecoder) {
        debug!("decoder cache store: {family:?} {}", filename.display());
        self.slots[family.slot()] = Some(CacheEntry {
            filename: filename.to_path_buf(),
            open,
        });
    }

    pub fn invalidate(&mut self, family: Family) {
        if let Some(entry) = self.slots[family.slot()].take() {
            debug!(
                "decoder cache drop: {family:?} {}",
                entry.filename.display()
            );
        }
    }

    pub fn invalidate_all(&mut self) {
        for family in Family::ALL {
            self.invalidate(family);
        }
    }

    /// Drop every family except `keep`. `None` drops everything.
    pub fn retain_only(&mut self, keep: Option<Family>) {
        for family in Family::ALL {
            if Some(family) != keep {
                self.invalidate(family);
            }
        }
    }

    /// Drop every entry caching exactly `filename`. Returns whether any matched.
    pub fn release(&mut self, filename: &Path) -> bool {
        let mut released = false;
        for family in Family::ALL {
            if self.cached_file(family) == Some(filename) {
                self.invalidate(family);
                released = true;
            }
        }
        released
    }

    /// The filename currently cached for `family`.
    pub fn cached_file(&self, family: Family) -> Option<&Path> {
        self.slots[family.slot()]
            .as_ref()
            .map(|entry| entry.filename.as_path())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
