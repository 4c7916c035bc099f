//! Media catalog: the fixed, ordered list of items shown during one run.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::Configuration;
use crate::error::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub path: PathBuf,
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self::new(path, MediaKind::Image)
    }

    pub fn video(path: impl Into<PathBuf>) -> Self {
        Self::new(path, MediaKind::Video)
    }
}

/// Non-empty, immutable sequence of media items.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<MediaItem>,
}

impl Catalog {
    /// # Errors
    /// Returns [`CatalogError::Empty`] when `items` is empty.
    pub fn new(items: Vec<MediaItem>) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Item at `index`, wrapping so the lookup never goes out of range.
    pub fn get(&self, index: usize) -> &MediaItem {
        &self.items[index % self.items.len()]
    }

    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.items.len()
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }
}

/// Extension-based classifier (lowercase, without dot).
#[derive(Debug, Clone)]
pub struct MediaFilter {
    image_exts: Vec<String>,
    video_exts: Vec<String>,
}

impl MediaFilter {
    pub fn new(image_exts: Vec<String>, video_exts: Vec<String>) -> Self {
        Self {
            image_exts,
            video_exts,
        }
    }

    pub fn from_config(cfg: &Configuration) -> Self {
        Self::new(cfg.image_extensions.clone(), cfg.video_extensions.clone())
    }

    #[must_use]
    pub fn classify(&self, path: &Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if self.image_exts.iter().any(|e| *e == ext) {
            Some(MediaKind::Image)
        } else if self.video_exts.iter().any(|e| *e == ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::from_config(&Configuration::default())
    }
}

/// List the files directly inside `dir`, sorted by file name, keeping only
/// supported media.
///
/// # Errors
/// [`CatalogError::BadDir`] if `dir` is not a directory, [`CatalogError::Empty`]
/// if nothing qualifies.
pub fn scan_media_dir(dir: &Path, filter: &MediaFilter) -> Result<Catalog, CatalogError> {
    if !dir.is_dir() {
        return Err(CatalogError::BadDir(dir.to_path_buf()));
    }

    let mut items = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| CatalogError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if let Some(kind) = filter.classify(&path) {
            items.push(MediaItem::new(path, kind));
        }
    }

    Catalog::new(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_case_insensitive() {
        let filter = MediaFilter::default();
        assert_eq!(filter.classify(Path::new("a/B.PNG")), Some(MediaKind::Image));
        assert_eq!(filter.classify(Path::new("clip.Mp4")), Some(MediaKind::Video));
        assert_eq!(filter.classify(Path::new("notes.txt")), None);
        assert_eq!(filter.classify(Path::new("no_extension")), None);
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(matches!(Catalog::new(Vec::new()), Err(CatalogError::Empty)));
    }

    #[test]
    fn next_index_wraps() {
        let catalog = Catalog::new(vec![
            MediaItem::image("a.png"),
            MediaItem::video("b.mp4"),
            MediaItem::image("c.png"),
        ])
        .unwrap();
        assert_eq!(catalog.next_index(0), 1);
        assert_eq!(catalog.next_index(2), 0);
        assert_eq!(catalog.get(4).path, PathBuf::from("b.mp4"));
    }
}
