// SPDX-License-Identifier: MIT OR Apache-2.0

//! Photo library access: the source trait and a directory scanner using the
//! ignore crate (same as ripgrep).

use ignore::WalkBuilder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::embedding::{AssetId, PixelBuffer};
use crate::errors::SourceError;

/// Image extensions picked up by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff",
];

/// Assets enumerated by a [`PhotoSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetListing {
    /// Visible assets, newest first
    pub assets: Vec<AssetId>,
    /// Entries that could not be read; the listing may miss assets
    pub errors: usize,
}

impl AssetListing {
    /// A listing that reflects the whole library.
    pub fn complete(assets: Vec<AssetId>) -> Self {
        Self { assets, errors: 0 }
    }

    /// A listing that may be missing assets behind `errors` unreadable entries.
    pub fn partial(assets: Vec<AssetId>, errors: usize) -> Self {
        Self { assets, errors }
    }

    pub fn is_complete(&self) -> bool {
        self.errors == 0
    }
}

impl From<Vec<AssetId>> for AssetListing {
    fn from(assets: Vec<AssetId>) -> Self {
        Self::complete(assets)
    }
}

/// Trait for photo libraries.
pub trait PhotoSource: Send + Sync {
    /// Enumerates every visible asset, newest first.
    fn list_assets(&self) -> Result<AssetListing, SourceError>;

    /// Returns square RGB pixels of `target_size`, or `None` if the asset is
    /// gone, unreadable or cannot be decoded.
    fn fetch_pixels(&self, asset_id: &str, target_size: u32) -> Option<PixelBuffer>;
}

/// Photo library backed by a directory tree. Respects .gitignore.
pub struct DirectoryPhotoSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryPhotoSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Replaces the accepted file extensions (case-insensitive).
    pub fn with_extensions(mut self, extensions: &[String]) -> Self {
        if !extensions.is_empty() {
            self.extensions = extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect();
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn asset_id_for(&self, path: &Path) -> Option<AssetId> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }

    fn path_for(&self, asset_id: &str) -> Option<PathBuf> {
        if asset_id.split('/').any(|part| part == ".." || part.is_empty()) {
            return None;
        }
        Some(self.root.join(asset_id))
    }
}

impl PhotoSource for DirectoryPhotoSource {
    fn list_assets(&self) -> Result<AssetListing, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::NotFound(self.root.display().to_string()));
        }

        let (tx, rx) = mpsc::channel();

        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .build_parallel();

        let extensions = self.extensions.clone();

        walker.run(|| {
            let tx = tx.clone();
            let extensions = extensions.clone();

            Box::new(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        let _ = tx.send(Err(err.to_string()));
                        return ignore::WalkState::Continue;
                    }
                };
                let path = entry.path();
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    return ignore::WalkState::Continue;
                }
                let matches = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| extensions.contains(&ext.to_lowercase()));
                if matches {
                    let mtime = entry
                        .metadata()
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    let _ = tx.send(Ok((path.to_path_buf(), mtime)));
                }
                ignore::WalkState::Continue
            })
        });

        drop(tx);

        let mut files = Vec::new();
        let mut errors = 0;
        for item in rx {
            match item {
                Ok(file) => files.push(file),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    errors += 1;
                }
            }
        }

        let mut assets: Vec<(AssetId, SystemTime)> = files
            .into_iter()
            .filter_map(|(path, mtime)| self.asset_id_for(&path).map(|id| (id, mtime)))
            .collect();

        // Newest first; the parallel walk has no stable order of its own.
        assets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let assets = assets.into_iter().map(|(id, _)| id).collect();
        Ok(AssetListing::partial(assets, errors))
    }

    fn fetch_pixels(&self, asset_id: &str, target_size: u32) -> Option<PixelBuffer> {
        let path = self.path_for(asset_id)?;
        match image::open(&path) {
            Ok(image) => Some(square_rgb(&image, target_size)),
            Err(err) => {
                debug!(asset = asset_id, error = %err, "failed to decode photo");
                None
            }
        }
    }
}

/// Scales the shortest edge to `size` and centre-crops to a `size` square.
pub fn square_rgb(image: &DynamicImage, size: u32) -> PixelBuffer {
    let size = size.max(1);
    let (w, h) = (image.width().max(1), image.height().max(1));

    let scale = size as f32 / w.min(h) as f32;
    let new_w = ((w as f32) * scale).round().max(size as f32) as u32;
    let new_h = ((h as f32) * scale).round().max(size as f32) as u32;
    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle);

    let start_x = (new_w - size) / 2;
    let start_y = (new_h - size) / 2;
    let cropped = resized.crop_imm(start_x, start_y, size, size).to_rgb8();

    PixelBuffer::new(size, size, cropped.into_raw())
}
