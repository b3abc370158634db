//! Photo discovery: turns image files into indexing candidates.
//!
//! A photo's identity is the SHA-256 of its bytes, so moving or renaming a
//! file keeps its id while its location changes.

use std::path::Path;

use photosim_core::{Error, Result};
use photosim_index::PhotoRef;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Whether the path has a supported image extension.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Stable identity of the photo at `path`.
pub fn photo_id(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Describe a single file as a candidate.
pub fn photo_ref(path: &Path) -> Result<PhotoRef> {
    let location = path
        .to_str()
        .ok_or_else(|| Error::InvalidInput(format!("non UTF-8 path: {}", path.display())))?;
    Ok(PhotoRef::new(photo_id(path)?, location))
}

/// Every image under `dir`, sorted by path. Unreadable files are skipped.
pub fn scan_directory(dir: &Path) -> Result<Vec<PhotoRef>> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("not a directory: {}", dir.display())));
    }

    let mut photos = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        match photo_ref(entry.path()) {
            Ok(photo) => photos.push(photo),
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }
    debug!("Found {} photos under {}", photos.len(), dir.display());
    Ok(photos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_finds_images_only() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"aaa").unwrap();
        std::fs::write(dir.path().join("nested/b.PNG"), b"bbb").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ccc").unwrap();

        let photos = scan_directory(dir.path()).unwrap();
        assert_eq!(photos.len(), 2);
        assert!(photos[0].location.ends_with("a.jpg"));
        assert!(photos[1].location.ends_with("b.PNG"));
    }

    #[test]
    fn test_id_follows_content_not_path() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("renamed.jpg");
        let c = dir.path().join("c.jpg");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        std::fs::write(&c, b"other bytes").unwrap();

        assert_eq!(photo_id(&a).unwrap(), photo_id(&b).unwrap());
        assert_ne!(photo_id(&a).unwrap(), photo_id(&c).unwrap());
        assert_eq!(photo_id(&a).unwrap().len(), 64);
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            scan_directory(&dir.path().join("nope")),
            Err(Error::NotFound(_))
        ));
    }
}
