use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];

/// Expands the selection into image files. Directories are walked
/// recursively; duplicates are dropped, first-seen order is kept.
pub fn collect_images<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for path in paths {
        let path = path.as_ref();
        if path.is_file() {
            if is_image_file(path) && seen.insert(path.to_path_buf()) {
                images.push(path.to_path_buf());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.is_file() && is_image_file(path) && seen.insert(path.to_path_buf()) {
                    images.push(path.to_path_buf());
                }
            }
        } else {
            warn!(path = %path.display(), "Skipping missing input");
        }
    }

    images
}

pub fn is_image_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}
