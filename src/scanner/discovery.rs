use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ScannerConfig;
use crate::db::MediaKind;

/// Kind of a file judged by its extension, or `None` if it is not media.
pub fn media_kind(path: &Path, config: &ScannerConfig) -> Option<MediaKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    let matches = |extensions: &[String]| extensions.iter().any(|e| e.to_lowercase() == ext);

    if matches(&config.image_extensions) {
        Some(MediaKind::Image)
    } else if matches(&config.video_extensions) {
        Some(MediaKind::Video)
    } else if matches(&config.audio_extensions) {
        Some(MediaKind::Audio)
    } else {
        None
    }
}

pub fn discover_media(directory: &Path, config: &ScannerConfig) -> Result<Vec<(PathBuf, MediaKind)>> {
    if !directory.is_dir() {
        anyhow::bail!("Not a directory: {}", directory.display());
    }

    let mut media = Vec::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if path.is_file() {
            if let Some(kind) = media_kind(path, config) {
                media.push((path.to_path_buf(), kind));
            }
        }
    }

    // Sort by path for consistent ordering
    media.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(media)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_discover_media() {
        let dir = tempdir().unwrap();

        // Create some test files
        File::create(dir.path().join("photo1.jpg")).unwrap();
        File::create(dir.path().join("photo2.PNG")).unwrap();
        File::create(dir.path().join("clip.mp4")).unwrap();
        File::create(dir.path().join("song.mp3")).unwrap();
        File::create(dir.path().join("document.txt")).unwrap();

        // Create subdirectory with more images
        fs::create_dir(dir.path().join("subdir")).unwrap();
        File::create(dir.path().join("subdir/photo3.jpeg")).unwrap();

        let media = discover_media(dir.path(), &ScannerConfig::default()).unwrap();
        let kinds: Vec<MediaKind> = media.iter().map(|(_, kind)| *kind).collect();

        assert_eq!(media.len(), 5);
        assert_eq!(kinds.iter().filter(|k| **k == MediaKind::Image).count(), 3);
        assert!(kinds.contains(&MediaKind::Video));
        assert!(kinds.contains(&MediaKind::Audio));
    }

    #[test]
    fn test_media_kind() {
        let config = ScannerConfig::default();
        assert_eq!(media_kind(Path::new("a/b.webp"), &config), Some(MediaKind::Image));
        assert_eq!(media_kind(Path::new("a/b.MOV"), &config), Some(MediaKind::Video));
        assert_eq!(media_kind(Path::new("a/b.ogg"), &config), Some(MediaKind::Audio));
        assert_eq!(media_kind(Path::new("a/README"), &config), None);
    }

    #[test]
    fn test_discover_rejects_missing_directory() {
        let dir = tempdir().unwrap();
        assert!(discover_media(&dir.path().join("missing"), &ScannerConfig::default()).is_err());
    }
}
