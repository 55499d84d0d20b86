use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extensions picked up by a library scan.
pub const SCAN_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "wma"];

/// Lowercased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    extension_of(path)
        .map(|ext| extensions.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Recursively walks `dir` yielding audio files. Unreadable entries are skipped.
pub fn scan_audio_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, SCAN_EXTENSIONS))
}
