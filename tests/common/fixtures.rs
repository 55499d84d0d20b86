//! Test fixture creation for the music library and data directory

use super::constants::*;
use anyhow::Result;
use std::fs;
use tempfile::TempDir;

/// Bytes standing in for audio content. Tags cannot be read from them, so
/// artist and title come from the "Artist - Title" file names.
const FAKE_AUDIO_BYTES: &[u8] = b"ID3 not really audio";

/// Creates a temporary music library with one duplicated track, one unique
/// track and a stray cover image.
pub fn create_test_library() -> Result<TempDir> {
    let dir = TempDir::new()?;
    for folder in LIBRARY_FOLDERS {
        fs::create_dir_all(dir.path().join(folder))?;
    }
    // hidden folders never show up in the browser
    fs::create_dir_all(dir.path().join(".cache"))?;

    for track in [DUPLICATE_A, DUPLICATE_B, UNIQUE_TRACK] {
        fs::write(dir.path().join(track), FAKE_AUDIO_BYTES)?;
    }
    fs::write(dir.path().join(COVER_IMAGE), b"not an image")?;

    Ok(dir)
}

/// Creates an empty data directory.
pub fn create_test_data_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}
