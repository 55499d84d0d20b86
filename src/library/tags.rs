use super::scanner::has_extension;
use super::{TagUpdate, TrackMetadata};
use anyhow::{Context, Result};
use lofty::config::WriteOptions;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Formats whose tags and audio properties are read and written.
const TAGGED_EXTENSIONS: &[&str] = &["mp3", "flac"];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Default)]
struct RawTags {
    artist: String,
    title: String,
    album: String,
    album_artist: String,
    duration: u32,
    bitrate: u32,
}

fn joined_values(tag: &Tag, key: &ItemKey) -> String {
    tag.get_strings(*key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

fn read_raw_tags(path: &Path) -> Result<RawTags> {
    let tagged_file = Probe::open(path)?.read()?;
    let properties = tagged_file.properties();
    let mut raw = RawTags {
        duration: properties.duration().as_secs() as u32,
        bitrate: properties.audio_bitrate().unwrap_or(0),
        ..Default::default()
    };

    let tag = match tagged_file.primary_tag() {
        Some(tag) => Some(tag),
        None => tagged_file.first_tag(),
    };
    if let Some(tag) = tag {
        raw.artist = joined_values(tag, &ItemKey::TrackArtist);
        raw.title = joined_values(tag, &ItemKey::TrackTitle);
        raw.album = joined_values(tag, &ItemKey::AlbumTitle);
        raw.album_artist = joined_values(tag, &ItemKey::AlbumArtist);
    }
    Ok(raw)
}

fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Reads the metadata of an audio file. Never fails: unreadable tags leave the
/// fields empty and the title is derived from the file name.
pub fn read_track_metadata(path: &Path) -> TrackMetadata {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let size_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    let raw = if has_extension(path, TAGGED_EXTENSIONS) {
        read_raw_tags(path).unwrap_or_else(|err| {
            debug!("Could not read tags of {:?}: {}", path, err);
            RawTags::default()
        })
    } else {
        RawTags::default()
    };

    let mut artist = raw.artist.trim().to_string();
    let mut title = raw.title.trim().to_string();
    if title.is_empty() {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match stem.split_once(" - ") {
            Some((left, right)) => {
                if artist.is_empty() {
                    artist = left.trim().to_string();
                }
                title = right.trim().to_string();
            }
            None => title = stem.trim().to_string(),
        }
    }

    let search_text = TrackMetadata::build_search_text(&artist, &title, &filename);
    TrackMetadata {
        path: path.to_string_lossy().to_string(),
        filename,
        artist,
        title,
        album: raw.album.trim().to_string(),
        album_artist: raw.album_artist.trim().to_string(),
        duration: raw.duration,
        size_mb: round_2(size_bytes as f64 / BYTES_PER_MB),
        bitrate: raw.bitrate,
        search_text,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Writes the provided fields of `update` into the file tags.
/// Returns `Ok(false)` when the format is not writable or nothing was provided.
pub fn write_tags(path: &Path, update: &TagUpdate) -> Result<bool> {
    if !has_extension(path, TAGGED_EXTENSIONS) || update.is_empty() {
        return Ok(false);
    }

    let mut tagged_file = Probe::open(path)
        .and_then(|probe| probe.read())
        .with_context(|| format!("Failed to read tags of {:?}", path))?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .primary_tag_mut()
        .with_context(|| format!("No writable tag in {:?}", path))?;

    if let Some(artist) = non_empty(&update.artist) {
        tag.set_artist(artist);
    }
    if let Some(title) = non_empty(&update.title) {
        tag.set_title(title);
    }
    if let Some(album) = non_empty(&update.album) {
        tag.set_album(album);
    }
    if let Some(album_artist) = non_empty(&update.album_artist) {
        tag.insert_text(ItemKey::AlbumArtist, album_artist);
    }

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .with_context(|| format!("Failed to save tags of {:?}", path))?;
    Ok(true)
}

/// First embedded picture of an mp3/flac file.
pub fn embedded_cover(path: &Path) -> Option<Vec<u8>> {
    if !has_extension(path, TAGGED_EXTENSIONS) {
        return None;
    }
    let tagged_file = Probe::open(path).ok()?.read().ok()?;
    tagged_file
        .tags()
        .iter()
        .find_map(|tag| tag.pictures().first())
        .map(|picture| picture.data().to_vec())
}

/// Duration in seconds, if the file can be parsed.
pub fn read_duration(path: &Path) -> Option<f64> {
    let tagged_file = Probe::open(path).ok()?.read().ok()?;
    Some(tagged_file.properties().duration().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn falls_back_to_filename_when_tags_are_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Daft Punk - One More Time.mp3");
        fs::write(&path, vec![0u8; 2048]).unwrap();

        let meta = read_track_metadata(&path);
        assert_eq!(meta.artist, "Daft Punk");
        assert_eq!(meta.title, "One More Time");
        assert_eq!(meta.album, "");
        assert_eq!(meta.duration, 0);
        assert_eq!(meta.filename, "Daft Punk - One More Time.mp3");
        assert_eq!(
            meta.search_text,
            "daft punk one more time daft punk - one more time.mp3"
        );
    }

    #[test]
    fn stem_without_separator_becomes_title() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Intro.m4a");
        fs::write(&path, b"not audio").unwrap();

        let meta = read_track_metadata(&path);
        assert_eq!(meta.artist, "");
        assert_eq!(meta.title, "Intro");
        assert_eq!(meta.bitrate, 0);
    }

    #[test]
    fn size_is_rounded_megabytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.wma");
        fs::write(&path, vec![0u8; 1536 * 1024]).unwrap();

        let meta = read_track_metadata(&path);
        assert_eq!(meta.size_mb, 1.5);
    }

    #[test]
    fn missing_file_has_zero_size() {
        let meta = read_track_metadata(Path::new("/definitely/not/here.mp3"));
        assert_eq!(meta.size_mb, 0.0);
        assert_eq!(meta.title, "here");
    }

    #[test]
    fn write_tags_skips_unsupported_formats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.m4a");
        fs::write(&path, b"x").unwrap();
        let update = TagUpdate {
            artist: Some("Someone".to_string()),
            ..Default::default()
        };
        assert!(!write_tags(&path, &update).unwrap());
    }

    #[test]
    fn write_tags_with_empty_update_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.mp3");
        fs::write(&path, b"x").unwrap();
        let update = TagUpdate {
            artist: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!write_tags(&path, &update).unwrap());
    }

    #[test]
    fn write_tags_reports_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.flac");
        fs::write(&path, b"garbage").unwrap();
        let update = TagUpdate {
            title: Some("New".to_string()),
            ..Default::default()
        };
        assert!(write_tags(&path, &update).is_err());
        assert!(embedded_cover(&path).is_none());
        assert!(read_duration(&path).is_none());
    }

    #[test]
    fn written_tags_are_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Wrong Artist - Wrong Title.flac");
        crate::library::test_audio::write_flac(&path, 185);

        let update = TagUpdate {
            artist: Some(" Nina Simone ".to_string()),
            title: Some("Sinnerman".to_string()),
            album: Some("Pastel Blues".to_string()),
            album_artist: Some("Nina Simone".to_string()),
        };
        assert!(write_tags(&path, &update).unwrap());

        let meta = read_track_metadata(&path);
        assert_eq!(meta.artist, "Nina Simone");
        assert_eq!(meta.title, "Sinnerman");
        assert_eq!(meta.album, "Pastel Blues");
        assert_eq!(meta.album_artist, "Nina Simone");
        assert_eq!(meta.duration, 185);

        // a partial update keeps the other fields
        let update = TagUpdate {
            album: Some("Live".to_string()),
            ..Default::default()
        };
        assert!(write_tags(&path, &update).unwrap());
        let meta = read_track_metadata(&path);
        assert_eq!(meta.title, "Sinnerman");
        assert_eq!(meta.album, "Live");
    }

    #[test]
    fn embedded_cover_and_duration_of_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("track.flac");
        crate::library::test_audio::write_flac(&path, 42);
        assert!(embedded_cover(&path).is_none());
        assert_eq!(read_duration(&path).map(|d| d.round()), Some(42.0));

        let cover = vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3, 4];
        crate::library::test_audio::embed_cover(&path, &cover);
        assert_eq!(embedded_cover(&path), Some(cover));
    }
}
