//! Music library indexing: track model, tag access, directory scanning and
//! the persistent metadata store.

mod scanner;
mod schema;
mod store;
mod tags;
#[cfg(test)]
pub(crate) mod test_audio;

pub use scanner::{extension_of, has_extension, scan_audio_files, SCAN_EXTENSIONS};
pub use schema::METADATA_VERSIONED_SCHEMAS;
pub use store::{MetadataStore, SqliteMetadataStore};
pub use tags::{embedded_cover, read_duration, read_track_metadata, write_tags};

use serde::{Deserialize, Serialize};

/// Metadata of a single audio file as indexed by the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub path: String,
    pub filename: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub album_artist: String,
    /// Whole seconds.
    pub duration: u32,
    pub size_mb: f64,
    /// Kilobits per second.
    pub bitrate: u32,
    pub search_text: String,
}

impl TrackMetadata {
    pub fn build_search_text(artist: &str, title: &str, filename: &str) -> String {
        format!("{} {} {}", artist, title, filename).to_lowercase()
    }
}

/// Partial tag update. Only fields that are `Some` and non-empty are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagUpdate {
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
}

impl TagUpdate {
    pub fn is_empty(&self) -> bool {
        [&self.artist, &self.album_artist, &self.title, &self.album]
            .iter()
            .all(|v| v.as_deref().map(str::trim).unwrap_or("").is_empty())
    }
}
