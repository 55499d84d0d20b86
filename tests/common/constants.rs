//! Shared constants for end-to-end tests
//!
//! When the fixture library changes, update only this file.

// ============================================================================
// Fixture Library
// ============================================================================

/// Copy of the duplicated track in the "Greatest Hits" folder
pub const DUPLICATE_A: &str = "Greatest Hits/Queen - Bohemian Rhapsody.mp3";

/// Copy of the duplicated track in the "Live" folder
pub const DUPLICATE_B: &str = "Live/Queen - Bohemian Rhapsody.mp3";

/// A track without duplicates
pub const UNIQUE_TRACK: &str = "ABBA - Waterloo.mp3";

/// Non-audio file that scans must ignore
pub const COVER_IMAGE: &str = "Greatest Hits/folder.jpg";

/// Number of audio files in the fixture library
pub const AUDIO_FILE_COUNT: usize = 3;

/// Subfolders of the library root, in browse order
pub const LIBRARY_FOLDERS: &[&str] = &["Greatest Hits", "Live"];

// ============================================================================
// Timeouts
// ============================================================================

pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long to wait for the server to answer its health check
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// How long to wait for a scan or a job to finish
pub const BACKGROUND_WORK_TIMEOUT_MS: u64 = 10_000;
