//! Prompt construction and answer parsing for the library's AI features.

use super::types::LlmError;
use crate::library::TrackMetadata;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct FileSummary<'a> {
    filename: &'a str,
    artist: &'a str,
    title: &'a str,
    album: &'a str,
    album_artist: &'a str,
    duration: u32,
    size_mb: f64,
    bitrate: u32,
}

impl<'a> From<&'a TrackMetadata> for FileSummary<'a> {
    fn from(track: &'a TrackMetadata) -> Self {
        Self {
            filename: &track.filename,
            artist: &track.artist,
            title: &track.title,
            album: &track.album,
            album_artist: &track.album_artist,
            duration: track.duration,
            size_mb: track.size_mb,
            bitrate: track.bitrate,
        }
    }
}

#[derive(Debug, Serialize)]
struct GroupSummary<'a> {
    group_id: usize,
    files: Vec<FileSummary<'a>>,
}

/// Builds the duplicate-verification prompt for `(group_id, files)` pairs.
pub fn duplicate_check_prompt(groups: &[(usize, &[TrackMetadata])]) -> String {
    let input: Vec<GroupSummary> = groups
        .iter()
        .map(|(group_id, files)| GroupSummary {
            group_id: *group_id,
            files: files.iter().map(FileSummary::from).collect(),
        })
        .collect();
    let input_json = serde_json::to_string(&input).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Identify duplicates in these music file groups.\n\
         Rules:\n\
         1. Different extensions of same song -> DUPLICATE\n\
         2. \"Live\", \"Remix\" versions -> DUPLICATE\n\
         3. Completely different songs -> NOT DUPLICATE\n\
         For duplicates, set \"best_file\" to the 0-based index of the file worth keeping \
         (prefer lossless formats, then higher bitrate, then larger size).\n\
         Input: {}\n\
         Return ONLY JSON: {{\"results\": [{{\"group_id\": int, \"is_duplicate\": bool, \"reason\": \"string\", \"best_file\": int}}]}}",
        input_json
    )
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DuplicateVerdict {
    pub group_id: i64,
    pub is_duplicate: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub best_file: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DuplicateVerdicts {
    #[serde(default)]
    results: Vec<DuplicateVerdict>,
}

pub fn metadata_fix_prompt(track: &TrackMetadata) -> String {
    format!(
        "Fix the metadata of this music file using the filename and the current tags.\n\
         Filename: {}\n\
         Current Artist: {}\n\
         Current Title: {}\n\
         Current Album: {}\n\
         Return ONLY JSON: {{\"artist\": \"string\", \"title\": \"string\", \"album\": \"string or null\", \"album_artist\": \"string or null\"}}",
        track.filename, track.artist, track.title, track.album
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSuggestion {
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub album_artist: Option<String>,
}

/// Removes a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

pub fn parse_duplicate_verdicts(text: &str) -> Result<Vec<DuplicateVerdict>, LlmError> {
    serde_json::from_str::<DuplicateVerdicts>(strip_code_fences(text))
        .map(|v| v.results)
        .map_err(|e| LlmError::InvalidResponse(format!("Unexpected duplicate answer: {}", e)))
}

pub fn parse_metadata_suggestion(text: &str) -> Result<MetadataSuggestion, LlmError> {
    serde_json::from_str(strip_code_fences(text))
        .map_err(|e| LlmError::InvalidResponse(format!("Unexpected metadata answer: {}", e)))
}
