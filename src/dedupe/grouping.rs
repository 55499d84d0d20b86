use super::fuzzy::token_set_ratio;
use crate::library::TrackMetadata;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_FUZZY_THRESHOLD: u8 = 80;

/// How candidate groups are built from the scanned tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingStrategy {
    /// Adjacent items in `search_text` order compared with a token-set ratio.
    #[default]
    Fuzzy,
    /// Exact match on normalised artist and title.
    Normalized,
}

/// Groups tracks whose `search_text` is similar to the first member of the
/// running group. Only groups with more than one member are returned.
/// `progress` is called with `(processed, total)` after each item.
pub fn group_candidates<F>(
    mut tracks: Vec<TrackMetadata>,
    threshold: u8,
    mut progress: F,
) -> Vec<Vec<TrackMetadata>>
where
    F: FnMut(usize, usize),
{
    let total = tracks.len();
    tracks.sort_by(|a, b| a.search_text.cmp(&b.search_text));

    let mut groups = Vec::new();
    let mut current: Vec<TrackMetadata> = Vec::new();

    for (index, track) in tracks.into_iter().enumerate() {
        match current.first() {
            Some(first) if token_set_ratio(&first.search_text, &track.search_text) > threshold => {
                current.push(track);
            }
            Some(_) => {
                let closed = std::mem::replace(&mut current, vec![track]);
                if closed.len() > 1 {
                    groups.push(closed);
                }
            }
            None => current.push(track),
        }
        progress(index + 1, total);
    }

    if current.len() > 1 {
        groups.push(current);
    }
    groups
}

lazy_static! {
    static ref BRACKETED: Regex =
        Regex::new(r"[\(\[].*?[\)\]]").expect("Invalid bracket pattern");
}

/// Lowercase text with bracketed parts, punctuation and spaces removed.
/// Word characters (underscore included) are kept.
pub fn normalize_text(text: &str) -> String {
    BRACKETED
        .replace_all(text, "")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || (c.is_whitespace() && *c != ' '))
        .collect::<String>()
        .to_lowercase()
}

fn normalized_key(track: &TrackMetadata) -> String {
    let mut pair = [normalize_text(&track.artist), normalize_text(&track.title)];
    pair.sort();
    let key = pair.concat();
    if key.chars().count() >= 3 {
        return key;
    }
    normalize_text(&track.filename)
}

/// Groups tracks sharing the same normalised artist/title pair, in first-seen order.
pub fn group_normalized<F>(tracks: Vec<TrackMetadata>, mut progress: F) -> Vec<Vec<TrackMetadata>>
where
    F: FnMut(usize, usize),
{
    let total = tracks.len();
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, Vec<TrackMetadata>> = HashMap::new();

    for (index, track) in tracks.into_iter().enumerate() {
        let key = normalized_key(&track);
        let group = by_key.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        group.push(track);
        progress(index + 1, total);
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .filter(|group| group.len() > 1)
        .collect()
}

pub fn group_tracks<F>(
    tracks: Vec<TrackMetadata>,
    strategy: GroupingStrategy,
    threshold: u8,
    progress: F,
) -> Vec<Vec<TrackMetadata>>
where
    F: FnMut(usize, usize),
{
    match strategy {
        GroupingStrategy::Fuzzy => group_candidates(tracks, threshold, progress),
        GroupingStrategy::Normalized => group_normalized(tracks, progress),
    }
}
