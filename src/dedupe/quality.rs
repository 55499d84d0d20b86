use crate::library::{extension_of, has_extension};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions considered by the quality-based deduplication.
pub const QUALITY_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "wma"];

/// Format tier and size in bytes; higher compares better.
pub fn quality_score(path: &Path) -> (u8, u64) {
    let tier = match extension_of(path).as_deref() {
        Some("flac") | Some("wav") => 3,
        Some("m4a") | Some("aac") => 2,
        Some("mp3") => 1,
        _ => 0,
    };
    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    (tier, size)
}

/// Copies of the same track sitting next to each other in different formats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityGroup {
    pub keep: PathBuf,
    pub remove: Vec<PathBuf>,
}

/// Finds files in the same directory sharing a stem and picks the best copy of each.
pub fn plan_quality_dedupe(dir: &Path) -> Vec<QualityGroup> {
    let mut by_key: BTreeMap<(PathBuf, String), Vec<PathBuf>> = BTreeMap::new();

    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() || !has_extension(entry.path(), QUALITY_EXTENSIONS) {
            continue;
        }
        let path = entry.into_path();
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        by_key.entry((parent, stem)).or_default().push(path);
    }

    by_key
        .into_values()
        .filter(|paths| paths.len() > 1)
        .map(|mut paths| {
            paths.sort();
            let mut best_index = 0;
            let mut best_score = quality_score(&paths[0]);
            for (index, path) in paths.iter().enumerate().skip(1) {
                let score = quality_score(path);
                if score > best_score {
                    best_score = score;
                    best_index = index;
                }
            }
            let keep = paths.remove(best_index);
            QualityGroup { keep, remove: paths }
        })
        .collect()
}
