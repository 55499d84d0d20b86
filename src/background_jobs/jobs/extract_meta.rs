//! Writes `.nfo` sidecars and extracts embedded cover art next to tracks.

use super::existing_target_dir;
use crate::background_jobs::{BackgroundJob, JobContext, JobError};
use crate::library::{embedded_cover, has_extension, read_track_metadata, TrackMetadata};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const SIDECAR_EXTENSIONS: &[&str] = &["mp3", "flac"];
const FOLDER_COVER: &str = "folder.jpg";

pub struct ExtractMetaJob;

pub fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Kodi-style `<musicvideo>` document for a track.
pub fn nfo_document(meta: &TrackMetadata) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<musicvideo>
  <title>{}</title>
  <artist>{}</artist>
  <album>{}</album>
  <plot></plot>
  <runtime>{}:{:02}</runtime>
</musicvideo>"#,
        xml_escape(&meta.title),
        xml_escape(&meta.artist),
        xml_escape(&meta.album),
        meta.duration / 60,
        meta.duration % 60
    )
}

/// Where the cover of `track` goes: `folder.jpg` unless the folder already has one.
fn cover_target(track: &Path) -> Option<PathBuf> {
    let parent = track.parent()?;
    let folder_cover = parent.join(FOLDER_COVER);
    if !folder_cover.exists() {
        return Some(folder_cover);
    }
    let stem = track.file_stem()?;
    Some(parent.join(format!("{}.jpg", stem.to_string_lossy())))
}

impl ExtractMetaJob {
    /// Returns whether a new `.nfo` was written.
    fn process(&self, ctx: &JobContext, path: &Path) -> anyhow::Result<bool> {
        let mut wrote_nfo = false;
        let nfo_path = path.with_extension("nfo");
        if !nfo_path.exists() {
            let meta = read_track_metadata(path);
            fs::write(&nfo_path, nfo_document(&meta))?;
            wrote_nfo = true;
        }

        if let Some(target) = cover_target(path).filter(|t| !t.exists()) {
            if let Some(cover) = embedded_cover(path) {
                fs::write(&target, cover)?;
                ctx.activity_log
                    .add(format!("Extracted cover art to {}", target.display()));
            }
        }
        Ok(wrote_nfo)
    }
}

impl BackgroundJob for ExtractMetaJob {
    fn id(&self) -> &'static str {
        crate::settings::TASK_EXTRACT_META
    }

    fn name(&self) -> &'static str {
        "Metadata Extraction"
    }

    fn description(&self) -> &'static str {
        "Write .nfo files and extract embedded cover art"
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let dir = existing_target_dir(ctx)?;
        let mut processed = 0;

        for entry in WalkDir::new(&dir).into_iter().filter_map(Result::ok) {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            let path = entry.path();
            if !entry.file_type().is_file() || !has_extension(path, SIDECAR_EXTENSIONS) {
                continue;
            }
            match self.process(ctx, path) {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to extract metadata of {:?}: {:#}", path, e),
            }
        }

        ctx.activity_log.add(format!(
            "Metadata extraction finished: {} files processed",
            processed
        ));
        Ok(())
    }
}
