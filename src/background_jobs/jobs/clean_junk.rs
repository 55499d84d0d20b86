//! Removes leftover sidecar files and empty folders once the music is gone.

use super::existing_target_dir;
use crate::background_jobs::{BackgroundJob, JobContext, JobError};
use crate::library::has_extension;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "wma", "ape", "ogg"];
const JUNK_EXTENSIONS: &[&str] = &["nfo", "jpg", "jpeg", "png", "lrc", "txt"];

pub struct CleanJunkJob;

/// Deletes junk files of `dir` if it holds no music. Returns the number removed.
fn clean_directory(ctx: &JobContext, dir: &Path) -> usize {
    let files: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            warn!("Failed to list {:?}: {}", dir, e);
            return 0;
        }
    };

    if files.iter().any(|f| has_extension(f, MUSIC_EXTENSIONS)) {
        return 0;
    }

    let mut removed = 0;
    for file in files.iter().filter(|f| has_extension(f, JUNK_EXTENSIONS)) {
        match fs::remove_file(file) {
            Ok(()) => {
                ctx.activity_log
                    .add(format!("Removed orphaned file {}", file.display()));
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {:?}: {}", file, e),
        }
    }
    removed
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

impl BackgroundJob for CleanJunkJob {
    fn id(&self) -> &'static str {
        crate::settings::TASK_CLEAN_JUNK
    }

    fn name(&self) -> &'static str {
        "Junk Cleanup"
    }

    fn description(&self) -> &'static str {
        "Remove sidecar files left without music and empty folders"
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let root = existing_target_dir(ctx)?;
        let mut cleaned = 0;

        // Children before parents, so emptied folders can cascade upwards.
        for entry in WalkDir::new(&root)
            .contents_first(true)
            .into_iter()
            .filter_map(Result::ok)
        {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            if !entry.file_type().is_dir() {
                continue;
            }
            let dir = entry.path();
            cleaned += clean_directory(ctx, dir);

            if dir != root && is_empty_dir(dir) {
                match fs::remove_dir(dir) {
                    Ok(()) => ctx
                        .activity_log
                        .add(format!("Removed empty folder {}", dir.display())),
                    Err(e) => debug!("Failed to remove {:?}: {}", dir, e),
                }
            }
        }

        ctx.activity_log.add(format!(
            "Junk cleanup finished: {} files removed",
            cleaned
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::jobs::test_support::context;
    use tempfile::TempDir;

    #[test]
    fn removes_orphans_and_empty_folders_bottom_up() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();

        let orphan = music.path().join("Old Album/CD1");
        fs::create_dir_all(&orphan).unwrap();
        fs::write(orphan.join("cover.jpg"), b"jpg").unwrap();
        fs::write(orphan.join("track.lrc"), b"lyrics").unwrap();

        let alive = music.path().join("Live Album");
        fs::create_dir_all(&alive).unwrap();
        fs::write(alive.join("song.flac"), b"flac").unwrap();
        fs::write(alive.join("song.nfo"), b"nfo").unwrap();

        let other = music.path().join("Misc");
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("readme.md"), b"keep me").unwrap();

        fs::write(music.path().join("root.txt"), b"root junk").unwrap();

        let ctx = context(&music, &data);
        CleanJunkJob.execute(&ctx).unwrap();

        assert!(!music.path().join("Old Album").exists());
        assert!(alive.join("song.nfo").exists());
        assert!(other.join("readme.md").exists());
        assert!(!music.path().join("root.txt").exists());
        assert!(music.path().exists());
        assert!(ctx.activity_log.entries()[0].contains("3 files removed"));
    }

    #[test]
    fn never_removes_the_root() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let ctx = context(&music, &data);

        CleanJunkJob.execute(&ctx).unwrap();
        assert!(music.path().is_dir());
    }
}
