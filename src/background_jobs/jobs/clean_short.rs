//! Deletes tracks shorter than the configured minimum duration.

use super::existing_target_dir;
use crate::background_jobs::{BackgroundJob, JobContext, JobError};
use crate::library::{has_extension, read_duration};
use std::fs;
use tracing::warn;
use walkdir::WalkDir;

const SHORT_TRACK_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a"];

pub struct CleanShortJob;

impl BackgroundJob for CleanShortJob {
    fn id(&self) -> &'static str {
        crate::settings::TASK_CLEAN_SHORT
    }

    fn name(&self) -> &'static str {
        "Short Track Cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete tracks shorter than the configured minimum duration"
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let dir = existing_target_dir(ctx)?;
        let min_duration = f64::from(ctx.settings.get().min_duration());
        let mut deleted = 0;

        for entry in WalkDir::new(&dir).into_iter().filter_map(Result::ok) {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            let path = entry.path();
            if !entry.file_type().is_file() || !has_extension(path, SHORT_TRACK_EXTENSIONS) {
                continue;
            }
            let Some(duration) = read_duration(path) else {
                continue;
            };
            if duration <= 0.0 || duration >= min_duration {
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => {
                    ctx.forget_file(path);
                    ctx.activity_log.add(format!(
                        "Deleted short track {} ({}s)",
                        path.display(),
                        duration as u64
                    ));
                    deleted += 1;
                }
                Err(e) => warn!("Failed to delete {:?}: {}", path, e),
            }
        }

        ctx.activity_log.add(format!(
            "Short track cleanup finished: {} files deleted",
            deleted
        ));
        Ok(())
    }
}
