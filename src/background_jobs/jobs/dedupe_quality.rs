//! Removes lower-quality copies of tracks stored next to a better format.

use super::existing_target_dir;
use crate::background_jobs::{BackgroundJob, JobContext, JobError};
use crate::dedupe::{plan_quality_dedupe, QualityGroup};
use rayon::prelude::*;
use std::fs;
use tracing::{info, warn};

pub struct DedupeQualityJob;

fn remove_inferior(ctx: &JobContext, group: &QualityGroup) -> usize {
    let mut removed = 0;
    for path in &group.remove {
        match fs::remove_file(path) {
            Ok(()) => {
                ctx.forget_file(path);
                info!("Removed {:?}, keeping {:?}", path, group.keep);
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {:?}: {}", path, e),
        }
    }
    removed
}

impl BackgroundJob for DedupeQualityJob {
    fn id(&self) -> &'static str {
        crate::settings::TASK_DEDUPE_QUALITY
    }

    fn name(&self) -> &'static str {
        "Quality Dedupe"
    }

    fn description(&self) -> &'static str {
        "Keep only the best format of tracks sharing a name in the same folder"
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let dir = existing_target_dir(ctx)?;
        let plan = plan_quality_dedupe(&dir);
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let removed: usize = plan
            .par_iter()
            .map(|group| {
                if ctx.is_cancelled() {
                    0
                } else {
                    remove_inferior(ctx, group)
                }
            })
            .sum();

        ctx.activity_log.add(format!(
            "Quality dedupe finished: {} files removed from {} groups",
            removed,
            plan.len()
        ));
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        Ok(())
    }
}
