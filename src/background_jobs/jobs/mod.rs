//! Maintenance jobs operating on the configured target directory.

pub mod clean_junk;
pub mod clean_short;
pub mod dedupe_quality;
pub mod extract_meta;

pub use clean_junk::CleanJunkJob;
pub use clean_short::CleanShortJob;
pub use dedupe_quality::DedupeQualityJob;
pub use extract_meta::ExtractMetaJob;

use super::{BackgroundJob, JobContext, JobError};
use std::path::PathBuf;
use std::sync::Arc;

/// Every job the server knows about.
pub fn all_jobs() -> Vec<Arc<dyn BackgroundJob>> {
    vec![
        Arc::new(DedupeQualityJob),
        Arc::new(CleanShortJob),
        Arc::new(ExtractMetaJob),
        Arc::new(CleanJunkJob),
    ]
}

fn existing_target_dir(ctx: &JobContext) -> Result<PathBuf, JobError> {
    let dir = ctx.target_dir();
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(JobError::ExecutionFailed(format!(
            "Target directory {:?} does not exist",
            dir
        )))
    }
}
