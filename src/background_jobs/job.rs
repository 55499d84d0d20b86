use super::context::JobContext;

/// Why a job run did not complete.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,
    #[error("Job is already running")]
    AlreadyRunning,
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Job was cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::ExecutionFailed(format!("{:#}", e))
    }
}

/// Trait for background jobs.
///
/// Jobs are executed synchronously in a blocking context. When a job runs is
/// decided by the task entry with the same id in the settings.
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier, also the key of the job's task settings.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// Execute the job.
    ///
    /// Called through `spawn_blocking`. Long loops should check
    /// `ctx.is_cancelled()` and return `JobError::Cancelled`.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
