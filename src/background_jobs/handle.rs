use super::job::{BackgroundJob, JobError};
use crate::settings::SettingsStore;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::warn;

/// Information about a registered job for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub cron: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_duration: Option<u32>,
    pub is_running: bool,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
    /// Settings changed; recompute every next run.
    Reschedule,
}

/// Shared state between scheduler and handle.
pub struct SharedJobState {
    /// Static job info (set at registration, never changes)
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    /// Currently running job IDs
    pub running_jobs: HashSet<String>,
    /// Next scheduled run of every enabled job with a valid cron expression
    pub next_runs: HashMap<String, DateTime<Local>>,
}

impl SharedJobState {
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            running_jobs: HashSet::new(),
            next_runs: HashMap::new(),
        }
    }
}

/// Handle to interact with the job scheduler from HTTP handlers.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared_state: Arc<RwLock<SharedJobState>>,
    settings: Arc<SettingsStore>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            settings,
        }
    }

    fn job_info(
        state: &SharedJobState,
        settings: &crate::settings::Settings,
        job_id: &str,
        job: &Arc<dyn BackgroundJob>,
    ) -> JobInfo {
        let task = settings.tasks_config.get(job_id);
        JobInfo {
            id: job_id.to_string(),
            name: job.name().to_string(),
            description: job.description().to_string(),
            enabled: task.map(|t| t.enabled).unwrap_or(false),
            cron: task.map(|t| t.cron.clone()).unwrap_or_default(),
            min_duration: task.and_then(|t| t.min_duration),
            is_running: state.running_jobs.contains(job_id),
            last_run: task.and_then(|t| t.last_run.clone()),
            next_run: state
                .next_runs
                .get(job_id)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Get information about all registered jobs.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.shared_state.read().await;
        let settings = self.settings.get();

        let mut jobs: Vec<JobInfo> = state
            .jobs
            .iter()
            .map(|(job_id, job)| Self::job_info(&state, &settings, job_id, job))
            .collect();

        // Sort by job ID for consistent ordering
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Get information about a specific job.
    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        let state = self.shared_state.read().await;
        let settings = self.settings.get();
        state
            .jobs
            .get(job_id)
            .map(|job| Self::job_info(&state, &settings, job_id, job))
    }

    /// Trigger a job manually.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler not available".to_string()))?;

        response_rx
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler did not respond".to_string()))?
    }

    /// Asks the scheduler to re-read the task settings.
    pub async fn reschedule(&self) {
        if self
            .command_tx
            .send(SchedulerCommand::Reschedule)
            .await
            .is_err()
        {
            warn!("Scheduler not available, schedule not refreshed");
        }
    }

    /// Check if a job is currently running.
    pub async fn is_job_running(&self, job_id: &str) -> bool {
        let state = self.shared_state.read().await;
        state.running_jobs.contains(job_id)
    }

    /// Check if a job with the given ID exists.
    pub async fn job_exists(&self, job_id: &str) -> bool {
        let state = self.shared_state.read().await;
        state.jobs.contains_key(job_id)
    }
}
