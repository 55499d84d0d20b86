use super::context::JobContext;
use super::cron::CronSchedule;
use super::handle::{SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, JobError};
use crate::server::metrics;
use crate::settings::Settings;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest time the scheduler sleeps before looking at the schedule again.
const MAX_SLEEP: Duration = Duration::from_secs(60);
const SHUTDOWN_WAIT: Duration = Duration::from_secs(30);
pub const LAST_RUN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Currently running jobs with their task handles (not shared, managed by scheduler loop)
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

/// Next fire time of `job_id` according to `settings`, if it is enabled and
/// its cron expression is valid.
fn next_run_for(settings: &Settings, job_id: &str, after: &DateTime<Local>) -> Option<DateTime<Local>> {
    let task = settings.tasks_config.get(job_id)?;
    if !task.enabled {
        return None;
    }
    match CronSchedule::parse(&task.cron) {
        Ok(schedule) => {
            let next = schedule.next_after(after);
            if next.is_none() {
                warn!("Schedule '{}' of job {} never fires", task.cron, job_id);
            }
            next
        }
        Err(e) => {
            warn!("Job {} not scheduled: {}", job_id, e);
            None
        }
    }
}

impl JobScheduler {
    pub fn new(
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            command_receiver,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());
        let mut state = self.shared_state.write().await;
        state.jobs.insert(job_id, job);
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        self.reschedule().await;

        loop {
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    /// Handle a command from the SchedulerHandle.
    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
            SchedulerCommand::Reschedule => self.reschedule().await,
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let state = self.shared_state.read().await;
        if !state.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }

        if state.running_jobs.contains(job_id) {
            return Err(JobError::AlreadyRunning);
        }
        drop(state);

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    /// Recomputes the next run of every job from the current settings.
    async fn reschedule(&mut self) {
        let settings = self.job_context.settings.get();
        let now = Local::now();

        let mut state = self.shared_state.write().await;
        let SharedJobState {
            jobs, next_runs, ..
        } = &mut *state;

        next_runs.clear();
        for job_id in jobs.keys() {
            if let Some(next) = next_run_for(&settings, job_id, &now) {
                debug!("Job {} next run at {}", job_id, next);
                next_runs.insert(job_id.clone(), next);
            }
        }
        info!("Scheduled {} of {} jobs", next_runs.len(), jobs.len());
    }

    /// Calculate time until the next scheduled job should run.
    async fn time_until_next_scheduled_job(&self) -> Duration {
        let mut min_duration = MAX_SLEEP;
        let now = Local::now();

        let state = self.shared_state.read().await;
        for next_run in state.next_runs.values() {
            if *next_run <= now {
                return Duration::from_secs(0);
            }
            let duration = (*next_run - now).to_std().unwrap_or(Duration::from_secs(1));
            if duration < min_duration {
                min_duration = duration;
            }
        }

        min_duration
    }

    /// Run all jobs that are due for scheduled execution.
    async fn run_due_jobs(&mut self) {
        let now = Local::now();
        let settings = self.job_context.settings.get();
        let mut jobs_to_run = Vec::new();

        {
            let mut state = self.shared_state.write().await;
            let due: Vec<String> = state
                .next_runs
                .iter()
                .filter(|(_, next_run)| **next_run <= now)
                .map(|(job_id, _)| job_id.clone())
                .collect();

            for job_id in due {
                match next_run_for(&settings, &job_id, &now) {
                    Some(next) => state.next_runs.insert(job_id.clone(), next),
                    None => state.next_runs.remove(&job_id),
                };

                if state.running_jobs.contains(&job_id) {
                    info!("Skipping scheduled run of {}: still running", job_id);
                    continue;
                }
                jobs_to_run.push(job_id);
            }
        }

        for job_id in jobs_to_run {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let job = {
            let state = self.shared_state.read().await;
            match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            }
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);
        let job_name = job.name();
        self.job_context
            .activity_log
            .add(format!("Task started: {} ({})", job_name, triggered_by));

        // Mark job as running in shared state
        {
            let mut state = self.shared_state.write().await;
            state.running_jobs.insert(job_id.to_string());
        }

        metrics::set_background_job_running(job_id, true);

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());
        let ctx = self.job_context.with_token(cancel_token);

        let settings = Arc::clone(&self.job_context.settings);
        let activity_log = Arc::clone(&self.job_context.activity_log);
        let job_id_owned = job_id.to_string();
        let shared_state = Arc::clone(&self.shared_state);

        // Jobs are synchronous, run them on the blocking pool
        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            let elapsed = start_time.elapsed();

            let status_label = match result {
                Ok(Ok(())) => {
                    info!(
                        "Job {} completed successfully in {:?}",
                        job_id_owned, elapsed
                    );
                    activity_log.add(format!("Task finished: {}", job_name));
                    "success"
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    activity_log.add(format!("Task cancelled: {}", job_name));
                    "cancelled"
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    activity_log.add(format!("Task failed: {}: {}", job_name, e));
                    "failed"
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    activity_log.add(format!("Task failed: {}: {}", job_name, e));
                    "panic"
                }
            };

            metrics::record_background_job_execution(&job_id_owned, status_label, elapsed);
            metrics::set_background_job_running(&job_id_owned, false);

            if status_label != "cancelled" {
                let finished_at = Local::now().format(LAST_RUN_FORMAT).to_string();
                if let Err(e) = settings.set_last_run(&job_id_owned, &finished_at) {
                    error!("Failed to record last run of {}: {:#}", job_id_owned, e);
                }
            }

            {
                let mut state = shared_state.write().await;
                state.running_jobs.remove(&job_id_owned);
            }
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Clean up handles for completed jobs.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(&job_id);
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        for (job_id, token) in &self.job_cancel_tokens {
            debug!("Cancelling job: {}", job_id);
            token.cancel();
        }

        for (job_id, handle) in self.running_handles.drain() {
            if tokio::time::timeout(SHUTDOWN_WAIT, handle).await.is_err() {
                warn!("Job {} did not stop within {:?}", job_id, SHUTDOWN_WAIT);
            }
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::new()));
    let settings = Arc::clone(&job_context.settings);

    let scheduler = JobScheduler::new(
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
    );

    let handle = SchedulerHandle::new(command_tx, shared_state, settings);

    (scheduler, handle)
}
