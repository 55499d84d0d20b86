//! Scheduled maintenance of the music library.
//!
//! Jobs are registered once at start-up; whether and when they run is read
//! from the user settings, which can change while the server is running.

mod context;
mod cron;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use cron::{CronError, CronSchedule};
pub use handle::{JobInfo, SchedulerHandle};
pub use job::{BackgroundJob, JobError};
pub use scheduler::{create_scheduler, JobScheduler};
