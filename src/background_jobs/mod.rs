//! Cron-scheduled job execution guarded by advisory locks.
//!
//! Every instance of the service schedules the same jobs. On each trigger the
//! [`JobRunner`] tries the job's advisory lock and only the instance that gets
//! it runs the callback, with retries, an optional failure alert and a
//! cooldown before the lock is released.

mod job;
pub mod jobs;
mod retry_policy;
mod runner;
mod scheduler;

pub use job::{JobCallback, JobConfig, TickOutcome};
pub use retry_policy::RetryPolicy;
pub use runner::JobRunner;
pub use scheduler::{
    parse_cron, CronScheduler, ManualScheduler, ScheduleHandle, TickFn, TickScheduler,
};
