//! Pezzottify Job Runner Library
//!
//! Cron-scheduled jobs that run on exactly one instance of a horizontally
//! scaled service, coordinated through PostgreSQL advisory locks.

pub mod advisory_lock;
pub mod background_jobs;
pub mod config;
pub mod notifications;

// Re-export commonly used types for convenience
pub use advisory_lock::{AdvisoryLock, LockBackend, LockError, LockKey, PostgresLockBackend};
pub use background_jobs::{CronScheduler, JobConfig, JobRunner, RetryPolicy, TickOutcome};
pub use notifications::{AlertNotifier, LogMailer, Mailer};
