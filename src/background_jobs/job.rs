use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

/// Work executed on every tick of a job. An `Err` marks the attempt as failed.
pub type JobCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Declarative description of a scheduled job.
#[derive(Clone)]
pub struct JobConfig {
    /// Unique job name. Also the name of the advisory lock guarding it.
    pub name: String,
    /// Cron expression. Empty disables the job.
    pub cron_time: String,
    pub callback: JobCallback,
}

impl JobConfig {
    pub fn new<F, Fut>(name: impl Into<String>, cron_time: impl Into<String>, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            cron_time: cron_time.into(),
            callback: Arc::new(move || callback().boxed()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.cron_time.trim().is_empty()
    }
}

impl std::fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobConfig")
            .field("name", &self.name)
            .field("cron_time", &self.cron_time)
            .finish_non_exhaustive()
    }
}

/// How a single tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another instance held the lock, nothing ran.
    Skipped,
    Completed,
    /// The callback failed on every attempt.
    Failed,
    /// The lock could not be set up or queried.
    LockFailed,
}
