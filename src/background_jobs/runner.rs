use super::job::{JobConfig, TickOutcome};
use super::retry_policy::RetryPolicy;
use super::scheduler::{ScheduleHandle, TickFn, TickScheduler};
use crate::advisory_lock::{AdvisoryLock, LockBackend};
use crate::config::JobRunnerSettings;
use crate::notifications::AlertNotifier;
use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Runs declared jobs on their cron schedules, one active execution per job
/// across every instance sharing the lock database.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    lock_backend: Arc<dyn LockBackend>,
    scheduler: Arc<dyn TickScheduler>,
    notifier: Arc<AlertNotifier>,
    retry_policy: RetryPolicy,
    settings: JobRunnerSettings,
}

impl JobRunner {
    pub fn new(
        lock_backend: Arc<dyn LockBackend>,
        scheduler: Arc<dyn TickScheduler>,
        notifier: Arc<AlertNotifier>,
        settings: JobRunnerSettings,
    ) -> Self {
        let retry_policy = RetryPolicy::new(&settings.retry);
        Self {
            inner: Arc::new(RunnerInner {
                lock_backend,
                scheduler,
                notifier,
                retry_policy,
                settings,
            }),
        }
    }

    /// Schedule every enabled job.
    ///
    /// Jobs with an empty cron expression are skipped. A job whose schedule
    /// cannot be created is logged and skipped, the others still start.
    pub fn run_jobs(&self, configs: Vec<JobConfig>) -> Vec<ScheduleHandle> {
        let mut handles = Vec::new();

        for config in configs {
            if !config.is_enabled() {
                info!("Job {} is disabled (no cron expression)", config.name);
                continue;
            }

            let name = config.name.clone();
            let cron_time = config.cron_time.clone();
            let runner = self.clone();
            let job = Arc::new(config);
            let on_tick: TickFn = Arc::new(move || {
                let runner = runner.clone();
                let job = Arc::clone(&job);
                async move {
                    runner.run_tick(&job).await;
                }
                .boxed()
            });

            match self.inner.scheduler.schedule(
                &name,
                &cron_time,
                self.inner.settings.timezone,
                on_tick,
            ) {
                Ok(handle) => {
                    info!(
                        "Scheduled job {} with cron '{}' ({})",
                        name, cron_time, self.inner.settings.timezone
                    );
                    handles.push(handle);
                }
                Err(e) => {
                    error!("Failed to schedule job {}: {:#}", name, e);
                }
            }
        }

        handles
    }

    /// Execute one tick of `job`.
    ///
    /// Never fails: every error ends up in the log, and in an alert when
    /// notifications are enabled.
    pub async fn run_tick(&self, job: &JobConfig) -> TickOutcome {
        let session = match self.inner.lock_backend.open_session().await {
            Ok(session) => session,
            Err(e) => {
                error!("{}: could not open lock session: {:#}", job.name, e);
                return TickOutcome::LockFailed;
            }
        };

        let mut lock = match AdvisoryLock::new(session, &job.name) {
            Ok(lock) => lock,
            Err(e) => {
                error!("{}: {}", job.name, e);
                return TickOutcome::LockFailed;
            }
        };

        match lock.try_acquire().await {
            Ok(true) => {}
            Ok(false) => {
                debug!("{} is running on another instance, skipping tick", job.name);
                return TickOutcome::Skipped;
            }
            Err(e) => {
                error!("{}: {}", job.name, e);
                return TickOutcome::LockFailed;
            }
        }

        info!("Starting job: {}", job.name);
        let start_time = Instant::now();

        let result = self.inner.retry_policy.run(|| run_attempt(job)).await;

        let outcome = match result {
            Ok(()) => {
                info!("{} completed in {:?}", job.name, start_time.elapsed());
                TickOutcome::Completed
            }
            Err(e) => {
                self.report_failure(job, e).await;
                TickOutcome::Failed
            }
        };

        // Keep the lock through the cooldown so other instances firing on the
        // same trigger still see it held.
        tokio::time::sleep(self.inner.settings.cooldown).await;
        if let Err(e) = lock.release().await {
            error!("{}: {}", job.name, e);
        }

        outcome
    }

    async fn report_failure(&self, job: &JobConfig, err: anyhow::Error) {
        let message = format!("{:#}", err);
        let stack_trace = format!("{:?}", err);

        error!("{} failed.", job.name);
        error!("{}", stack_trace);

        let settings = &self.inner.settings;
        if !settings.notifications.enabled {
            return;
        }

        let subject = format!(
            "[{}] Job {} failed on {}",
            settings.environment, job.name, settings.hostname
        );
        let body = format!(
            "Job {} failed on host {} ({}).\n\nError: {}",
            job.name, settings.hostname, settings.environment, message
        );
        let email = self.inner.notifier.generate_email(
            &subject,
            &settings.notifications.recipients,
            &body,
            &stack_trace,
        );
        self.inner.notifier.send_with_retry(email).await;
    }
}

/// One invocation of the job callback. A panic counts as a failed attempt.
fn run_attempt(job: &JobConfig) -> BoxFuture<'static, anyhow::Result<()>> {
    AssertUnwindSafe((job.callback)())
        .catch_unwind()
        .map(|result| match result {
            Ok(result) => result,
            Err(panic) => Err(anyhow!("panicked: {}", panic_message(panic))),
        })
        .boxed()
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
