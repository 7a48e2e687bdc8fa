//! Common test infrastructure
//!
//! Simulates several service instances sharing one lock database. Each
//! instance has its own manually driven scheduler, and all of them report
//! alerts to the same recording mailer.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestCluster;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_single_instance() {
//!     let cluster = TestCluster::new(1);
//!     let instance = &cluster.instances[0];
//!     instance.runner.run_jobs(vec![]);
//! }
//! ```

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pezzottify_job_runner::advisory_lock::MemoryLockBackend;
use pezzottify_job_runner::background_jobs::{JobConfig, ManualScheduler, RetryPolicy};
use pezzottify_job_runner::config::{JobRunnerSettings, NotificationSettings, RetrySettings};
use pezzottify_job_runner::notifications::{AlertNotifier, Email, Mailer};
use pezzottify_job_runner::JobRunner;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const COOLDOWN: Duration = Duration::from_secs(10);
pub const RECIPIENT: &str = "oncall@example.com";

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct TestInstance {
    pub runner: JobRunner,
    pub scheduler: ManualScheduler,
}

pub struct TestCluster {
    pub locks: MemoryLockBackend,
    pub mailer: Arc<RecordingMailer>,
    pub instances: Vec<TestInstance>,
}

impl TestCluster {
    pub fn new(instances: usize) -> Self {
        Self::with_notifications(instances, false)
    }

    pub fn with_notifications(instances: usize, enabled: bool) -> Self {
        let locks = MemoryLockBackend::new();
        let mailer = Arc::new(RecordingMailer::default());

        let instances = (0..instances)
            .map(|i| {
                let scheduler = ManualScheduler::new();
                let notifier = Arc::new(AlertNotifier::new(
                    mailer.clone(),
                    RetryPolicy::default(),
                ));
                let runner = JobRunner::new(
                    Arc::new(locks.clone()),
                    Arc::new(scheduler.clone()),
                    notifier,
                    settings(&format!("node-{}", i), enabled),
                );
                TestInstance { runner, scheduler }
            })
            .collect();

        Self {
            locks,
            mailer,
            instances,
        }
    }

    pub fn sent_emails(&self) -> Vec<Email> {
        self.mailer.sent.lock().unwrap().clone()
    }
}

fn settings(hostname: &str, notifications_enabled: bool) -> JobRunnerSettings {
    JobRunnerSettings {
        environment: "staging".to_string(),
        hostname: hostname.to_string(),
        retry: RetrySettings {
            attempts: 5,
            min_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(4),
            backoff_multiplier: 2.0,
        },
        cooldown: COOLDOWN,
        notifications: NotificationSettings {
            enabled: notifications_enabled,
            recipients: vec![RECIPIENT.to_string()],
        },
        ..Default::default()
    }
}

/// Job counting its invocations, optionally failing every time.
pub fn counting_job(name: &str, cron: &str, calls: Arc<AtomicUsize>, fail: bool) -> JobConfig {
    JobConfig::new(name, cron, move || {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(anyhow!("upstream unavailable"))
            } else {
                Ok(())
            }
        }
    })
}
