mod file_config;

pub use file_config::{FileConfig, JobFileConfig, NotificationsConfig, RetryConfig};

use anyhow::{anyhow, bail, Result};
use chrono_tz::Tz;
use std::time::Duration;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_MIN_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_RETRY_MAX_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_COOLDOWN_SECS: u64 = 10;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub database_url: Option<String>,
    pub timezone: Option<String>,
    pub environment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub job_runner: JobRunnerSettings,
    pub jobs: Vec<JobEntry>,
}

/// Everything the job runner reads from configuration.
#[derive(Debug, Clone)]
pub struct JobRunnerSettings {
    pub timezone: Tz,
    pub environment: String,
    pub hostname: String,
    pub retry: RetrySettings,
    /// Wait between the end of a job and the release of its lock.
    pub cooldown: Duration,
    pub notifications: NotificationSettings,
}

impl Default for JobRunnerSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            environment: "development".to_string(),
            hostname: local_hostname(),
            retry: RetrySettings::default(),
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            notifications: NotificationSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Total attempts, the first call included.
    pub attempts: u32,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            min_timeout: Duration::from_millis(DEFAULT_RETRY_MIN_TIMEOUT_MS),
            max_timeout: Duration::from_millis(DEFAULT_RETRY_MAX_TIMEOUT_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub recipients: Vec<String>,
}

/// A job declared in the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEntry {
    pub name: String,
    pub cron: String,
    pub command: Option<String>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let database_url = file
            .database_url
            .or_else(|| cli.database_url.clone())
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("database_url must be specified via --database-url or in config file")
            })?;

        let timezone = match file.timezone.or_else(|| cli.timezone.clone()) {
            Some(name) => parse_timezone(&name)?,
            None => Tz::UTC,
        };

        let environment = file
            .environment
            .or_else(|| cli.environment.clone())
            .unwrap_or_else(|| "development".to_string());

        let hostname = file.hostname.unwrap_or_else(local_hostname);

        let retry_file = file.retry.unwrap_or_default();
        let retry = RetrySettings {
            attempts: retry_file.attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            min_timeout: Duration::from_millis(
                retry_file
                    .min_timeout_ms
                    .unwrap_or(DEFAULT_RETRY_MIN_TIMEOUT_MS),
            ),
            max_timeout: Duration::from_millis(
                retry_file
                    .max_timeout_ms
                    .unwrap_or(DEFAULT_RETRY_MAX_TIMEOUT_MS),
            ),
            backoff_multiplier: retry_file
                .backoff_multiplier
                .unwrap_or(DEFAULT_BACKOFF_MULTIPLIER),
        };
        if retry.attempts == 0 {
            bail!("retry.attempts must be at least 1");
        }
        if retry.backoff_multiplier < 1.0 {
            bail!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                retry.backoff_multiplier
            );
        }

        let notifications_file = file.notifications.unwrap_or_default();
        let notifications = NotificationSettings {
            enabled: notifications_file.enabled.unwrap_or(false),
            recipients: notifications_file.recipients.unwrap_or_default(),
        };
        if notifications.enabled && notifications.recipients.is_empty() {
            bail!("notifications are enabled but no recipients are configured");
        }

        let jobs = file
            .jobs
            .unwrap_or_default()
            .into_iter()
            .map(|(name, job)| JobEntry {
                name,
                cron: job.cron.unwrap_or_default().trim().to_string(),
                command: job.command,
            })
            .collect();

        Ok(Self {
            database_url,
            job_runner: JobRunnerSettings {
                timezone,
                environment,
                hostname,
                retry,
                cooldown: Duration::from_secs(file.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS)),
                notifications,
            },
            jobs,
        })
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow!("Invalid timezone '{}': {}", name, e))
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn cli_with_db() -> CliConfig {
        CliConfig {
            database_url: Some("postgres://cli@localhost/jobs".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let cli = CliConfig {
            database_url: Some("postgres://cli@localhost/jobs".to_string()),
            timezone: Some("America/New_York".to_string()),
            environment: Some("staging".to_string()),
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.database_url, "postgres://cli@localhost/jobs");
        assert_eq!(config.job_runner.timezone, chrono_tz::America::New_York);
        assert_eq!(config.job_runner.environment, "staging");
        assert!(!config.job_runner.hostname.is_empty());
        assert_eq!(config.job_runner.retry.attempts, 5);
        assert_eq!(
            config.job_runner.retry.min_timeout,
            Duration::from_millis(1000)
        );
        assert_eq!(config.job_runner.cooldown, Duration::from_secs(10));
        assert!(!config.job_runner.notifications.enabled);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            database_url: Some("postgres://cli@localhost/jobs".to_string()),
            timezone: Some("America/New_York".to_string()),
            environment: Some("staging".to_string()),
        };

        let file_config = FileConfig {
            database_url: Some("postgres://toml@localhost/jobs".to_string()),
            timezone: Some("Europe/Rome".to_string()),
            hostname: Some("worker-7".to_string()),
            cooldown_secs: Some(3),
            retry: Some(RetryConfig {
                min_timeout_ms: Some(50),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.database_url, "postgres://toml@localhost/jobs");
        assert_eq!(config.job_runner.timezone, chrono_tz::Europe::Rome);
        assert_eq!(config.job_runner.hostname, "worker-7");
        assert_eq!(config.job_runner.cooldown, Duration::from_secs(3));
        assert_eq!(
            config.job_runner.retry.min_timeout,
            Duration::from_millis(50)
        );
        // CLI value used when TOML doesn't specify
        assert_eq!(config.job_runner.environment, "staging");
        assert_eq!(config.job_runner.retry.attempts, 5);
    }

    #[test]
    fn test_resolve_missing_database_url_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("database_url must be specified"));
    }

    #[test]
    fn test_resolve_invalid_timezone_error() {
        let cli = CliConfig {
            timezone: Some("Mars/Olympus_Mons".to_string()),
            ..cli_with_db()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("Invalid timezone"));
    }

    #[test]
    fn test_resolve_zero_attempts_error() {
        let file_config = FileConfig {
            retry: Some(RetryConfig {
                attempts: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli_with_db(), Some(file_config)).is_err());
    }

    #[test]
    fn test_resolve_notifications_need_recipients() {
        let file_config = FileConfig {
            notifications: Some(NotificationsConfig {
                enabled: Some(true),
                recipients: None,
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli_with_db(), Some(file_config));
        assert!(result.unwrap_err().to_string().contains("no recipients"));

        let file_config = FileConfig {
            notifications: Some(NotificationsConfig {
                enabled: Some(true),
                recipients: Some(vec!["ops@example.com".to_string()]),
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli_with_db(), Some(file_config)).unwrap();
        assert!(config.job_runner.notifications.enabled);
        assert_eq!(
            config.job_runner.notifications.recipients,
            vec!["ops@example.com".to_string()]
        );
    }

    #[test]
    fn test_jobs_resolved_in_name_order() {
        let mut jobs = BTreeMap::new();
        jobs.insert(
            "report".to_string(),
            JobFileConfig {
                cron: Some(" 0 3 * * * ".to_string()),
                command: Some("echo hi".to_string()),
            },
        );
        jobs.insert(
            "paused".to_string(),
            JobFileConfig {
                cron: None,
                command: Some("true".to_string()),
            },
        );
        let file_config = FileConfig {
            jobs: Some(jobs),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli_with_db(), Some(file_config)).unwrap();

        assert_eq!(
            config.jobs,
            vec![
                JobEntry {
                    name: "paused".to_string(),
                    cron: String::new(),
                    command: Some("true".to_string()),
                },
                JobEntry {
                    name: "report".to_string(),
                    cron: "0 3 * * *".to_string(),
                    command: Some("echo hi".to_string()),
                },
            ]
        );
    }
}
