use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pezzottify_job_runner::background_jobs::jobs::shell_command_job;
use pezzottify_job_runner::config;
use pezzottify_job_runner::{
    AlertNotifier, CronScheduler, JobRunner, LogMailer, PostgresLockBackend, RetryPolicy,
};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// PostgreSQL connection string used for advisory locks.
    /// Can also be specified in config file.
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// IANA timezone in which cron expressions are evaluated.
    #[clap(long)]
    pub timezone: Option<String>,

    /// Deployment environment name, shown in failure alerts.
    #[clap(long)]
    pub environment: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            database_url: args.database_url.clone(),
            timezone: args.timezone.clone(),
            environment: args.environment.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;
    let settings = app_config.job_runner.clone();

    info!("Configuration:");
    info!("  environment: {}", settings.environment);
    info!("  hostname: {}", settings.hostname);
    info!("  timezone: {}", settings.timezone);
    info!("  cooldown: {:?}", settings.cooldown);
    info!(
        "  retry: {} attempts, {:?}..{:?}",
        settings.retry.attempts, settings.retry.min_timeout, settings.retry.max_timeout
    );
    info!(
        "  notifications: {}",
        if settings.notifications.enabled {
            settings.notifications.recipients.join(", ")
        } else {
            "disabled".to_string()
        }
    );

    let mut jobs = Vec::new();
    for entry in &app_config.jobs {
        let Some(command) = &entry.command else {
            warn!("Job {} has no command, ignoring", entry.name);
            continue;
        };
        match shell_command_job(&entry.name, &entry.cron, command) {
            Ok(job) => jobs.push(job),
            Err(e) => error!("{:#}", e),
        }
    }

    let shutdown_token = CancellationToken::new();
    let lock_backend = Arc::new(PostgresLockBackend::new(&app_config.database_url));
    let scheduler = Arc::new(CronScheduler::new(shutdown_token.clone()));
    let notifier = Arc::new(AlertNotifier::new(
        Arc::new(LogMailer),
        RetryPolicy::new(&settings.retry),
    ));

    let runner = JobRunner::new(lock_backend, scheduler, notifier, settings);
    let handles = runner.run_jobs(jobs);
    info!("Running {} scheduled job(s)", handles.len());

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, initiating graceful shutdown");
    for handle in &handles {
        handle.stop();
    }
    shutdown_token.cancel();
    // Give scheduler loops a moment to wind down
    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok(())
}
