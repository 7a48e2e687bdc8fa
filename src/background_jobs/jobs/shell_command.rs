//! Job that runs an external command on every tick.

use crate::background_jobs::JobConfig;
use anyhow::{anyhow, bail, Context, Result};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Build a job running `command` with its arguments, without a shell.
///
/// The command line is split with shell quoting rules. A non-zero exit status
/// fails the attempt.
pub fn shell_command_job(name: &str, cron_time: &str, command: &str) -> Result<JobConfig> {
    let argv = shlex::split(command)
        .ok_or_else(|| anyhow!("Job {}: cannot parse command '{}'", name, command))?;
    if argv.is_empty() {
        bail!("Job {}: command is empty", name);
    }
    let argv = Arc::new(argv);
    let job_name = name.to_string();

    Ok(JobConfig::new(name, cron_time, move || {
        let argv = Arc::clone(&argv);
        let job_name = job_name.clone();
        async move { run_command(&job_name, &argv).await }
    }))
}

async fn run_command(job_name: &str, argv: &[String]) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("Job {}: command is empty", job_name))?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to spawn '{}'", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("'{}' exited with {}: {}", program, output.status, stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!("{} output: {}", job_name, stdout.trim());
    }
    Ok(())
}
