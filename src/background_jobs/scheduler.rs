use anyhow::{bail, Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handler invoked on every trigger of a scheduled task.
pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Periodic trigger capability used by the job runner.
///
/// Implementations start firing as soon as `schedule` returns.
pub trait TickScheduler: Send + Sync {
    fn schedule(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Tz,
        on_tick: TickFn,
    ) -> Result<ScheduleHandle>;
}

/// Handle to a scheduled task.
///
/// Stopping prevents future triggers. A tick that is already running is left
/// alone.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    name: String,
    token: CancellationToken,
}

impl ScheduleHandle {
    pub fn new(name: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            name: name.into(),
            token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Parse a cron expression.
///
/// Standard 5-field expressions (`min hour dom month dow`) get a `0` seconds
/// field prepended, and their numeric days of week (0-7, Sunday is 0 or 7)
/// are translated to the `cron` crate numbering (1-7, Sunday is 1). 6 and 7
/// field expressions are passed through in the `cron` crate dialect.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = if fields.len() == 5 {
        let day_of_week = crontab_day_of_week(fields[4])
            .with_context(|| format!("Invalid cron expression '{}'", expr))?;
        format!("0 {} {}", fields[..4].join(" "), day_of_week)
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).with_context(|| format!("Invalid cron expression '{}'", expr))
}

/// Translate a crontab day-of-week field into the `cron` crate numbering.
///
/// Numeric parts (values, ranges, steps) are expanded to an explicit list.
/// `*` and parts using day names are left alone, both dialects agree on them.
fn crontab_day_of_week(field: &str) -> Result<String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut named = Vec::new();
    let mut days = BTreeSet::new();
    for part in field.split(',') {
        if part.chars().any(|c| c.is_ascii_alphabetic()) {
            named.push(part.to_string());
            continue;
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .with_context(|| format!("Invalid day-of-week step '{}'", step))?;
                if step == 0 {
                    bail!("Day-of-week step cannot be 0");
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = match range {
            "*" => (0, 7),
            _ => match range.split_once('-') {
                Some((start, end)) => (parse_weekday(start)?, parse_weekday(end)?),
                // `n/step` runs from n to the end of the week
                None if step.is_some() => (parse_weekday(range)?, 7),
                None => (parse_weekday(range)?, parse_weekday(range)?),
            },
        };
        if start > end {
            bail!("Invalid day-of-week range '{}'", range);
        }

        let step = step.unwrap_or(1) as usize;
        days.extend((start..=end).step_by(step).map(|d| d % 7 + 1));
    }

    named.extend(days.iter().map(|d| d.to_string()));
    Ok(named.join(","))
}

fn parse_weekday(value: &str) -> Result<u32> {
    let day: u32 = value
        .parse()
        .with_context(|| format!("Invalid day of week '{}'", value))?;
    if day > 7 {
        bail!("Day of week must be between 0 and 7, got {}", day);
    }
    Ok(day)
}

/// Timer-driven scheduler running on the tokio runtime.
///
/// Each task sleeps until the next upcoming time in its timezone and spawns
/// the tick as a separate task, so a slow tick never delays the next trigger.
pub struct CronScheduler {
    shutdown_token: CancellationToken,
}

impl CronScheduler {
    /// All tasks stop when `shutdown_token` is cancelled.
    pub fn new(shutdown_token: CancellationToken) -> Self {
        Self { shutdown_token }
    }
}

impl TickScheduler for CronScheduler {
    fn schedule(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Tz,
        on_tick: TickFn,
    ) -> Result<ScheduleHandle> {
        let schedule = parse_cron(cron_expr)?;
        let token = self.shutdown_token.child_token();
        let handle = ScheduleHandle::new(name, token.clone());
        let name = name.to_string();

        tokio::spawn(async move {
            let mut cursor = Utc::now().with_timezone(&timezone);
            loop {
                let now = Utc::now().with_timezone(&timezone);
                if now > cursor {
                    cursor = now;
                }

                let Some(next) = schedule.after(&cursor).next() else {
                    warn!("Schedule for {} has no upcoming times, stopping", name);
                    break;
                };
                let wait = next
                    .signed_duration_since(now)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                debug!("{} next fires at {} (in {:?})", name, next, wait);

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {
                        tokio::spawn(on_tick());
                        cursor = next;
                    }
                }
            }
            info!("Schedule for {} stopped", name);
        });

        Ok(handle)
    }
}

struct ManualEntry {
    name: String,
    cron_expr: String,
    timezone: Tz,
    on_tick: TickFn,
    token: CancellationToken,
}

/// Scheduler that only fires when told to.
///
/// Lets callers drive ticks deterministically, without timers.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    entries: Arc<Mutex<Vec<ManualEntry>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(name, cron expression, timezone)` of every scheduled task.
    pub fn scheduled(&self) -> Vec<(String, String, Tz)> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| (e.name.clone(), e.cron_expr.clone(), e.timezone))
            .collect()
    }

    /// Run one tick of the named task to completion.
    ///
    /// Returns false if no running task has that name.
    pub async fn fire(&self, name: &str) -> bool {
        let on_tick = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries
                .iter()
                .find(|e| e.name == name && !e.token.is_cancelled())
                .map(|e| Arc::clone(&e.on_tick))
        };

        match on_tick {
            Some(on_tick) => {
                on_tick().await;
                true
            }
            None => false,
        }
    }
}

impl TickScheduler for ManualScheduler {
    fn schedule(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Tz,
        on_tick: TickFn,
    ) -> Result<ScheduleHandle> {
        parse_cron(cron_expr)?;
        let token = CancellationToken::new();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ManualEntry {
                name: name.to_string(),
                cron_expr: cron_expr.to_string(),
                timezone,
                on_tick,
                token: token.clone(),
            });
        Ok(ScheduleHandle::new(name, token))
    }
}
