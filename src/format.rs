//! Presentation strategies for durations, timestamps and cron triggers.
//!
//! The dashboard is handed one implementation of each at composition time.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

pub trait TimeFormatter: Send + Sync {
    fn format_duration(&self, d: chrono::Duration) -> String;

    fn format_time(&self, t: DateTime<Utc>, now: DateTime<Utc>) -> String;
}

/// Raw values: milliseconds and RFC 3339 timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormatter;

impl TimeFormatter for PlainFormatter {
    fn format_duration(&self, d: chrono::Duration) -> String {
        format!("{} ms", d.num_milliseconds())
    }

    fn format_time(&self, t: DateTime<Utc>, _now: DateTime<Utc>) -> String {
        t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}

/// Compact durations ("2m 5s") and relative times ("3 hours ago").
#[derive(Debug, Clone, Copy, Default)]
pub struct HumanFormatter;

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

impl TimeFormatter for HumanFormatter {
    fn format_duration(&self, d: chrono::Duration) -> String {
        let ms = d.num_milliseconds();
        if ms < 0 {
            return format!("-{}", self.format_duration(-d));
        }
        if ms < 1_000 {
            return format!("{}ms", ms);
        }
        if ms < 60_000 {
            return format!("{:.1}s", ms as f64 / 1000.0);
        }
        let secs = ms / 1000;
        let (days, hours, minutes, seconds) = (
            secs / 86_400,
            (secs % 86_400) / 3_600,
            (secs % 3_600) / 60,
            secs % 60,
        );
        if days > 0 {
            format!("{}d {}h", days, hours)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    }

    fn format_time(&self, t: DateTime<Utc>, now: DateTime<Utc>) -> String {
        let delta = now - t;
        let (secs, future) = if delta < chrono::Duration::zero() {
            (-delta.num_seconds(), true)
        } else {
            (delta.num_seconds(), false)
        };

        let amount = if secs < 5 {
            return "just now".to_string();
        } else if secs < 60 {
            plural(secs, "second")
        } else if secs < 3_600 {
            plural(secs / 60, "minute")
        } else if secs < 86_400 {
            plural(secs / 3_600, "hour")
        } else {
            plural(secs / 86_400, "day")
        };

        if future {
            format!("in {}", amount)
        } else {
            format!("{} ago", amount)
        }
    }
}

/// Renders a schedule trigger for display.
pub trait CronHumanizer: Send + Sync {
    fn humanize(&self, trigger: &str, cron: &str, now: DateTime<Utc>) -> String;
}

/// Leaves the trigger untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCron;

impl CronHumanizer for PlainCron {
    fn humanize(&self, trigger: &str, _cron: &str, _now: DateTime<Utc>) -> String {
        trigger.to_string()
    }
}

/// Annotates the cron expression inside the trigger with its next fire time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextRunCron;

impl CronHumanizer for NextRunCron {
    fn humanize(&self, trigger: &str, cron: &str, now: DateTime<Utc>) -> String {
        let next = CronSchedule::from_str(cron)
            .ok()
            .and_then(|schedule| schedule.after(&now).next());
        match next {
            Some(next) => trigger.replace(
                cron,
                &format!("{} (next {})", cron, next.format("%Y-%m-%d %H:%M:%S UTC")),
            ),
            None => trigger.to_string(),
        }
    }
}
