//! Human-readable task summaries. Nothing here panics, whatever the input.

use chrono::{DateTime, Utc};

use crate::schedule::{Schedule, Timestamp};
use crate::task::{TaskRecord, TaskStatus};

pub fn status_label(status: TaskStatus) -> &'static str {
    status.as_str()
}

/// `2026-01-01 09:00:00 UTC`, `-` for none, raw milliseconds when out of
/// chrono's range.
pub fn format_timestamp(timestamp: Option<Timestamp>) -> String {
    match timestamp {
        None => "-".to_string(),
        Some(ms) => match DateTime::<Utc>::from_timestamp_millis(ms) {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => format!("{ms}ms"),
        },
    }
}

/// Compact duration: `250ms`, `45s`, `15m`, `1h30m`, `2d`.
pub fn format_duration_ms(ms: i64) -> String {
    if ms < 0 {
        return format!("{ms}ms");
    }
    if ms < 1_000 || ms % 1_000 != 0 {
        return format!("{ms}ms");
    }

    let secs = ms / 1_000;
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (mins, secs) = (rem / 60, rem % 60);

    let mut out = String::new();
    for (value, unit) in [(days, "d"), (hours, "h"), (mins, "m"), (secs, "s")] {
        if value > 0 {
            out.push_str(&format!("{value}{unit}"));
        }
    }
    out
}

pub fn describe_schedule(schedule: &Schedule) -> String {
    match schedule {
        Schedule::Once { run_at } => format!("once at {}", format_timestamp(Some(*run_at))),
        Schedule::Interval {
            interval_ms,
            start_at,
        } => match start_at {
            Some(start) => format!(
                "every {}, starting {}",
                format_duration_ms(*interval_ms),
                format_timestamp(Some(*start))
            ),
            None => format!("every {}", format_duration_ms(*interval_ms)),
        },
        Schedule::Cron {
            expression,
            timezone,
        } => format!("cron `{}` ({})", expression, timezone.as_deref().unwrap_or("UTC")),
    }
}

/// One-line summary: name, status, schedule, next run and counters.
pub fn describe_task(task: &TaskRecord) -> String {
    let mut line = format!(
        "{} [{}] {}; next run {}; {} ok / {} failed",
        task.name,
        status_label(task.status),
        describe_schedule(&task.schedule),
        format_timestamp(task.next_run_at),
        task.success_count,
        task.failure_count,
    );
    if let Some(error) = &task.last_error {
        line.push_str(&format!("; last error: {}", truncate(error, 120)));
    }
    line
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
