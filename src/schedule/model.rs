//! Core schedule types.
//!
//! A schedule is one of three shapes: a single fire time, a fixed interval
//! anchored at a base time, or a cron expression evaluated in a timezone.
//! All timestamps are epoch milliseconds.

use serde::{Deserialize, Serialize};

use super::cron::CronEvaluator;
use crate::error::ScheduleError;

/// Epoch milliseconds.
pub type Timestamp = i64;

/// When a task should fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire exactly once.
    Once { run_at: Timestamp },
    /// Fire every `interval_ms`, starting at `start_at` (or the task's creation time).
    Interval {
        interval_ms: i64,
        #[serde(default)]
        start_at: Option<Timestamp>,
    },
    /// Fire on a cron schedule in `timezone` (UTC when absent).
    Cron {
        expression: String,
        #[serde(default)]
        timezone: Option<String>,
    },
}

impl Schedule {
    /// The string tag used in serialized form.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Schedule::Once { .. } => "once",
            Schedule::Interval { .. } => "interval",
            Schedule::Cron { .. } => "cron",
        }
    }

    /// Reject schedules that can never be evaluated.
    pub fn validate(&self, cron: &dyn CronEvaluator) -> Result<(), ScheduleError> {
        match self {
            Schedule::Once { .. } => Ok(()),
            Schedule::Interval { interval_ms, .. } => {
                if *interval_ms <= 0 {
                    Err(ScheduleError::NonPositiveInterval {
                        interval_ms: *interval_ms,
                    })
                } else {
                    Ok(())
                }
            }
            Schedule::Cron {
                expression,
                timezone,
            } => cron.validate(expression, timezone.as_deref()),
        }
    }

    /// Smallest occurrence strictly after `after`.
    ///
    /// `anchor` is the base of an `Interval` without `start_at` (the task's
    /// creation time). Returns `None` when the schedule never fires again.
    pub fn next_occurrence(
        &self,
        after: Timestamp,
        anchor: Timestamp,
        cron: &dyn CronEvaluator,
    ) -> Option<Timestamp> {
        match self {
            Schedule::Once { run_at } => (*run_at > after).then_some(*run_at),
            Schedule::Interval {
                interval_ms,
                start_at,
            } => next_interval(start_at.unwrap_or(anchor), *interval_ms, after),
            Schedule::Cron {
                expression,
                timezone,
            } => cron.next_after(expression, timezone.as_deref(), after),
        }
    }

    /// First occurrence at or after `at`. Used when a schedule takes effect.
    pub fn first_occurrence(
        &self,
        at: Timestamp,
        anchor: Timestamp,
        cron: &dyn CronEvaluator,
    ) -> Option<Timestamp> {
        self.next_occurrence(at.saturating_sub(1), anchor, cron)
    }

    /// Whether the schedule can fire more than once.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Schedule::Once { .. })
    }
}

/// A task is due when its stored next run time has been reached.
pub fn is_due(next_run_at: Option<Timestamp>, now: Timestamp) -> bool {
    next_run_at.is_some_and(|next| next <= now)
}

fn next_interval(base: Timestamp, interval_ms: i64, after: Timestamp) -> Option<Timestamp> {
    if interval_ms <= 0 {
        return None;
    }
    if base > after {
        return Some(base);
    }
    let interval = i128::from(interval_ms);
    let base = i128::from(base);
    let steps = (i128::from(after) - base) / interval + 1;
    i64::try_from(base + steps * interval).ok()
}
