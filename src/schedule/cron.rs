//! Cron evaluation.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::model::Timestamp;
use crate::error::ScheduleError;

/// Capability that answers "when does this cron expression fire next".
pub trait CronEvaluator: Send + Sync {
    /// Check that the expression and timezone can be evaluated.
    fn validate(&self, expression: &str, timezone: Option<&str>) -> Result<(), ScheduleError>;

    /// First fire time strictly after `after`, or `None` when the expression is
    /// invalid or never fires again.
    fn next_after(
        &self,
        expression: &str,
        timezone: Option<&str>,
        after: Timestamp,
    ) -> Option<Timestamp>;
}

/// Evaluator backed by the `cron` crate.
///
/// Accepts standard 5-field crontab syntax as well as the crate-native 6/7-field
/// syntax with seconds (and an optional year).
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCron;

impl CronEvaluator for StandardCron {
    fn validate(&self, expression: &str, timezone: Option<&str>) -> Result<(), ScheduleError> {
        parse_schedule(expression)?;
        parse_timezone(timezone)?;
        Ok(())
    }

    fn next_after(
        &self,
        expression: &str,
        timezone: Option<&str>,
        after: Timestamp,
    ) -> Option<Timestamp> {
        let schedule = parse_schedule(expression).ok()?;
        let tz = parse_timezone(timezone).ok()?;
        let from = DateTime::<Utc>::from_timestamp_millis(after)?.with_timezone(&tz);
        schedule
            .after(&from)
            .next()
            .map(|next| next.with_timezone(&Utc).timestamp_millis())
    }
}

fn parse_schedule(expression: &str) -> Result<cron::Schedule, ScheduleError> {
    let normalized = normalize_expression(expression)?;
    cron::Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

fn normalize_expression(expression: &str) -> Result<String, ScheduleError> {
    let expression = expression.trim();
    let field_count = expression.split_whitespace().count();

    match field_count {
        // standard crontab syntax: minute hour day month weekday
        5 => Ok(format!("0 {expression}")),
        6 | 7 => Ok(expression.to_string()),
        _ => Err(ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: format!("expected 5, 6, or 7 fields, got {field_count}"),
        }),
    }
}

fn parse_timezone(timezone: Option<&str>) -> Result<Tz, ScheduleError> {
    match timezone.map(str::trim) {
        None | Some("") => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone {
                timezone: name.to_string(),
            }),
    }
}
