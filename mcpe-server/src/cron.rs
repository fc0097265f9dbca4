//! Cron schedule parsing and next-fire computation
//!
//! Subscriptions supply five-field POSIX cron expressions (minute, hour,
//! day-of-month, month, day-of-week) or one of the `@hourly`, `@daily`,
//! `@weekly`, `@monthly` presets. The underlying `cron` crate speaks a
//! six-field grammar with a leading seconds column, so expressions are
//! normalized by resolving presets and prepending a zero seconds field.
//!
//! Firing decisions are made in the subscription's IANA timezone; the
//! instants handed back to the scheduler are absolute UTC.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Why a cron schedule was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
    #[error("expected 5 cron fields, got {0}")]
    FieldCount(usize),
    #[error("invalid cron expression: {0}")]
    Invalid(String),
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// A validated, timezone-aware recurring schedule
#[derive(Debug, Clone)]
pub struct CronSpec {
    schedule: cron::Schedule,
    timezone: Tz,
}

impl CronSpec {
    /// Parse an expression (or preset) in the given IANA timezone
    pub fn parse(expression: &str, timezone: &str) -> Result<Self, CronError> {
        let timezone = Tz::from_str(timezone)
            .map_err(|_| CronError::UnknownTimezone(timezone.to_string()))?;

        let five_field = if let Some(preset) = expression.strip_prefix('@') {
            match preset {
                "hourly" => "0 * * * *".to_string(),
                "daily" => "0 0 * * *".to_string(),
                "weekly" => "0 0 * * SUN".to_string(),
                "monthly" => "0 0 1 * *".to_string(),
                _ => return Err(CronError::UnknownPreset(expression.to_string())),
            }
        } else {
            let fields = expression.split_whitespace().count();
            if fields != 5 {
                return Err(CronError::FieldCount(fields));
            }
            expression.to_string()
        };

        // Leading seconds column pinned to 0: fires land on minute boundaries
        let schedule = cron::Schedule::from_str(&format!("0 {five_field}"))
            .map_err(|e| CronError::Invalid(e.to_string()))?;

        Ok(Self { schedule, timezone })
    }

    /// The next firing instant strictly after `after`, as absolute UTC
    ///
    /// `None` only for schedules with no future occurrence (e.g. a fixed
    /// date in the past).
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|instant| instant.with_timezone(&Utc))
    }
}
