//! Cron expressions for scheduled analysis
//!
//! Only minute and hour are significant. Day-of-month, month and weekday
//! must be `*`, so a schedule fires at least once a day.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Five minutes past every hour
pub const DEFAULT_SCHEDULE: &str = "5 * * * *";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected 5 cron fields, found {0}")]
    FieldCount(usize),

    #[error("invalid {field} field {value:?}: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} field must be '*', found {value:?}")]
    Unsupported { field: &'static str, value: String },
}

/// Parsed minute/hour cron schedule, evaluated in UTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expr: String,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount(fields.len()));
        }

        let minutes = parse_field("minute", fields[0], 59)?;
        let hours = parse_field("hour", fields[1], 23)?;

        for (field, value) in [
            ("day-of-month", fields[2]),
            ("month", fields[3]),
            ("weekday", fields[4]),
        ] {
            if value != "*" {
                return Err(ScheduleError::Unsupported {
                    field,
                    value: value.to_string(),
                });
            }
        }

        Ok(Self {
            expr: fields.join(" "),
            minutes,
            hours,
        })
    }

    /// Next firing instant strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = after.date_naive();
        // Every day matches, so the next firing is today or tomorrow
        for date in [today, today.succ_opt()?] {
            for &hour in &self.hours {
                for &minute in &self.minutes {
                    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
                    let candidate = Utc.from_utc_datetime(&date.and_time(time));
                    if candidate > after {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Time left until the next firing, zero if it is already due
    pub fn until_next(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        let next = self.next_after(now)?;
        Some((next - now).to_std().unwrap_or_default())
    }

    /// Firings per day
    pub fn daily_runs(&self) -> usize {
        self.minutes.len() * self.hours.len()
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for CronSchedule {
    fn default() -> Self {
        Self {
            expr: DEFAULT_SCHEDULE.to_string(),
            minutes: BTreeSet::from([5]),
            hours: (0..24).collect(),
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

fn parse_field(field: &'static str, value: &str, max: u32) -> Result<BTreeSet<u32>, ScheduleError> {
    let invalid = |reason: String| ScheduleError::InvalidField {
        field,
        value: value.to_string(),
        reason,
    };
    let number = |s: &str| -> Result<u32, ScheduleError> {
        let n: u32 = s
            .parse()
            .map_err(|_| invalid(format!("{:?} is not a number", s)))?;
        if n > max {
            return Err(invalid(format!("{} is out of range 0-{}", n, max)));
        }
        Ok(n)
    };

    let mut values = BTreeSet::new();
    for part in value.split(',') {
        if part == "*" {
            values.extend(0..=max);
        } else if let Some(step) = part.strip_prefix("*/") {
            let step = number(step)?;
            if step == 0 {
                return Err(invalid("step must be non-zero".to_string()));
            }
            values.extend((0..=max).step_by(step as usize));
        } else if let Some((lo, hi)) = part.split_once('-') {
            let (lo, hi) = (number(lo)?, number(hi)?);
            if lo > hi {
                return Err(invalid(format!("range {}-{} is reversed", lo, hi)));
            }
            values.extend(lo..=hi);
        } else {
            values.insert(number(part)?);
        }
    }

    Ok(values)
}
