//! Five-field cron expressions (`minute hour day-of-month month day-of-week`).
//!
//! Parsing and iteration are delegated to the [`cron`](https://docs.rs/cron)
//! crate, whose grammar carries a leading seconds field and numbers weekdays
//! from `1` (Sunday). [`CronExpression`] adapts the classic syntax to it:
//!
//! - the seconds field is pinned to `0`, so every match is a minute boundary;
//! - numeric day-of-week values (`0`–`7`, Sunday being both `0` and `7`) are
//!   rewritten to weekday names before parsing;
//! - when both day-of-month and day-of-week are restricted, a day matches if
//!   **either** field matches, as in Vixie cron.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Why a cron expression was rejected.
#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("expected 5 fields (minute hour day-of-month month day-of-week), got {0}")]
    FieldCount(usize),

    #[error("invalid day-of-week field {0:?}")]
    InvalidDayOfWeek(String),

    #[error("expression never matches any date")]
    NeverFires,

    #[error("unparseable cron field")]
    Parse(#[from] cron::error::Error),
}

/// A validated five-field cron expression.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronExpression {
    source: String,
    schedules: Vec<cron::Schedule>,
}

impl CronExpression {
    /// Parse and validate a five-field expression.
    ///
    /// # Errors
    ///
    /// Returns [`CronError`] if the expression does not have exactly five
    /// fields, if a field cannot be parsed, or if no date can ever match.
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day_of_month, month, day_of_week] = fields.as_slice() else {
            return Err(CronError::FieldCount(fields.len()));
        };

        let day_of_month = wildcard(day_of_month);
        let day_of_week = normalize_day_of_week(&wildcard(day_of_week))?;

        let variants = if is_restricted(&day_of_month) && is_restricted(&day_of_week) {
            vec![
                format!("0 {minute} {hour} {day_of_month} {month} *"),
                format!("0 {minute} {hour} * {month} {day_of_week}"),
            ]
        } else {
            vec![format!(
                "0 {minute} {hour} {day_of_month} {month} {day_of_week}"
            )]
        };

        let schedules = variants
            .iter()
            .map(|v| cron::Schedule::from_str(v))
            .collect::<Result<Vec<_>, _>>()?;

        let expr = Self {
            source: fields.join(" "),
            schedules,
        };
        if expr.next_after(crate::time::now()).is_none() {
            return Err(CronError::NeverFires);
        }
        Ok(expr)
    }

    /// The earliest matching minute strictly after `from`.
    #[must_use]
    pub fn next_after(&self, from: Timestamp) -> Option<Timestamp> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(&from).find(|ts| *ts > from))
            .min()
    }

    /// The normalized five-field text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn wildcard(field: &str) -> String {
    if field == "?" {
        "*".to_string()
    } else {
        field.to_string()
    }
}

fn is_restricted(field: &str) -> bool {
    !field.starts_with('*')
}

/// Rewrite numeric weekdays to names, expanding ranges and steps so that the
/// result never depends on the backing crate's weekday numbering.
fn normalize_day_of_week(field: &str) -> Result<String, CronError> {
    let invalid = || CronError::InvalidDayOfWeek(field.to_string());
    let mut days: Vec<usize> = Vec::new();

    for item in field.split(',') {
        if item.starts_with('*') {
            // `*` and `*/n` select the same weekdays under both numberings.
            if field.contains(',') {
                return Err(invalid());
            }
            return Ok(item.to_string());
        }

        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, step.parse::<usize>().map_err(|_| invalid())?),
            None => (item, 1),
        };
        if step == 0 {
            return Err(invalid());
        }

        let (start, end) = match base.split_once('-') {
            Some((start, end)) => (weekday_index(start), weekday_index(end)),
            None if item.contains('/') => (weekday_index(base), Some(6)),
            None => (weekday_index(base), weekday_index(base)),
        };
        let (Some(start), Some(end)) = (start, end) else {
            return Err(invalid());
        };
        if start > end {
            return Err(invalid());
        }
        days.extend((start..=end).step_by(step).map(|d| d % 7));
    }

    days.sort_unstable();
    days.dedup();
    Ok(days
        .into_iter()
        .map(|d| WEEKDAYS[d])
        .collect::<Vec<_>>()
        .join(","))
}

/// `0`–`7` or a three-letter English weekday name. Seven maps to Sunday at
/// the end of a range so `5-7` reads Friday through Sunday.
fn weekday_index(token: &str) -> Option<usize> {
    if let Ok(n) = token.parse::<usize>() {
        return (n <= 7).then_some(n);
    }
    let upper = token.to_ascii_uppercase();
    WEEKDAYS.iter().position(|name| *name == upper)
}

impl FromStr for CronExpression {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CronExpression {
    type Error = CronError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CronExpression> for String {
    fn from(value: CronExpression) -> Self {
        value.source
    }
}

impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CronExpression {}

impl fmt::Debug for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronExpression").field(&self.source).finish()
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
