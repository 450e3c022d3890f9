//! Five-field cron expressions, evaluated in UTC.
//!
//! Supported syntax per field: `*`, `N`, `A-B`, `*/S`, `A-B/S`, `N/S` and
//! comma-separated lists of those. Months and weekdays also accept
//! three-letter English names; weekday `7` is Sunday like `0`. When both
//! day-of-month and day-of-week are restricted a day matches if either does.

use super::job::JobError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use std::fmt;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// How far ahead `next_after` searches before giving up on an expression
/// that never matches (e.g. February 30th).
const MAX_SEARCH_YEARS: i32 = 5;

#[derive(Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Value of the first entry in `names`.
    names_offset: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    names_offset: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    names_offset: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day of month",
    min: 1,
    max: 31,
    names: &[],
    names_offset: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    names_offset: 1,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day of week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    names_offset: 0,
};

/// A parsed cron schedule.
#[derive(Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, JobError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(JobError::InvalidSchedule(format!(
                "expected 5 fields in '{}', found {}",
                expression,
                fields.len()
            )));
        }
        let invalid = |e: String| JobError::InvalidSchedule(format!("'{}': {}", expression, e));

        let mut days_of_week = parse_field(fields[4], DAY_OF_WEEK).map_err(invalid)?;
        // 7 is an alias for Sunday.
        if days_of_week & (1u64 << 7) != 0 {
            days_of_week = (days_of_week & !(1u64 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            minutes: parse_field(fields[0], MINUTE).map_err(invalid)?,
            hours: parse_field(fields[1], HOUR).map_err(invalid)?,
            days_of_month: parse_field(fields[2], DAY_OF_MONTH).map_err(invalid)?,
            months: parse_field(fields[3], MONTH).map_err(invalid)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether `time` (to the minute) is a fire time.
    pub fn matches(&self, time: DateTime<Utc>) -> bool {
        has(self.months, time.month())
            && self.day_matches(time.date_naive())
            && has(self.hours, time.hour())
            && has(self.minutes, time.minute())
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut time = after
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))?
            + Duration::minutes(1);
        let last_year = time.year() + MAX_SEARCH_YEARS;

        while time.year() <= last_year {
            if !has(self.months, time.month()) {
                let (year, month) = if time.month() == 12 {
                    (time.year() + 1, 1)
                } else {
                    (time.year(), time.month() + 1)
                };
                time = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
                continue;
            }
            if !self.day_matches(time.date_naive()) {
                let next_day = time.date_naive().succ_opt()?;
                time = next_day.and_hms_opt(0, 0, 0)?.and_utc();
                continue;
            }
            if !has(self.hours, time.hour()) {
                time = time.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !has(self.minutes, time.minute()) {
                time += Duration::minutes(1);
                continue;
            }
            return Some(time);
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = has(self.days_of_month, date.day());
        let dow = has(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CronSchedule({})", self.expression)
    }
}

fn has(set: u64, value: u32) -> bool {
    set & (1u64 << value) != 0
}

fn parse_field(field: &str, spec: FieldSpec) -> Result<u64, String> {
    let mut set = 0u64;
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{}' in {} field", step, spec.name))?;
                if step == 0 {
                    return Err(format!("zero step in {} field", spec.name));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, spec)?, parse_value(b, spec)?)
        } else {
            let value = parse_value(range, spec)?;
            // "N/S" means every S starting at N.
            (value, if step.is_some() { spec.max } else { value })
        };
        if start > end {
            return Err(format!("range {}-{} is reversed in {} field", start, end, spec.name));
        }

        let step = step.unwrap_or(1);
        let mut value = start;
        while value <= end {
            set |= 1u64 << value;
            match value.checked_add(step) {
                Some(next) => value = next,
                None => break,
            }
        }
    }
    Ok(set)
}

fn parse_value(token: &str, spec: FieldSpec) -> Result<u32, String> {
    let lower = token.to_ascii_lowercase();
    let value = match spec.names.iter().position(|name| *name == lower) {
        Some(index) => index as u32 + spec.names_offset,
        None => token
            .parse::<u32>()
            .map_err(|_| format!("invalid value '{}' in {} field", token, spec.name))?,
    };
    if value < spec.min || value > spec.max {
        return Err(format!(
            "value {} out of range {}-{} in {} field",
            value, spec.min, spec.max, spec.name
        ));
    }
    Ok(value)
}
