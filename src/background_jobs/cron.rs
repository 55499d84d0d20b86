//! Five-field cron expressions (`minute hour day-of-month month day-of-week`).
//!
//! Supports `*`, single values, ranges `a-b`, lists `a,b`, steps `*/n` and
//! `a-b/n`, month names `jan..dec` and weekday names `sun..sat` (0 and 7 are
//! both Sunday). Day-of-month and day-of-week must both match.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How far ahead `next_after` looks before giving up.
const SEARCH_HORIZON_YEARS: i32 = 5;

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid cron expression '{expression}': {reason}")]
pub struct CronError {
    pub expression: String,
    pub reason: String,
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
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
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    names_offset: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: MONTH_NAMES,
    names_offset: 1,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: WEEKDAY_NAMES,
    names_offset: 0,
};

impl FieldSpec {
    fn value(&self, token: &str) -> Result<u32, String> {
        let lower = token.to_ascii_lowercase();
        if let Some(pos) = self.names.iter().position(|n| *n == lower) {
            return Ok(pos as u32 + self.names_offset);
        }
        let value: u32 = token
            .parse()
            .map_err(|_| format!("'{}' is not a valid {}", token, self.name))?;
        if value < self.min || value > self.max {
            return Err(format!(
                "{} {} out of range {}-{}",
                self.name, value, self.min, self.max
            ));
        }
        Ok(value)
    }

    /// Parses a field into a bitmask where bit `n` is set when value `n` matches.
    fn parse(&self, field: &str) -> Result<u64, String> {
        let mut mask = 0u64;
        for part in field.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step
                        .parse()
                        .map_err(|_| format!("invalid step '{}' in {}", step, self.name))?;
                    if step == 0 {
                        return Err(format!("step must be positive in {}", self.name));
                    }
                    (range, step)
                }
                None => (part, 1),
            };

            let (start, end) = if range == "*" {
                (self.min, self.max)
            } else if let Some((a, b)) = range.split_once('-') {
                (self.value(a)?, self.value(b)?)
            } else {
                let start = self.value(range)?;
                // `a/n` means "from a to the end, every n"
                if part.contains('/') {
                    (start, self.max)
                } else {
                    (start, start)
                }
            };
            if start > end {
                return Err(format!("empty range {}-{} in {}", start, end, self.name));
            }

            let mut value = start;
            while value <= end {
                mask |= 1 << value;
                match value.checked_add(step) {
                    Some(next) => value = next,
                    None => break,
                }
            }
        }
        Ok(mask)
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let error = |reason: String| CronError {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(error(format!("expected 5 fields, found {}", fields.len())));
        }

        let mut days_of_week = DAY_OF_WEEK.parse(fields[4]).map_err(error)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            minutes: MINUTE.parse(fields[0]).map_err(error)?,
            hours: HOUR.parse(fields[1]).map_err(error)?,
            days_of_month: DAY_OF_MONTH.parse(fields[2]).map_err(error)?,
            months: MONTH.parse(fields[3]).map_err(error)?,
            days_of_week,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        self.days_of_month & (1 << date.day()) != 0
            && self.days_of_week & (1 << date.weekday().num_days_from_sunday()) != 0
    }

    fn next_naive_after(&self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        let limit_year = start.year() + SEARCH_HORIZON_YEARS;
        let mut t = start;

        while t.year() <= limit_year {
            if self.months & (1 << t.month()) == 0 {
                let (year, month) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if self.hours & (1 << t.hour()) == 0 {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if self.minutes & (1 << t.minute()) == 0 {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    /// First matching minute strictly after `after`, in the same time zone.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let mut start = after
            .naive_local()
            .with_second(0)?
            .with_nanosecond(0)?
            + Duration::minutes(1);

        loop {
            let candidate = self.next_naive_after(start)?;
            // Local times skipped by a DST change don't exist; keep searching.
            match tz.from_local_datetime(&candidate).earliest() {
                Some(dt) if dt > *after => return Some(dt),
                _ => start = candidate + Duration::minutes(1),
            }
        }
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}
