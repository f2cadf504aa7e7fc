//! Five-field cron expressions (minute hour day-of-month month day-of-week).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::expr::{next_match, FieldSet};
use crate::ScheduleError;

const MONTH_NAMES: [(&str, u32); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

const DOW_NAMES: [(&str, u32); 7] = [
    ("sun", 0),
    ("mon", 1),
    ("tue", 2),
    ("wed", 3),
    ("thu", 4),
    ("fri", 5),
    ("sat", 6),
];

/// A parsed cron expression. Sunday may be written as 0 or 7.
#[derive(Debug, Clone)]
pub struct CronExpr {
    minutes: FieldSet,
    hours: FieldSet,
    dom: FieldSet,
    months: FieldSet,
    dow: FieldSet,
    seconds: FieldSet,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::InvalidExpression(format!(
                "expected 5 fields, got {}",
                fields.len()
            )));
        }

        Ok(Self {
            minutes: FieldSet::parse(fields[0], 0, 59, &[])?,
            hours: FieldSet::parse(fields[1], 0, 23, &[])?,
            dom: FieldSet::parse(fields[2], 1, 31, &[])?,
            months: FieldSet::parse(fields[3], 1, 12, &MONTH_NAMES)?,
            dow: FieldSet::parse(fields[4], 0, 7, &DOW_NAMES)?.remap(|v| v % 7),
            seconds: FieldSet::parse("0", 0, 59, &[])?,
        })
    }

    /// Conventional day-matching: when both day-of-month and day-of-week
    /// are restricted, a date qualifies if either matches; otherwise the
    /// restricted field (if any) must match.
    fn day_matches(&self, date: NaiveDate) -> bool {
        if !self.months.contains(date.month()) {
            return false;
        }
        let dom_ok = self.dom.contains(date.day());
        let dow_ok = self.dow.contains(date.weekday().num_days_from_sunday());
        match (self.dom.is_wildcard(), self.dow.is_wildcard()) {
            (true, true) => true,
            (false, false) => dom_ok || dow_ok,
            (false, true) => dom_ok,
            (true, false) => dow_ok,
        }
    }

    /// Least instant strictly after `after` matching this expression,
    /// evaluated in `tz`.
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>, ScheduleError> {
        next_match(
            tz,
            after,
            &|d| self.day_matches(d),
            &self.hours,
            &self.minutes,
            &self.seconds,
        )
    }
}
