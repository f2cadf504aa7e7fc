//! systemd OnCalendar expressions, the subset used by scheduled checks.
//!
//! Supported: the shortcut words (`minutely` .. `yearly`), an optional
//! weekday list (`Mon..Fri`, `Mon,Wed`), a date part with `*`/lists/`..`
//! ranges per component, and a time part `H:M[:S]` with `*`, lists,
//! ranges, and `/step`. Unlike cron, the weekday list and the date part
//! must both match.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::expr::{next_match, FieldSet};
use crate::ScheduleError;

const WEEKDAY_NAMES: [(&str, u32); 7] = [
    ("mon", 0),
    ("tue", 1),
    ("wed", 2),
    ("thu", 3),
    ("fri", 4),
    ("sat", 5),
    ("sun", 6),
];

#[derive(Debug, Clone)]
pub struct OnCalendarExpr {
    weekdays: FieldSet,
    years: FieldSet,
    months: FieldSet,
    days: FieldSet,
    hours: FieldSet,
    minutes: FieldSet,
    seconds: FieldSet,
}

impl OnCalendarExpr {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(ScheduleError::InvalidExpression("empty expression".into()));
        }
        if trimmed.contains('~') || trimmed.contains('@') {
            return Err(ScheduleError::InvalidExpression(format!(
                "unsupported construct in '{trimmed}'"
            )));
        }

        if let Some(expansion) = shortcut(trimmed) {
            return Self::parse(expansion);
        }

        let mut weekdays: Option<FieldSet> = None;
        let mut date: Option<(FieldSet, FieldSet, FieldSet)> = None;
        let mut time: Option<(FieldSet, FieldSet, FieldSet)> = None;

        for token in trimmed.split_whitespace() {
            if token.contains(':') {
                if time.is_some() {
                    return Err(ScheduleError::InvalidExpression(
                        "more than one time part".into(),
                    ));
                }
                time = Some(parse_time(token)?);
            } else if token.starts_with(|c: char| c.is_ascii_alphabetic()) {
                if weekdays.is_some() || date.is_some() || time.is_some() {
                    return Err(ScheduleError::InvalidExpression(format!(
                        "misplaced weekday list '{token}'"
                    )));
                }
                weekdays = Some(FieldSet::parse(token, 0, 6, &WEEKDAY_NAMES)?);
            } else {
                if date.is_some() || time.is_some() {
                    return Err(ScheduleError::InvalidExpression(format!(
                        "misplaced date part '{token}'"
                    )));
                }
                date = Some(parse_date(token)?);
            }
        }

        if weekdays.is_none() && date.is_none() && time.is_none() {
            return Err(ScheduleError::InvalidExpression(format!(
                "nothing to schedule in '{trimmed}'"
            )));
        }

        let (years, months, days) = date.unwrap_or_else(|| {
            (
                FieldSet::all(YEAR_MIN, YEAR_MAX),
                FieldSet::all(1, 12),
                FieldSet::all(1, 31),
            )
        });
        // Weekday-only expressions default to midnight, like systemd.
        let (hours, minutes, seconds) = match time {
            Some(t) => t,
            None => parse_time("00:00:00")?,
        };

        Ok(Self {
            weekdays: weekdays.unwrap_or_else(|| FieldSet::all(0, 6)),
            years,
            months,
            days,
            hours,
            minutes,
            seconds,
        })
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        self.years.contains(date.year() as u32)
            && self.months.contains(date.month())
            && self.days.contains(date.day())
            && self
                .weekdays
                .contains(date.weekday().num_days_from_monday())
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

const YEAR_MIN: u32 = 1970;
const YEAR_MAX: u32 = 2199;

fn shortcut(word: &str) -> Option<&'static str> {
    match word.to_ascii_lowercase().as_str() {
        "minutely" => Some("*-*-* *:*:00"),
        "hourly" => Some("*-*-* *:00:00"),
        "daily" => Some("*-*-* 00:00:00"),
        "weekly" => Some("Mon *-*-* 00:00:00"),
        "monthly" => Some("*-*-01 00:00:00"),
        "yearly" | "annually" => Some("*-01-01 00:00:00"),
        _ => None,
    }
}

/// `Y-M-D` or `M-D`; components use `..` for ranges because `-` is the
/// separator.
fn parse_date(token: &str) -> Result<(FieldSet, FieldSet, FieldSet), ScheduleError> {
    let parts: Vec<&str> = token.split('-').collect();
    let (y, m, d) = match parts.as_slice() {
        [y, m, d] => (*y, *m, *d),
        [m, d] => ("*", *m, *d),
        _ => {
            return Err(ScheduleError::InvalidExpression(format!(
                "unsupported date form '{token}'"
            )))
        }
    };
    Ok((
        FieldSet::parse(y, YEAR_MIN, YEAR_MAX, &[])?,
        FieldSet::parse(m, 1, 12, &[])?,
        FieldSet::parse(d, 1, 31, &[])?,
    ))
}

/// `H:M` or `H:M:S`; omitted seconds mean `:00`.
fn parse_time(token: &str) -> Result<(FieldSet, FieldSet, FieldSet), ScheduleError> {
    let parts: Vec<&str> = token.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [h, m] => (*h, *m, "0"),
        _ => {
            return Err(ScheduleError::InvalidExpression(format!(
                "unsupported time form '{token}'"
            )))
        }
    };
    Ok((
        FieldSet::parse(h, 0, 23, &[])?,
        FieldSet::parse(m, 0, 59, &[])?,
        FieldSet::parse(s, 0, 59, &[])?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn next(expr: &str, tz: &str, after: DateTime<Utc>) -> DateTime<Utc> {
        let tz: Tz = tz.parse().unwrap();
        OnCalendarExpr::parse(expr).unwrap().next_after(after, tz).unwrap()
    }

    #[test]
    fn daily_shortcut() {
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 8, 15, 0).unwrap();
        let got = next("daily", "UTC", after);
        assert_eq!(got, Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn weekday_list_with_time() {
        // Tue 2026-03-10; next Mon/Fri 18:00 is Fri 2026-03-13.
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        let got = next("Mon,Fri *-*-* 18:00", "UTC", after);
        assert_eq!(got, Utc.with_ymd_and_hms(2026, 3, 13, 18, 0, 0).unwrap());
    }

    #[test]
    fn weekday_range() {
        // Sat 2026-03-14 -> next Mon..Fri midnight is Mon 2026-03-16.
        let after = Utc.with_ymd_and_hms(2026, 3, 14, 1, 0, 0).unwrap();
        let got = next("Mon..Fri", "UTC", after);
        assert_eq!(got, Utc.with_ymd_and_hms(2026, 3, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn month_day_without_year() {
        let after = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 1).unwrap();
        let got = next("01-01 06:30", "UTC", after);
        assert_eq!(got, Utc.with_ymd_and_hms(2027, 1, 1, 6, 30, 0).unwrap());
    }

    #[test]
    fn minute_step() {
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 8, 17, 0).unwrap();
        let got = next("*-*-* *:0/20:00", "UTC", after);
        assert_eq!(got, Utc.with_ymd_and_hms(2026, 3, 10, 8, 20, 0).unwrap());
    }

    #[test]
    fn rejects_unsupported_forms() {
        assert!(OnCalendarExpr::parse("*-*~3").is_err());
        assert!(OnCalendarExpr::parse("").is_err());
        assert!(OnCalendarExpr::parse("12:00 Mon").is_err());
        assert!(OnCalendarExpr::parse("1-2-3-4 00:00").is_err());
    }

    #[test]
    fn time_is_evaluated_in_the_given_zone() {
        // 04:00 Riga (EET, UTC+2 in winter) is 02:00 UTC.
        let after = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let got = next("*-*-* 04:00", "Europe/Riga", after);
        assert_eq!(got, Utc.with_ymd_and_hms(2026, 1, 10, 2, 0, 0).unwrap());
    }
}
