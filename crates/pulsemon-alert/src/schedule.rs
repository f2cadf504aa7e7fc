use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use pulsemon_common::types::ScheduleKind;

use crate::{CronExpr, OnCalendarExpr, ScheduleError};

/// A check's schedule descriptor, parsed once per check load.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Expect a ping every `timeout`; timezone-independent.
    Simple { timeout: Duration },
    /// Five-field cron expression evaluated in `tz`.
    Cron { expr: CronExpr, tz: Tz },
    /// systemd OnCalendar expression evaluated in `tz`.
    OnCalendar { expr: OnCalendarExpr, tz: Tz },
}

impl Schedule {
    pub fn parse(
        kind: ScheduleKind,
        timeout_secs: i64,
        expr: &str,
        tz: &str,
    ) -> Result<Self, ScheduleError> {
        match kind {
            ScheduleKind::Simple => {
                if timeout_secs <= 0 {
                    return Err(ScheduleError::InvalidTimeout(timeout_secs));
                }
                Ok(Schedule::Simple {
                    timeout: Duration::seconds(timeout_secs),
                })
            }
            ScheduleKind::Cron => Ok(Schedule::Cron {
                expr: CronExpr::parse(expr)?,
                tz: parse_tz(tz)?,
            }),
            ScheduleKind::OnCalendar => Ok(Schedule::OnCalendar {
                expr: OnCalendarExpr::parse(expr)?,
                tz: parse_tz(tz)?,
            }),
        }
    }

    /// The instant the next ping is expected, strictly after `after`.
    pub fn next_expected(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match self {
            Schedule::Simple { timeout } => Ok(after + *timeout),
            Schedule::Cron { expr, tz } => expr.next_after(after, *tz),
            Schedule::OnCalendar { expr, tz } => expr.next_after(after, *tz),
        }
    }
}

fn parse_tz(tz: &str) -> Result<Tz, ScheduleError> {
    tz.parse()
        .map_err(|_| ScheduleError::InvalidTimezone(tz.to_string()))
}
