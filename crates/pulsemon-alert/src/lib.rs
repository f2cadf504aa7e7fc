//! Schedule evaluation and status resolution for checks.
//!
//! This crate is pure: given a check's schedule descriptor, its ping
//! history fields, and a reference instant, it answers "when is the next
//! ping expected" and "what is the check's status right now". It never
//! touches the clock or the store, which keeps the entire monitoring
//! semantics coverable by table-driven tests.

mod expr;

pub mod cron;
pub mod oncalendar;
pub mod resolver;
pub mod schedule;


pub use cron::CronExpr;
pub use oncalendar::OnCalendarExpr;
pub use resolver::{going_down_after, resolve, CheckState, Resolution};
pub use schedule::Schedule;

/// Errors produced while parsing or evaluating a schedule.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The cron or OnCalendar expression is malformed or unsupported.
    #[error("invalid schedule expression: {0}")]
    InvalidExpression(String),

    /// The timezone string is not a known IANA zone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The check's timeout duration is zero or negative.
    #[error("invalid timeout: {0}s")]
    InvalidTimeout(i64),

    /// No matching instant exists within the bounded search window.
    #[error("no upcoming occurrence within the search window")]
    NoUpcomingOccurrence,
}
