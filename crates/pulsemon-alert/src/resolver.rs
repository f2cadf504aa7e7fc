//! The status resolver: a pure function from check state and a reference
//! instant to a status label and the next alert deadline.

use chrono::{DateTime, Duration, Utc};

use pulsemon_common::types::{CheckStatus, DisplayStatus};

use crate::{Schedule, ScheduleError};

/// The slice of a check the resolver looks at. Built from a check row;
/// carries no connection to the store or the clock.
#[derive(Debug, Clone)]
pub struct CheckState {
    pub status: CheckStatus,
    pub n_pings: u64,
    pub last_ping: Option<DateTime<Utc>>,
    /// Set while a start ping awaits its matching success/fail.
    pub last_start: Option<DateTime<Utc>>,
    pub schedule: Schedule,
    pub grace: Duration,
}

/// Resolver output: the status to report, and when the alerting loop
/// must look at this check again (`None` when no deadline applies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub display: DisplayStatus,
    pub alert_after: Option<DateTime<Utc>>,
}

impl Resolution {
    fn fixed(display: DisplayStatus) -> Self {
        Self {
            display,
            alert_after: None,
        }
    }
}

/// Resolve the status of `state` as of `now`.
///
/// A stored `down` status is sticky: the check recovers only through the
/// ping intake or an explicit resume, never by the passage of time.
pub fn resolve(state: &CheckState, now: DateTime<Utc>) -> Result<Resolution, ScheduleError> {
    if state.status == CheckStatus::Paused {
        return Ok(Resolution::fixed(DisplayStatus::Paused));
    }
    if state.n_pings == 0 {
        return Ok(Resolution::fixed(DisplayStatus::New));
    }
    if state.status == CheckStatus::Down {
        return Ok(Resolution::fixed(DisplayStatus::Down));
    }

    // A running invocation measures from its start ping, regardless of
    // any later log pings.
    let running = state.last_start.is_some();
    let base = match state.last_start.or(state.last_ping) {
        Some(t) => t,
        // Only history (log) pings so far; no deadline applies.
        None => {
            let display = match state.status {
                CheckStatus::New => DisplayStatus::New,
                _ => DisplayStatus::Up,
            };
            return Ok(Resolution::fixed(display));
        }
    };

    let next = state.schedule.next_expected(base)?;
    let deadline = next + state.grace;

    if now >= deadline {
        return Ok(Resolution::fixed(DisplayStatus::Down));
    }

    let display = if running {
        DisplayStatus::Started
    } else if now >= next {
        DisplayStatus::Grace
    } else {
        DisplayStatus::Up
    };

    Ok(Resolution {
        display,
        alert_after: Some(deadline),
    })
}

/// The instant the check's state flips (or flipped) to down: next
/// expected ping plus grace, measured from the running start or the last
/// ping. Used as the `created` timestamp of timeout flips.
pub fn going_down_after(state: &CheckState) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    let base = match state.last_start.or(state.last_ping) {
        Some(t) => t,
        None => return Ok(None),
    };
    let next = state.schedule.next_expected(base)?;
    Ok(Some(next + state.grace))
}
