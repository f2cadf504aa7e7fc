use std::sync::Arc;

use chrono::Duration;

use pulsemon_alert::{CheckState, Schedule, ScheduleError};
use pulsemon_storage::{BodyStore, CheckRow, MonitorStore};

/// Shared handles for the HTTP intake handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MonitorStore>,
    pub body_store: Arc<BodyStore>,
    /// Base URL pings are addressed to, e.g. `https://hc.example.org/ping`.
    pub ping_endpoint: String,
}

/// Build the resolver's input from a check row. Parses the schedule; a
/// malformed expression surfaces as a `ScheduleError` and the caller
/// treats the check as paused (no alert is sent).
pub fn check_state(row: &CheckRow) -> Result<CheckState, ScheduleError> {
    let schedule = Schedule::parse(row.kind, row.timeout_secs, &row.schedule, &row.tz)?;
    Ok(CheckState {
        status: row.status,
        n_pings: row.n_pings.max(0) as u64,
        last_ping: row.last_ping,
        last_start: row.last_start,
        schedule,
        grace: Duration::seconds(row.grace_secs),
    })
}
