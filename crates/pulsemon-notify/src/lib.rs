//! Notification delivery with pluggable transport support.
//!
//! Status flips are fanned out to the channels attached to a check
//! through [`Transport`] implementations. Built-in transports cover
//! email (SMTP), webhooks, Slack, and PagerDuty; new kinds register in
//! the [`plugin::TransportRegistry`].

pub mod channels;
pub mod dispatch;
pub mod error;
pub mod plugin;

#[cfg(test)]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use pulsemon_common::types::{CheckStatus, FlipReason, PingKind};

pub use dispatch::Dispatcher;
pub use error::NotifyError;
pub use plugin::TransportRegistry;

/// The rendered payload handed to every transport for one flip.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub check_id: String,
    pub check_name: String,
    pub project_id: String,
    pub old_status: CheckStatus,
    pub new_status: CheckStatus,
    pub reason: FlipReason,
    pub created: DateTime<Utc>,
    /// True for nag flips; transports render "(repeat notification)".
    pub repeat: bool,
    pub site_root: String,
    /// Populated when a selected transport asked for it.
    pub last_ping: Option<PingSummary>,
    /// Other down checks in the same project, for summary payloads.
    pub down_checks: Vec<DownCheckSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingSummary {
    pub kind: PingKind,
    pub created: DateTime<Utc>,
    pub exit_status: Option<i64>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownCheckSummary {
    pub name: String,
    pub down_since: Option<DateTime<Utc>>,
}

impl Alert {
    /// Human-readable status phrase, e.g. `down (repeat notification)`.
    pub fn status_line(&self) -> String {
        if self.repeat {
            format!("{} (repeat notification)", self.new_status)
        } else {
            self.new_status.to_string()
        }
    }

    /// Dashboard link for the check.
    pub fn check_url(&self) -> String {
        format!("{}/checks/{}", self.site_root.trim_end_matches('/'), self.check_id)
    }
}

/// A notification transport: delivers one alert to the external service
/// a channel points at.
///
/// Implementations are created per channel row by the matching
/// [`plugin::TransportPlugin`]. Delivery errors carry a permanence flag;
/// permanent errors (revoked tokens, gone endpoints) disable the channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver the alert. The dispatcher records the returned error on
    /// both the channel and the notification row.
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// The channel kind this transport serves (e.g. `"webhook"`).
    fn kind(&self) -> &str;

    /// Transport-specific delivery filter: true means this transition is
    /// of no interest to the channel and no notification is attempted.
    /// Deterministic, no side effects.
    fn is_noop(&self, new_status: CheckStatus) -> bool {
        let _ = new_status;
        false
    }

    /// Per-call delivery timeout enforced by the dispatcher.
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Whether the payload should carry the other down checks in the
    /// project.
    fn wants_down_checks(&self) -> bool {
        false
    }

    /// Whether the payload should carry the check's most recent ping.
    fn wants_last_ping(&self) -> bool {
        false
    }
}
