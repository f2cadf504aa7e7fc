//! Periodic project summary emails (`sendreports`). Shares the status
//! resolver with the alerting loop, so reports and alerts can never
//! disagree about a check's state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::time::sleep;

use pulsemon_alert::resolve;
use pulsemon_notify::channels::email::SmtpSettings;
use pulsemon_storage::{CheckRow, MonitorStore};

use crate::state::check_state;

pub struct Reporter {
    store: Arc<MonitorStore>,
    smtp: SmtpSettings,
    recipients: Vec<String>,
}

impl Reporter {
    pub fn new(store: Arc<MonitorStore>, smtp: SmtpSettings, recipients: Vec<String>) -> Self {
        Self {
            store,
            smtp,
            recipients,
        }
    }

    /// Render and send one summary per project.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<()> {
        if self.recipients.is_empty() || self.smtp.host.is_empty() {
            tracing::info!("Reports disabled: no recipients or SMTP relay configured");
            return Ok(());
        }

        for project_id in self.store.project_ids().await? {
            let checks = self.store.list_checks(Some(&project_id)).await?;
            if checks.is_empty() {
                continue;
            }
            let body = render_report(&project_id, &checks, now);
            if let Err(e) = self.send(&project_id, body).await {
                tracing::error!(project = %project_id, error = %e, "Report delivery failed");
            } else {
                tracing::info!(project = %project_id, "Report sent");
            }
        }
        Ok(())
    }

    async fn send(&self, project_id: &str, body: String) -> Result<()> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp.host)?
            .port(self.smtp.port);
        if let (Some(user), Some(pass)) = (&self.smtp.username, &self.smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let transport = builder.build();

        for recipient in &self.recipients {
            let email = Message::builder()
                .from(self.smtp.from.parse()?)
                .to(recipient.parse()?)
                .subject(format!("[pulsemon] Status report for {project_id}"))
                .header(ContentType::TEXT_PLAIN)
                .body(body.clone())?;
            transport.send(email).await?;
        }
        Ok(())
    }

    /// Run forever at `interval_secs`, until `shutdown` flips true.
    pub async fn run_loop(&self, interval_secs: u64, shutdown: Arc<AtomicBool>) -> Result<()> {
        tracing::info!(interval_secs, "sendreports is now running");
        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.run_once(Utc::now()).await {
                tracing::error!(error = %e, "Report cycle failed");
            }
            sleep(std::time::Duration::from_secs(interval_secs.max(60))).await;
        }
        Ok(())
    }
}

/// Plain-text status table for one project.
pub fn render_report(project_id: &str, checks: &[CheckRow], now: DateTime<Utc>) -> String {
    let mut lines = vec![
        format!("Status report for project {project_id}"),
        format!("Generated {}", now.format("%Y-%m-%d %H:%M UTC")),
        String::new(),
    ];
    for check in checks {
        let display = check_state(check)
            .and_then(|state| resolve(&state, now))
            .map(|r| r.display.to_string())
            // An unevaluable schedule reads as paused, matching the
            // alerting loop.
            .unwrap_or_else(|_| "paused".to_string());
        let last_ping = check
            .last_ping
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        lines.push(format!("{:<30} {:<8} last ping {}", check.name, display, last_ping));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pulsemon_common::types::CheckStatus;

    #[test]
    fn report_renders_resolved_statuses() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();

        let mut up = CheckRow::new("p", "fresh backup");
        up.status = CheckStatus::Up;
        up.n_pings = 5;
        up.last_ping = Some(now - Duration::minutes(10));

        let mut down = CheckRow::new("p", "stale backup");
        down.status = CheckStatus::Down;
        down.n_pings = 9;
        down.last_ping = Some(now - Duration::days(3));

        let never = CheckRow::new("p", "unused");

        let report = render_report("p", &[up, down, never], now);
        assert!(report.contains("fresh backup"));
        assert!(report.contains("up"));
        assert!(report.contains("stale backup"));
        assert!(report.contains("down"));
        assert!(report.contains("never"));
    }

    #[test]
    fn broken_schedule_reads_as_paused() {
        let now = Utc::now();
        let mut check = CheckRow::new("p", "weird cron");
        check.kind = pulsemon_common::types::ScheduleKind::Cron;
        check.schedule = "not a cron line".into();
        check.n_pings = 1;
        check.last_ping = Some(now);
        check.status = CheckStatus::Up;

        let report = render_report("p", &[check], now);
        assert!(report.contains("paused"));
    }
}
