//! The dispatcher: drains unprocessed flips and fans each one out to its
//! check's channels with bounded concurrency.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use pulsemon_common::types::CheckStatus;
use pulsemon_storage::{BodyStore, ChannelRow, FlipRow, MonitorStore, NotificationRow};

use crate::error::NotifyError;
use crate::plugin::TransportRegistry;
use crate::{Alert, DownCheckSummary, PingSummary, Transport};

pub struct Dispatcher {
    store: Arc<MonitorStore>,
    body_store: Option<Arc<BodyStore>>,
    registry: Arc<TransportRegistry>,
    site_root: String,
    num_workers: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<MonitorStore>,
        registry: TransportRegistry,
        site_root: &str,
        num_workers: usize,
    ) -> Self {
        Self {
            store,
            body_store: None,
            registry: Arc::new(registry),
            site_root: site_root.to_string(),
            num_workers: num_workers.max(1),
        }
    }

    /// Attach the object store so transports that include ping content
    /// can read offloaded bodies.
    pub fn with_body_store(mut self, body_store: Arc<BodyStore>) -> Self {
        self.body_store = Some(body_store);
        self
    }

    /// Claim and dispatch every unprocessed flip. Claiming marks the flip
    /// processed first, so each flip is dispatched at most once even with
    /// peer workers running the same loop.
    pub async fn dispatch_pending(&self, now: DateTime<Utc>) -> Result<u32> {
        let mut dispatched = 0;
        while let Some(flip) = self.store.claim_next_flip(now).await? {
            if let Err(e) = self.dispatch_flip(&flip, now).await {
                tracing::error!(flip = %flip.id, error = %e, "Flip dispatch failed");
            }
            dispatched += 1;
        }
        Ok(dispatched)
    }

    async fn dispatch_flip(&self, flip: &FlipRow, now: DateTime<Utc>) -> Result<()> {
        // A new or paused check coming up is bookkeeping, not an incident.
        if flip.new_status == CheckStatus::Up
            && matches!(flip.old_status, CheckStatus::New | CheckStatus::Paused)
        {
            return Ok(());
        }

        let Some(check) = self.store.get_check(&flip.owner_id).await? else {
            // Owner deleted between flip insert and dispatch.
            return Ok(());
        };

        let mut selected: Vec<(ChannelRow, Arc<dyn Transport>)> = Vec::new();
        for channel in self.store.channels_for_check(&check.id).await? {
            if channel.disabled {
                continue;
            }
            match self.registry.create(&channel) {
                Ok(transport) => {
                    if !transport.is_noop(flip.new_status) {
                        selected.push((channel, Arc::from(transport)));
                    }
                }
                Err(e) => {
                    tracing::error!(
                        channel = %channel.id,
                        kind = %channel.kind,
                        error = %e,
                        "Skipping channel with bad configuration"
                    );
                }
            }
        }
        if selected.is_empty() {
            return Ok(());
        }
        order_by_response_time(&mut selected);

        let down_checks = if selected.iter().any(|(_, t)| t.wants_down_checks()) {
            self.collect_down_checks(&check.project_id, &check.id).await?
        } else {
            Vec::new()
        };
        let last_ping = if selected.iter().any(|(_, t)| t.wants_last_ping()) {
            self.load_last_ping(&check.id).await?
        } else {
            None
        };

        let alert = Alert {
            check_id: check.id.clone(),
            check_name: check.name.clone(),
            project_id: check.project_id.clone(),
            old_status: flip.old_status,
            new_status: flip.new_status,
            reason: flip.reason,
            created: flip.created,
            repeat: flip.is_nag(),
            site_root: self.site_root.clone(),
            last_ping,
            down_checks,
        };

        tracing::info!(
            check = %check.id,
            status = %alert.status_line(),
            channels = selected.len(),
            "Dispatching flip"
        );

        let semaphore = Arc::new(Semaphore::new(self.num_workers));
        let mut tasks = JoinSet::new();
        for (channel, transport) in selected {
            let permit = semaphore.clone().acquire_owned().await?;
            let store = self.store.clone();
            let alert = alert.clone();
            tasks.spawn(async move {
                deliver_one(&store, &channel, transport.as_ref(), &alert, now).await;
                drop(permit);
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Notification task panicked");
            }
        }

        Ok(())
    }

    async fn collect_down_checks(
        &self,
        project_id: &str,
        exclude: &str,
    ) -> Result<Vec<DownCheckSummary>> {
        let mut out = Vec::new();
        for c in self.store.down_checks(Some(project_id)).await? {
            if c.id == exclude {
                continue;
            }
            let down_since = self.store.last_down_event(&c.id).await?.map(|f| f.created);
            out.push(DownCheckSummary {
                name: c.name,
                down_since,
            });
        }
        Ok(out)
    }

    async fn load_last_ping(&self, check_id: &str) -> Result<Option<PingSummary>> {
        let Some(ping) = self.store.latest_ping(check_id).await? else {
            return Ok(None);
        };
        let body = match (&ping.body, &ping.object_key, &self.body_store) {
            (Some(inline), _, _) => Some(inline.clone()),
            (None, Some(key), Some(body_store)) => body_store
                .get(key)?
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            _ => None,
        };
        Ok(Some(PingSummary {
            kind: ping.kind,
            created: ping.created,
            exit_status: ping.exit_status,
            body,
        }))
    }
}

/// Fastest-responding transports go first so slow integrations cannot
/// delay fast ones. Channels that have never delivered sort ahead.
pub(crate) fn order_by_response_time(selected: &mut [(ChannelRow, Arc<dyn Transport>)]) {
    selected.sort_by_key(|(ch, _)| ch.last_notify_duration_ms.unwrap_or(-1));
}

/// One delivery attempt against one channel. The notification row is
/// created before the transport call so a crash mid-send still leaves an
/// audit trail.
async fn deliver_one(
    store: &MonitorStore,
    channel: &ChannelRow,
    transport: &dyn Transport,
    alert: &Alert,
    now: DateTime<Utc>,
) {
    let notification = NotificationRow::new(&alert.check_id, &channel.id, alert.new_status, now);
    if let Err(e) = store.insert_notification(&notification).await {
        tracing::error!(channel = %channel.id, error = %e, "Failed to create notification row");
        return;
    }

    let started = Instant::now();
    let outcome = tokio::time::timeout(transport.timeout(), transport.notify(alert)).await;
    let elapsed_ms = started.elapsed().as_millis() as i64;

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(_) => Some(NotifyError::Timeout(transport.timeout())),
    };

    match error {
        None => {
            if let Err(e) = store
                .record_notify_success(&channel.id, Utc::now(), elapsed_ms)
                .await
            {
                tracing::error!(channel = %channel.id, error = %e, "Failed to record delivery");
            }
            let _ = store.set_notification_error(&notification.id, "").await;
            tracing::info!(
                channel = %channel.id,
                kind = transport.kind(),
                elapsed_ms,
                "Notification delivered"
            );
        }
        Some(err) => {
            let permanent = err.permanent();
            let message = err.to_string();
            if let Err(e) = store
                .record_notify_failure(&channel.id, &message, permanent)
                .await
            {
                tracing::error!(channel = %channel.id, error = %e, "Failed to record delivery error");
            }
            let _ = store.set_notification_error(&notification.id, &message).await;
            tracing::error!(
                channel = %channel.id,
                kind = transport.kind(),
                elapsed_ms,
                permanent,
                error = %message,
                "Notification failed"
            );
        }
    }
}
