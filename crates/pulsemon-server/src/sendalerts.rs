//! The alerting loop: detect deadline expiries, create flips, nag on
//! long-running outages, and drain the dispatch queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::time::sleep;

use pulsemon_alert::{going_down_after, resolve};
use pulsemon_common::types::{CheckStatus, FlipReason};
use pulsemon_notify::Dispatcher;
use pulsemon_storage::{FlipRow, MonitorStore};

use crate::state::check_state;

/// How long a check must stay down before the first repeat alert, and
/// the spacing between repeats.
const NAG_INTERVAL: Duration = Duration::hours(1);

/// Deferral applied when a check's schedule cannot be evaluated, so a
/// broken expression cannot put the loop into a tight failure cycle.
const BROKEN_SCHEDULE_DEFER: Duration = Duration::hours(1);

/// Process a single check whose alert deadline has passed.
///
/// Returns true when a check was handled and the caller should try again
/// immediately; false when no work was found.
pub async fn handle_going_down(store: &MonitorStore, now: DateTime<Utc>) -> Result<bool> {
    let Some(check) = store.next_due_check(now).await? else {
        return Ok(false);
    };
    let old = check.status;

    let resolved = check_state(&check).and_then(|state| {
        let resolution = resolve(&state, now)?;
        Ok((state, resolution))
    });
    let (state, resolution) = match resolved {
        Ok(pair) => pair,
        Err(e) => {
            // Malformed schedule: behave like a paused check (no alert),
            // but leave a deferred deadline so a fix gets picked up.
            tracing::error!(check = %check.id, error = %e, "Cannot evaluate schedule");
            store
                .update_alert_after(&check.id, old, Some(now + BROKEN_SCHEDULE_DEFER))
                .await?;
            return Ok(true);
        }
    };
    let label = resolution.display.stored();

    if label != CheckStatus::Down {
        // Not down yet (a ping moved the deadline); just reschedule.
        store
            .update_alert_after(&check.id, old, resolution.alert_after)
            .await?;
        return Ok(true);
    }

    // The flip is dated at the deadline that expired, not at the time the
    // loop noticed it.
    let flip_time = going_down_after(&state).ok().flatten().unwrap_or(now);
    let flip = FlipRow::new(&check.id, old, CheckStatus::Down, FlipReason::Timeout, flip_time);
    let won = store
        .transition_check(&check.id, old, CheckStatus::Down, None, &flip)
        .await?;
    if won {
        tracing::info!(check = %check.id, from = %old, "Check goes down");
    }
    // Losing the race just means a peer worker handled this check.
    Ok(true)
}

/// Create repeat-alert flips for checks that have stayed down.
///
/// The "is a nag due" decision looks at flips only: the newest
/// `reason=nag` flip, or the transition that started the down spell.
/// Consulting the notification table here would be self-referential (a
/// nag notification is a down notification) and would silently stop all
/// repeats after the first.
pub async fn handle_nags(store: &MonitorStore, now: DateTime<Utc>) -> Result<bool> {
    let mut inserted = false;
    for check in store.down_checks(None).await? {
        let Some(event) = store.last_down_event(&check.id).await? else {
            continue;
        };
        if now - event.created >= NAG_INTERVAL {
            let flip = FlipRow::new(
                &check.id,
                CheckStatus::Down,
                CheckStatus::Down,
                FlipReason::Nag,
                now,
            );
            store.insert_flip(&flip).await?;
            tracing::info!(check = %check.id, "Repeat notification queued");
            inserted = true;
        }
    }
    Ok(inserted)
}

/// The `sendalerts` daemon: C4 + C5 + dispatch, forever.
pub struct SendAlerts {
    store: Arc<MonitorStore>,
    dispatcher: Dispatcher,
    tick: std::time::Duration,
}

impl SendAlerts {
    pub fn new(store: Arc<MonitorStore>, dispatcher: Dispatcher, tick_secs: u64) -> Self {
        Self {
            store,
            dispatcher,
            tick: std::time::Duration::from_secs(tick_secs.max(1)),
        }
    }

    /// One full cycle: drain due checks, queue nags, dispatch flips.
    pub async fn tick_once(&self, now: DateTime<Utc>) -> Result<()> {
        while handle_going_down(&self.store, now).await? {}
        handle_nags(&self.store, now).await?;
        self.dispatcher.dispatch_pending(now).await?;
        Ok(())
    }

    /// Run until `shutdown` flips true. Storage failures back off
    /// exponentially (100 ms up to 30 s) instead of crashing the worker.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        tracing::info!(tick_secs = self.tick.as_secs(), "sendalerts is now running");

        let min_backoff = std::time::Duration::from_millis(100);
        let max_backoff = std::time::Duration::from_secs(30);
        let mut backoff = min_backoff;
        let mut last_prune = std::time::Instant::now();

        while !shutdown.load(Ordering::Relaxed) {
            match self.tick_once(Utc::now()).await {
                Ok(()) => {
                    backoff = min_backoff;
                    sleep(self.tick).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, backoff_ms = backoff.as_millis() as u64, "Alerting cycle failed");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
            }

            if last_prune.elapsed() >= std::time::Duration::from_secs(3600) {
                last_prune = std::time::Instant::now();
                match self.store.prune_expired_flips(Utc::now()).await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(removed, "Pruned expired flips")
                    }
                    Err(e) => tracing::error!(error = %e, "Flip pruning failed"),
                    _ => {}
                }
            }
        }

        tracing::info!("sendalerts stopped");
        Ok(())
    }
}
