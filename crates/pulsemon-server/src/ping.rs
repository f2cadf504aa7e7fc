//! The ping intake writer: classifies an incoming ping against the
//! check's filter policy, persists it, applies the status transition
//! rules, and recomputes the alert deadline.

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;

use pulsemon_alert::resolve;
use pulsemon_common::types::{CheckStatus, FlipReason, PingKind};
use pulsemon_common::MAX_INLINE_BODY;
use pulsemon_storage::{BodyStore, CheckRow, FlipRow, MonitorStore, PingRow};

use crate::state::check_state;

/// Source metadata for one ping.
#[derive(Debug, Clone, Default)]
pub struct PingMeta {
    pub scheme: String,
    pub remote_addr: String,
    pub method: String,
    pub ua: String,
    pub exit_status: Option<i64>,
    pub rid: Option<String>,
    /// Subject line, present for pings that arrived by email.
    pub subject: Option<String>,
}

/// Apply the check's filter policy and keyword classification.
///
/// A disallowed method or a failed regex filter turns the ping into
/// `ign`. Keyword lists reclassify plain success pings: failure keywords
/// win over success, success over start; when lists are configured and
/// nothing matches, the ping is ignored. Explicit start/fail/log pings
/// keep their kind.
pub fn classify_ping(check: &CheckRow, kind: PingKind, meta: &PingMeta, body: &str) -> PingKind {
    if !check.allowed_methods.is_empty() {
        let allowed = check
            .allowed_methods
            .split(',')
            .any(|m| m.trim().eq_ignore_ascii_case(&meta.method));
        if !allowed {
            return PingKind::Ign;
        }
    }

    if let Some(pattern) = &check.body_regex {
        if !regex_matches(pattern, body) {
            return PingKind::Ign;
        }
    }
    if let (Some(pattern), Some(subject)) = (&check.subject_regex, &meta.subject) {
        if !regex_matches(pattern, subject) {
            return PingKind::Ign;
        }
    }

    let has_keywords =
        !check.failure_kw.is_empty() || !check.success_kw.is_empty() || !check.start_kw.is_empty();
    if kind == PingKind::Success && has_keywords {
        let text = match &meta.subject {
            Some(subject) => format!("{subject}\n{body}"),
            None => body.to_string(),
        };
        if contains_keyword(&check.failure_kw, &text) {
            return PingKind::Fail;
        }
        if contains_keyword(&check.success_kw, &text) {
            return PingKind::Success;
        }
        if contains_keyword(&check.start_kw, &text) {
            return PingKind::Start;
        }
        return PingKind::Ign;
    }

    kind
}

fn regex_matches(pattern: &str, text: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Bad filter regex, ignoring ping");
            false
        }
    }
}

fn contains_keyword(csv: &str, text: &str) -> bool {
    csv.split(',')
        .map(str::trim)
        .filter(|kw| !kw.is_empty())
        .any(|kw| text.contains(kw))
}

/// Record one ping and apply its effects to the check.
///
/// Re-ingesting the same ping (same instant, kind, source, and run id)
/// returns the stored row without writing anything, so retried HTTP
/// requests cannot double-count or double-flip.
pub async fn record_ping(
    store: &MonitorStore,
    body_store: &BodyStore,
    check: &CheckRow,
    kind: PingKind,
    meta: PingMeta,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<PingRow> {
    let body_text = String::from_utf8_lossy(body);
    let kind = classify_ping(check, kind, &meta, &body_text);

    if let Some(latest) = store.latest_ping(&check.id).await? {
        if latest.created == now
            && latest.kind == kind
            && latest.remote_addr == meta.remote_addr
            && latest.rid == meta.rid
        {
            return Ok(latest);
        }
    }

    let n = check.n_pings + 1;
    let mut ping_row = PingRow::new(&check.id, n, kind, now);
    ping_row.scheme = meta.scheme;
    ping_row.remote_addr = meta.remote_addr;
    ping_row.method = meta.method;
    ping_row.ua = meta.ua;
    ping_row.exit_status = meta.exit_status;
    ping_row.rid = meta.rid;
    if !body.is_empty() {
        if body.len() <= MAX_INLINE_BODY {
            ping_row.body = Some(body_text.into_owned());
        } else {
            let (key, size) = body_store.put(&check.id, n, body)?;
            ping_row.object_key = Some(key);
            ping_row.object_size = Some(size);
        }
    }

    let mut updated = check.clone();
    updated.n_pings = n;
    let mut flip = None;

    match kind {
        PingKind::Success => {
            if let Some(start) = updated.last_start {
                updated.last_duration_secs = Some((now - start).num_seconds());
            }
            updated.last_start = None;
            updated.last_ping = Some(now);

            let old = updated.status;
            let stays_down = updated.manual_resume && old == CheckStatus::Down;
            if !stays_down && old != CheckStatus::Up {
                updated.status = CheckStatus::Up;
                flip = Some(FlipRow::new(
                    &check.id,
                    old,
                    CheckStatus::Up,
                    FlipReason::None,
                    now,
                ));
            }
        }
        PingKind::Start => {
            updated.last_start = Some(now);
            // A start ping is a live signal; new and paused checks wake
            // up (the resulting flip is not an incident and is never
            // notified).
            let old = updated.status;
            if matches!(old, CheckStatus::New | CheckStatus::Paused) {
                updated.status = CheckStatus::Up;
                flip = Some(FlipRow::new(
                    &check.id,
                    old,
                    CheckStatus::Up,
                    FlipReason::None,
                    now,
                ));
            }
        }
        PingKind::Fail => {
            updated.last_start = None;
            updated.last_ping = Some(now);
            let old = updated.status;
            if old != CheckStatus::Down {
                updated.status = CheckStatus::Down;
                flip = Some(FlipRow::new(
                    &check.id,
                    old,
                    CheckStatus::Down,
                    FlipReason::Fail,
                    now,
                ));
            }
        }
        PingKind::Log | PingKind::Ign => {}
    }

    updated.alert_after = match check_state(&updated).and_then(|s| resolve(&s, now)) {
        Ok(resolution) => resolution.alert_after,
        Err(e) => {
            tracing::warn!(check = %check.id, error = %e, "Schedule error; no alert scheduled");
            None
        }
    };

    store.commit_ping(&updated, &ping_row, flip.as_ref()).await?;

    tracing::debug!(
        check = %check.id,
        n,
        kind = %kind,
        status = %updated.status,
        "Ping recorded"
    );
    Ok(ping_row)
}
