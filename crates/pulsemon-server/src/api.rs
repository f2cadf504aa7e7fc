//! HTTP intake and read-only status endpoints.
//!
//! The ping endpoints mirror the public URL scheme monitored jobs curl:
//! `/ping/{id}`, `/ping/{id}/start|fail|log`, and `/ping/{id}/{exit}`
//! where a nonzero exit status reports a failure. All of them answer a
//! bare `200 OK` so even `curl -fsS` in a minimal cron line works.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use pulsemon_alert::resolve;
use pulsemon_common::types::PingKind;

use crate::ping::{record_ping, PingMeta};
use crate::state::{check_state, AppState};

/// Largest accepted ping body. Anything larger is cut off by axum.
const MAX_BODY_BYTES: usize = 100 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping/{code}", any(ping_success))
        .route("/ping/{code}/start", any(ping_start))
        .route("/ping/{code}/fail", any(ping_fail))
        .route("/ping/{code}/log", any(ping_log))
        .route("/ping/{code}/{exit_status}", any(ping_exit))
        .route("/api/v1/checks/{code}", get(get_check).delete(delete_check))
        .route("/api/v1/checks/{code}/flips", get(get_flips))
        .route("/api/v1/checks/{code}/pause", post(pause_check))
        .route("/api/v1/checks/{code}/resume", post(resume_check))
        .route("/badge/{badge_key}", get(badge))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

fn meta_from_request(
    addr: SocketAddr,
    method: &Method,
    headers: &HeaderMap,
    exit_status: Option<i64>,
) -> PingMeta {
    PingMeta {
        scheme: "http".to_string(),
        remote_addr: addr.ip().to_string(),
        method: method.to_string(),
        ua: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        exit_status,
        rid: headers
            .get("x-run-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        subject: None,
    }
}

async fn handle_ping(
    state: AppState,
    code: String,
    kind: PingKind,
    exit_status: Option<i64>,
    addr: SocketAddr,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let check = match state.store.get_check(&code).await {
        Ok(Some(check)) => check,
        Ok(None) => return (StatusCode::NOT_FOUND, "not found"),
        Err(e) => {
            tracing::error!(error = %e, "Check lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "error");
        }
    };

    let meta = meta_from_request(addr, &method, &headers, exit_status);
    match record_ping(
        &state.store,
        &state.body_store,
        &check,
        kind,
        meta,
        &body,
        Utc::now(),
    )
    .await
    {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(e) => {
            tracing::error!(check = %check.id, error = %e, "Ping intake failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "error")
        }
    }
}

async fn ping_success(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    handle_ping(state, code, PingKind::Success, None, addr, method, headers, body).await
}

async fn ping_start(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    handle_ping(state, code, PingKind::Start, None, addr, method, headers, body).await
}

async fn ping_fail(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    handle_ping(state, code, PingKind::Fail, None, addr, method, headers, body).await
}

async fn ping_log(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    handle_ping(state, code, PingKind::Log, None, addr, method, headers, body).await
}

/// `/ping/{code}/{exit_status}`: exit 0 reports success, anything else a
/// failure, with the exit code stored either way.
async fn ping_exit(
    State(state): State<AppState>,
    Path((code, exit_status)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let Ok(exit_status) = exit_status.parse::<u8>() else {
        return (StatusCode::NOT_FOUND, "not found");
    };
    let kind = if exit_status == 0 {
        PingKind::Success
    } else {
        PingKind::Fail
    };
    handle_ping(
        state,
        code,
        kind,
        Some(exit_status as i64),
        addr,
        method,
        headers,
        body,
    )
    .await
}

async fn get_check(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let check = state
        .store
        .get_check(&code)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let display = check_state(&check)
        .and_then(|s| resolve(&s, Utc::now()))
        .map(|r| r.display.to_string())
        .unwrap_or_else(|_| "paused".to_string());

    Ok(Json(json!({
        "id": check.id,
        "name": check.name,
        "kind": check.kind.to_string(),
        "status": display,
        "grace_secs": check.grace_secs,
        "n_pings": check.n_pings,
        "last_ping": check.last_ping,
        "last_duration_secs": check.last_duration_secs,
        "alert_after": check.alert_after,
        "ping_url": format!("{}/{}", state.ping_endpoint.trim_end_matches('/'), check.id),
    })))
}

/// Delete a check, its owned pings/flips/notifications, and any
/// offloaded ping bodies. Attached channels survive; they are shared
/// across the project.
async fn delete_check(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<&'static str, StatusCode> {
    let deleted = state
        .store
        .delete_check(&code)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if !deleted {
        return Err(StatusCode::NOT_FOUND);
    }

    if let Err(e) = state.body_store.remove_check(&code) {
        tracing::warn!(check = %code, error = %e, "Failed to remove stored ping bodies");
    }
    Ok("OK")
}

async fn get_flips(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let check = state
        .store
        .get_check(&code)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let flips = state
        .store
        .flips_for_check(&check.id, 100)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let items: Vec<serde_json::Value> = flips
        .iter()
        .map(|f| {
            json!({
                "timestamp": f.created,
                "up": f.new_status == pulsemon_common::types::CheckStatus::Up,
                "reason": f.reason.to_string(),
                "processed": f.processed,
            })
        })
        .collect();
    Ok(Json(json!({ "flips": items })))
}

async fn pause_check(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<&'static str, StatusCode> {
    let paused = state
        .store
        .pause_check(&code)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if paused {
        Ok("OK")
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// Bring a manually-resumed check back up. Recomputes the alert deadline
/// from the ping history so the alerting loop picks it up again.
async fn resume_check(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<&'static str, StatusCode> {
    let now = Utc::now();
    let resumed = state
        .store
        .resume_check(&code, now)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if !resumed {
        return Err(StatusCode::CONFLICT);
    }

    if let Ok(Some(check)) = state.store.get_check(&code).await {
        let alert_after = check_state(&check)
            .and_then(|s| resolve(&s, now))
            .map(|r| r.alert_after)
            .unwrap_or(None);
        let _ = state
            .store
            .update_alert_after(&check.id, check.status, alert_after)
            .await;
    }
    Ok("OK")
}

/// Read-only status by badge fingerprint, for embedding.
async fn badge(
    State(state): State<AppState>,
    Path(badge_key): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let check = state
        .store
        .get_check_by_badge(&badge_key)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let display = check_state(&check)
        .and_then(|s| resolve(&s, Utc::now()))
        .map(|r| r.display.to_string())
        .unwrap_or_else(|_| "paused".to_string());

    Ok(Json(json!({ "name": check.name, "status": display })))
}
