use chrono::{Duration, Utc};
use tempfile::TempDir;

use pulsemon_common::types::{CheckStatus, FlipReason, PingKind};
use pulsemon_common::PING_RETENTION;

use crate::store::{ChannelRow, CheckRow, FlipRow, NotificationRow, PingRow};
use crate::MonitorStore;

async fn setup() -> (TempDir, MonitorStore) {
    let dir = TempDir::new().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("monitor.db").display()
    );
    let store = MonitorStore::connect(&url).await.unwrap();
    (dir, store)
}

#[tokio::test]
async fn insert_and_get_check_roundtrips() {
    let (_dir, store) = setup().await;

    let mut row = CheckRow::new("proj-1", "db backup");
    row.manual_resume = true;
    row.failure_kw = "ERROR".into();
    store.insert_check(&row).await.unwrap();

    let got = store.get_check(&row.id).await.unwrap().unwrap();
    assert_eq!(got.name, "db backup");
    assert_eq!(got.status, CheckStatus::New);
    assert!(got.manual_resume);
    assert_eq!(got.failure_kw, "ERROR");

    let by_badge = store.get_check_by_badge(&row.badge_key).await.unwrap();
    assert_eq!(by_badge.unwrap().id, row.id);
}

#[tokio::test]
async fn next_due_check_skips_down_and_future_deadlines() {
    let (_dir, store) = setup().await;
    let now = Utc::now();

    let mut due = CheckRow::new("p", "due");
    due.status = CheckStatus::Up;
    due.alert_after = Some(now - Duration::seconds(5));
    store.insert_check(&due).await.unwrap();

    let mut not_yet = CheckRow::new("p", "not yet");
    not_yet.status = CheckStatus::Up;
    not_yet.alert_after = Some(now + Duration::hours(1));
    store.insert_check(&not_yet).await.unwrap();

    let mut down = CheckRow::new("p", "down");
    down.status = CheckStatus::Down;
    down.alert_after = Some(now - Duration::hours(2));
    store.insert_check(&down).await.unwrap();

    let got = store.next_due_check(now).await.unwrap().unwrap();
    assert_eq!(got.id, due.id);
}

#[tokio::test]
async fn transition_check_is_compare_and_set() {
    let (_dir, store) = setup().await;
    let now = Utc::now();

    let mut row = CheckRow::new("p", "c");
    row.status = CheckStatus::Up;
    store.insert_check(&row).await.unwrap();

    // Wrong observed status: nothing happens, no flip is recorded.
    let flip = FlipRow::new(&row.id, CheckStatus::Paused, CheckStatus::Down, FlipReason::Timeout, now);
    let won = store
        .transition_check(&row.id, CheckStatus::Paused, CheckStatus::Down, None, &flip)
        .await
        .unwrap();
    assert!(!won);
    assert!(store.flips_for_check(&row.id, 10).await.unwrap().is_empty());

    // Correct observed status: status flips and the flip row lands.
    let flip = FlipRow::new(&row.id, CheckStatus::Up, CheckStatus::Down, FlipReason::Timeout, now);
    let won = store
        .transition_check(&row.id, CheckStatus::Up, CheckStatus::Down, None, &flip)
        .await
        .unwrap();
    assert!(won);

    let got = store.get_check(&row.id).await.unwrap().unwrap();
    assert_eq!(got.status, CheckStatus::Down);
    assert_eq!(got.alert_after, None);

    let flips = store.flips_for_check(&row.id, 10).await.unwrap();
    assert_eq!(flips.len(), 1);
    assert_eq!(flips[0].reason, FlipReason::Timeout);
}

#[tokio::test]
async fn claim_next_flip_is_at_most_once() {
    let (_dir, store) = setup().await;
    let now = Utc::now();

    let check = CheckRow::new("p", "c");
    store.insert_check(&check).await.unwrap();
    let flip = FlipRow::new(&check.id, CheckStatus::Up, CheckStatus::Down, FlipReason::Timeout, now);
    store.insert_flip(&flip).await.unwrap();

    let first = store.claim_next_flip(now).await.unwrap();
    assert_eq!(first.unwrap().id, flip.id);

    let second = store.claim_next_flip(now).await.unwrap();
    assert!(second.is_none());
    assert_eq!(store.count_unprocessed_flips().await.unwrap(), 0);
}

#[tokio::test]
async fn claim_next_flip_returns_oldest_first() {
    let (_dir, store) = setup().await;
    let now = Utc::now();

    let check = CheckRow::new("p", "c");
    store.insert_check(&check).await.unwrap();

    let newer = FlipRow::new(&check.id, CheckStatus::Down, CheckStatus::Up, FlipReason::None, now);
    store.insert_flip(&newer).await.unwrap();
    let older = FlipRow::new(
        &check.id,
        CheckStatus::Up,
        CheckStatus::Down,
        FlipReason::Timeout,
        now - Duration::minutes(5),
    );
    store.insert_flip(&older).await.unwrap();

    let got = store.claim_next_flip(now).await.unwrap().unwrap();
    assert_eq!(got.id, older.id);
}

#[tokio::test]
async fn last_down_event_ignores_notifications() {
    // The nag predicate keys off flips with reason=nag or the initial
    // down transition. Down notifications must not influence it: a nag
    // notification is itself a down notification, and consulting that
    // table would block every nag after the first.
    let (_dir, store) = setup().await;
    let now = Utc::now();

    let check = CheckRow::new("p", "c");
    store.insert_check(&check).await.unwrap();
    let channel = ChannelRow::new("p", "webhook", "{}");
    store.insert_channel(&channel).await.unwrap();

    let went_down = FlipRow::new(
        &check.id,
        CheckStatus::Up,
        CheckStatus::Down,
        FlipReason::Timeout,
        now - Duration::hours(3),
    );
    store.insert_flip(&went_down).await.unwrap();

    // A pile of recent down notifications, as a busy dispatcher leaves.
    for _ in 0..3 {
        let n = NotificationRow::new(&check.id, &channel.id, CheckStatus::Down, now);
        store.insert_notification(&n).await.unwrap();
    }

    let got = store.last_down_event(&check.id).await.unwrap().unwrap();
    assert_eq!(got.id, went_down.id);

    // After a nag, the nag becomes the reference event.
    let nag = FlipRow::new(
        &check.id,
        CheckStatus::Down,
        CheckStatus::Down,
        FlipReason::Nag,
        now - Duration::hours(1),
    );
    store.insert_flip(&nag).await.unwrap();

    let got = store.last_down_event(&check.id).await.unwrap().unwrap();
    assert_eq!(got.id, nag.id);

    // A down->up recovery flip is neither a nag nor a down transition.
    let recovered = FlipRow::new(
        &check.id,
        CheckStatus::Down,
        CheckStatus::Up,
        FlipReason::None,
        now - Duration::minutes(5),
    );
    store.insert_flip(&recovered).await.unwrap();

    let got = store.last_down_event(&check.id).await.unwrap().unwrap();
    assert_eq!(got.id, nag.id);
}

#[tokio::test]
async fn commit_ping_updates_check_and_prunes_history() {
    let (_dir, store) = setup().await;
    let mut check = CheckRow::new("p", "c");
    store.insert_check(&check).await.unwrap();

    let total = PING_RETENTION as i64 + 10;
    for n in 1..=total {
        let created = Utc::now();
        check.n_pings = n;
        check.status = CheckStatus::Up;
        check.last_ping = Some(created);
        let ping = PingRow::new(&check.id, n, PingKind::Success, created);
        store.commit_ping(&check, &ping, None).await.unwrap();
    }

    let got = store.get_check(&check.id).await.unwrap().unwrap();
    assert_eq!(got.n_pings, total);
    assert_eq!(got.status, CheckStatus::Up);

    let pings = store.list_pings(&check.id, 1000).await.unwrap();
    assert_eq!(pings.len(), PING_RETENTION as usize);
    assert_eq!(pings[0].n, total);

    let latest = store.latest_ping(&check.id).await.unwrap().unwrap();
    assert_eq!(latest.n, total);
}

#[tokio::test]
async fn attach_channel_is_idempotent() {
    let (_dir, store) = setup().await;
    let check = CheckRow::new("p", "c");
    store.insert_check(&check).await.unwrap();
    let channel = ChannelRow::new("p", "email", "{}");
    store.insert_channel(&channel).await.unwrap();

    store.attach_channel(&check.id, &channel.id).await.unwrap();
    store.attach_channel(&check.id, &channel.id).await.unwrap();

    let got = store.channels_for_check(&check.id).await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].id, channel.id);
}

#[tokio::test]
async fn record_notify_failure_can_disable_channel() {
    let (_dir, store) = setup().await;
    let channel = ChannelRow::new("p", "webhook", "{}");
    store.insert_channel(&channel).await.unwrap();

    store
        .record_notify_failure(&channel.id, "connection timed out", false)
        .await
        .unwrap();
    let got = store.get_channel(&channel.id).await.unwrap().unwrap();
    assert!(!got.disabled);
    assert_eq!(got.last_error, "connection timed out");

    store
        .record_notify_failure(&channel.id, "410 Gone", true)
        .await
        .unwrap();
    let got = store.get_channel(&channel.id).await.unwrap().unwrap();
    assert!(got.disabled);
}

#[tokio::test]
async fn prune_expired_flips_honors_retention() {
    let (_dir, store) = setup().await;
    let now = Utc::now();
    let check = CheckRow::new("p", "c");
    store.insert_check(&check).await.unwrap();

    let ancient = FlipRow::new(
        &check.id,
        CheckStatus::Up,
        CheckStatus::Down,
        FlipReason::Timeout,
        now - Duration::days(100),
    );
    store.insert_flip(&ancient).await.unwrap();
    let recent = FlipRow::new(
        &check.id,
        CheckStatus::Down,
        CheckStatus::Up,
        FlipReason::None,
        now - Duration::days(10),
    );
    store.insert_flip(&recent).await.unwrap();

    let removed = store.prune_expired_flips(now).await.unwrap();
    assert_eq!(removed, 1);

    let left = store.flips_for_check(&check.id, 10).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, recent.id);
}

#[tokio::test]
async fn delete_check_cascades_but_spares_channels() {
    let (_dir, store) = setup().await;
    let now = Utc::now();

    let mut check = CheckRow::new("p", "doomed");
    check.status = CheckStatus::Up;
    check.n_pings = 1;
    check.last_ping = Some(now);
    store.insert_check(&check).await.unwrap();

    let channel = ChannelRow::new("p", "webhook", "{}");
    store.insert_channel(&channel).await.unwrap();
    store.attach_channel(&check.id, &channel.id).await.unwrap();

    let ping = PingRow::new(&check.id, 1, PingKind::Success, now);
    store.commit_ping(&check, &ping, None).await.unwrap();
    let flip = FlipRow::new(&check.id, CheckStatus::Up, CheckStatus::Down, FlipReason::Timeout, now);
    store.insert_flip(&flip).await.unwrap();
    let notification = NotificationRow::new(&check.id, &channel.id, CheckStatus::Down, now);
    store.insert_notification(&notification).await.unwrap();

    assert!(store.delete_check(&check.id).await.unwrap());

    assert!(store.get_check(&check.id).await.unwrap().is_none());
    assert!(store.list_pings(&check.id, 10).await.unwrap().is_empty());
    assert!(store.flips_for_check(&check.id, 10).await.unwrap().is_empty());
    assert!(store
        .notifications_for_check(&check.id, 10)
        .await
        .unwrap()
        .is_empty());
    assert!(store.channels_for_check(&check.id).await.unwrap().is_empty());

    // The channel is shared project state and survives the cascade.
    assert!(store.get_channel(&channel.id).await.unwrap().is_some());

    // Deleting again reports nothing to delete.
    assert!(!store.delete_check(&check.id).await.unwrap());
}

#[tokio::test]
async fn resume_check_flips_down_to_up() {
    let (_dir, store) = setup().await;
    let now = Utc::now();
    let mut check = CheckRow::new("p", "c");
    check.status = CheckStatus::Down;
    check.manual_resume = true;
    store.insert_check(&check).await.unwrap();

    assert!(store.resume_check(&check.id, now).await.unwrap());
    let got = store.get_check(&check.id).await.unwrap().unwrap();
    assert_eq!(got.status, CheckStatus::Up);

    let flips = store.flips_for_check(&check.id, 10).await.unwrap();
    assert_eq!(flips.len(), 1);
    assert_eq!(flips[0].old_status, CheckStatus::Down);
    assert_eq!(flips[0].new_status, CheckStatus::Up);

    // Resuming an up check is a no-op.
    assert!(!store.resume_check(&check.id, now).await.unwrap());
}
