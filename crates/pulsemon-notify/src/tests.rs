use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use pulsemon_common::types::{CheckStatus, FlipReason};
use pulsemon_storage::{ChannelRow, CheckRow, FlipRow, MonitorStore};

use crate::channels::email::{EmailPlugin, SmtpSettings};
use crate::channels::{pagerduty, slack};
use crate::dispatch::order_by_response_time;
use crate::error::NotifyError;
use crate::plugin::{TransportPlugin, TransportRegistry};
use crate::{Alert, Dispatcher, Transport};

fn make_alert(new_status: CheckStatus, repeat: bool) -> Alert {
    Alert {
        check_id: "c-1".into(),
        check_name: "db backup".into(),
        project_id: "p-1".into(),
        old_status: CheckStatus::Up,
        new_status,
        reason: if repeat { FlipReason::Nag } else { FlipReason::Timeout },
        created: Utc::now(),
        repeat,
        site_root: "https://pulsemon.example.org".into(),
        last_ping: None,
        down_checks: Vec::new(),
    }
}

// ── Registry ──

#[test]
fn registry_default_has_all_builtin_transports() {
    let registry = TransportRegistry::default();
    let mut kinds = registry.kinds();
    kinds.sort();
    assert_eq!(kinds, vec!["email", "pagerduty", "slack", "webhook"]);
}

#[test]
fn registry_unknown_kind_is_an_error() {
    let registry = TransportRegistry::default();
    let channel = ChannelRow::new("p", "carrier-pigeon", "{}");
    let err = registry.create(&channel).err().expect("unknown kind");
    assert!(matches!(err, NotifyError::UnknownKind(_)));
}

#[test]
fn webhook_value_needs_at_least_one_url() {
    let registry = TransportRegistry::default();
    let channel = ChannelRow::new("p", "webhook", "{}");
    assert!(registry.create(&channel).is_err());

    let channel = ChannelRow::new(
        "p",
        "webhook",
        &json!({"url_down": "https://example.org/hook"}).to_string(),
    );
    assert!(registry.create(&channel).is_ok());
}

#[test]
fn webhook_without_up_url_is_noop_for_up() {
    let registry = TransportRegistry::default();
    let channel = ChannelRow::new(
        "p",
        "webhook",
        &json!({"url_down": "https://example.org/hook"}).to_string(),
    );
    let transport = registry.create(&channel).unwrap();
    assert!(transport.is_noop(CheckStatus::Up));
    assert!(!transport.is_noop(CheckStatus::Down));
}

#[tokio::test]
async fn email_respects_direction_opt_outs() {
    let plugin = EmailPlugin::new(SmtpSettings {
        host: "smtp.example.org".into(),
        port: 587,
        username: None,
        password: None,
        from: "alerts@example.org".into(),
    });
    let channel = ChannelRow::new(
        "p",
        "email",
        &json!({"to": "ops@example.org", "up": false}).to_string(),
    );
    let transport = plugin.create(&channel).unwrap();
    assert!(transport.is_noop(CheckStatus::Up));
    assert!(!transport.is_noop(CheckStatus::Down));
}

// ── Payload rendering ──

#[test]
fn nag_alerts_carry_the_repeat_marker() {
    let alert = make_alert(CheckStatus::Down, true);
    assert_eq!(alert.status_line(), "down (repeat notification)");

    let alert = make_alert(CheckStatus::Down, false);
    assert_eq!(alert.status_line(), "down");
}

#[test]
fn slack_payload_lists_other_down_checks() {
    let mut alert = make_alert(CheckStatus::Down, false);
    alert.down_checks = vec![
        crate::DownCheckSummary {
            name: "nightly etl".into(),
            down_since: None,
        },
        crate::DownCheckSummary {
            name: "cert renewal".into(),
            down_since: Some(Utc::now()),
        },
    ];
    let payload = slack::render_payload(&alert);
    let text = payload.to_string();
    assert!(text.contains("db backup"));
    assert!(text.contains("nightly etl"));
    assert!(text.contains("cert renewal"));
}

#[test]
fn pagerduty_event_triggers_and_resolves() {
    let down = pagerduty::render_event("key-1", &make_alert(CheckStatus::Down, false));
    assert_eq!(down["event_action"], "trigger");
    assert_eq!(down["dedup_key"], "c-1");

    let up = pagerduty::render_event("key-1", &make_alert(CheckStatus::Up, false));
    assert_eq!(up["event_action"], "resolve");
}

#[test]
fn channel_ordering_puts_fast_and_untested_first() {
    struct Dummy;
    #[async_trait]
    impl Transport for Dummy {
        async fn notify(&self, _alert: &Alert) -> Result<(), NotifyError> {
            Ok(())
        }
        fn kind(&self) -> &str {
            "dummy"
        }
    }

    let mut slow = ChannelRow::new("p", "webhook", "{}");
    slow.last_notify_duration_ms = Some(4000);
    let mut fast = ChannelRow::new("p", "webhook", "{}");
    fast.last_notify_duration_ms = Some(120);
    let untested = ChannelRow::new("p", "webhook", "{}");

    let mut selected: Vec<(ChannelRow, Arc<dyn Transport>)> = vec![
        (slow.clone(), Arc::new(Dummy)),
        (fast.clone(), Arc::new(Dummy)),
        (untested.clone(), Arc::new(Dummy)),
    ];
    order_by_response_time(&mut selected);

    let order: Vec<&str> = selected.iter().map(|(c, _)| c.id.as_str()).collect();
    assert_eq!(order, vec![&untested.id, &fast.id, &slow.id]);
}

// ── Dispatcher against a real store ──

#[derive(Clone, Copy, PartialEq)]
enum MockMode {
    Ok,
    Transient,
    Permanent,
}

struct MockTransport {
    channel_id: String,
    mode: MockMode,
    noop_up: bool,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn notify(&self, _alert: &Alert) -> Result<(), NotifyError> {
        self.log.lock().unwrap().push(self.channel_id.clone());
        match self.mode {
            MockMode::Ok => Ok(()),
            MockMode::Transient => Err(NotifyError::Smtp("connection reset".into())),
            MockMode::Permanent => Err(NotifyError::Api {
                service: "mock".into(),
                status: 410,
                body: "gone".into(),
                permanent: true,
            }),
        }
    }

    fn kind(&self) -> &str {
        "mock"
    }

    fn is_noop(&self, new_status: CheckStatus) -> bool {
        self.noop_up && new_status == CheckStatus::Up
    }
}

struct MockPlugin {
    log: Arc<Mutex<Vec<String>>>,
}

impl TransportPlugin for MockPlugin {
    fn kind(&self) -> &str {
        "mock"
    }

    fn validate_value(&self, _value: &serde_json::Value) -> Result<(), NotifyError> {
        Ok(())
    }

    fn create(&self, channel: &ChannelRow) -> Result<Box<dyn Transport>, NotifyError> {
        let value: serde_json::Value = serde_json::from_str(&channel.value)?;
        let mode = match value["mode"].as_str() {
            Some("transient") => MockMode::Transient,
            Some("permanent") => MockMode::Permanent,
            _ => MockMode::Ok,
        };
        Ok(Box::new(MockTransport {
            channel_id: channel.id.clone(),
            mode,
            noop_up: value["noop_up"].as_bool().unwrap_or(false),
            log: self.log.clone(),
        }))
    }
}

struct Fixture {
    _dir: TempDir,
    store: Arc<MonitorStore>,
    dispatcher: Dispatcher,
    log: Arc<Mutex<Vec<String>>>,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("t.db").display());
    let store = Arc::new(MonitorStore::connect(&url).await.unwrap());
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = TransportRegistry::new();
    registry.register(Box::new(MockPlugin { log: log.clone() }));
    let dispatcher = Dispatcher::new(store.clone(), registry, "https://example.org", 4);
    Fixture {
        _dir: dir,
        store,
        dispatcher,
        log,
    }
}

async fn seed_check(store: &MonitorStore, value: serde_json::Value) -> (CheckRow, ChannelRow) {
    let check = CheckRow::new("p", "job");
    store.insert_check(&check).await.unwrap();
    let channel = ChannelRow::new("p", "mock", &value.to_string());
    store.insert_channel(&channel).await.unwrap();
    store.attach_channel(&check.id, &channel.id).await.unwrap();
    (check, channel)
}

#[tokio::test]
async fn flip_is_dispatched_at_most_once() {
    let f = fixture().await;
    let (check, channel) = seed_check(&f.store, json!({"mode": "ok"})).await;

    let now = Utc::now();
    let flip = FlipRow::new(&check.id, CheckStatus::Up, CheckStatus::Down, FlipReason::Timeout, now);
    f.store.insert_flip(&flip).await.unwrap();

    assert_eq!(f.dispatcher.dispatch_pending(now).await.unwrap(), 1);
    assert_eq!(f.dispatcher.dispatch_pending(now).await.unwrap(), 0);

    assert_eq!(f.log.lock().unwrap().len(), 1);
    let notifications = f.store.notifications_for_check(&check.id, 10).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].channel_id, channel.id);
    assert_eq!(notifications[0].error, "");
    assert_eq!(notifications[0].check_status, CheckStatus::Down);

    let got = f.store.get_channel(&channel.id).await.unwrap().unwrap();
    assert!(got.last_notify.is_some());
    assert!(got.last_error.is_empty());
}

#[tokio::test]
async fn permanent_error_disables_channel_for_later_flips() {
    let f = fixture().await;
    let (check, channel) = seed_check(&f.store, json!({"mode": "permanent"})).await;

    let now = Utc::now();
    let flip = FlipRow::new(&check.id, CheckStatus::Up, CheckStatus::Down, FlipReason::Timeout, now);
    f.store.insert_flip(&flip).await.unwrap();
    f.dispatcher.dispatch_pending(now).await.unwrap();

    let got = f.store.get_channel(&channel.id).await.unwrap().unwrap();
    assert!(got.disabled);
    assert!(got.last_error.contains("410"));

    // The next flip must not touch the disabled channel.
    let flip = FlipRow::new(&check.id, CheckStatus::Down, CheckStatus::Up, FlipReason::None, now);
    f.store.insert_flip(&flip).await.unwrap();
    f.dispatcher.dispatch_pending(now).await.unwrap();

    assert_eq!(f.log.lock().unwrap().len(), 1);
    let notifications = f.store.notifications_for_check(&check.id, 10).await.unwrap();
    assert_eq!(notifications.len(), 1);
}

#[tokio::test]
async fn transient_error_keeps_channel_enabled() {
    let f = fixture().await;
    let (check, channel) = seed_check(&f.store, json!({"mode": "transient"})).await;

    let now = Utc::now();
    let flip = FlipRow::new(&check.id, CheckStatus::Up, CheckStatus::Down, FlipReason::Timeout, now);
    f.store.insert_flip(&flip).await.unwrap();
    f.dispatcher.dispatch_pending(now).await.unwrap();

    let got = f.store.get_channel(&channel.id).await.unwrap().unwrap();
    assert!(!got.disabled);
    assert!(got.last_error.contains("connection reset"));

    let notifications = f.store.notifications_for_check(&check.id, 10).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].error.contains("connection reset"));
}

#[tokio::test]
async fn noop_transitions_are_filtered_before_delivery() {
    let f = fixture().await;
    let (check, _channel) = seed_check(&f.store, json!({"mode": "ok", "noop_up": true})).await;

    let now = Utc::now();
    let flip = FlipRow::new(&check.id, CheckStatus::Down, CheckStatus::Up, FlipReason::None, now);
    f.store.insert_flip(&flip).await.unwrap();

    // The flip is claimed (processed) but no notification is attempted.
    assert_eq!(f.dispatcher.dispatch_pending(now).await.unwrap(), 1);
    assert!(f.log.lock().unwrap().is_empty());
    let notifications = f.store.notifications_for_check(&check.id, 10).await.unwrap();
    assert!(notifications.is_empty());
    assert_eq!(f.store.count_unprocessed_flips().await.unwrap(), 0);
}
