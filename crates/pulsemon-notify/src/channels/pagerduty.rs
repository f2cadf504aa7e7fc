use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use pulsemon_common::types::CheckStatus;
use pulsemon_storage::ChannelRow;

use crate::error::{NotifyError, Result};
use crate::plugin::TransportPlugin;
use crate::{Alert, Transport};

const EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

pub struct PagerDutyTransport {
    client: reqwest::Client,
    routing_key: String,
    events_url: String,
}

pub(crate) fn render_event(routing_key: &str, alert: &Alert) -> Value {
    let action = match alert.new_status {
        CheckStatus::Down => "trigger",
        _ => "resolve",
    };
    json!({
        "routing_key": routing_key,
        "event_action": action,
        // One incident per check; nags re-trigger the same incident.
        "dedup_key": alert.check_id,
        "payload": {
            "summary": format!("{} is {}", alert.check_name, alert.status_line()),
            "source": alert.check_url(),
            "severity": "error",
        },
    })
}

#[async_trait]
impl Transport for PagerDutyTransport {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.events_url)
            .json(&render_event(&self.routing_key, alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 400 from the events API means the routing key is bad; that
            // does not heal on its own.
            let permanent = status.as_u16() == 400;
            return Err(NotifyError::Api {
                service: "pagerduty".to_string(),
                status: status.as_u16(),
                body,
                permanent,
            });
        }
        Ok(())
    }

    fn kind(&self) -> &str {
        "pagerduty"
    }

    fn is_noop(&self, new_status: CheckStatus) -> bool {
        // Only up/down transitions map to trigger/resolve events.
        !matches!(new_status, CheckStatus::Up | CheckStatus::Down)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }
}

// Plugin

#[derive(Deserialize)]
struct PagerDutyValue {
    routing_key: String,
    events_url: Option<String>,
}

pub struct PagerDutyPlugin;

impl TransportPlugin for PagerDutyPlugin {
    fn kind(&self) -> &str {
        "pagerduty"
    }

    fn validate_value(&self, value: &Value) -> Result<()> {
        serde_json::from_value::<PagerDutyValue>(value.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("pagerduty value: {e}")))?;
        Ok(())
    }

    fn create(&self, channel: &ChannelRow) -> Result<Box<dyn Transport>> {
        let cfg: PagerDutyValue = serde_json::from_str(&channel.value)
            .map_err(|e| NotifyError::InvalidConfig(format!("pagerduty value: {e}")))?;
        Ok(Box::new(PagerDutyTransport {
            client: reqwest::Client::new(),
            routing_key: cfg.routing_key,
            events_url: cfg.events_url.unwrap_or_else(|| EVENTS_URL.to_string()),
        }))
    }
}
