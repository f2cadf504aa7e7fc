use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use pulsemon_storage::ChannelRow;

use crate::error::{NotifyError, Result};
use crate::plugin::TransportPlugin;
use crate::{Alert, Transport};

pub struct SlackTransport {
    client: reqwest::Client,
    webhook_url: String,
}

/// Incoming-webhook message body. Kept as a free function so the
/// rendering is testable without network.
pub(crate) fn render_payload(alert: &Alert) -> Value {
    let emoji = match alert.new_status {
        pulsemon_common::types::CheckStatus::Up => ":white_check_mark:",
        _ => ":red_circle:",
    };
    let mut blocks = vec![json!({
        "type": "section",
        "text": {
            "type": "mrkdwn",
            "text": format!(
                "{emoji} *<{}|{}>* is *{}*",
                alert.check_url(),
                alert.check_name,
                alert.status_line(),
            ),
        }
    })];

    if !alert.down_checks.is_empty() {
        let names: Vec<&str> = alert.down_checks.iter().map(|c| c.name.as_str()).collect();
        blocks.push(json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!("Also down in this project: {}", names.join(", ")),
            }]
        }));
    }

    json!({ "blocks": blocks })
}

#[async_trait]
impl Transport for SlackTransport {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&render_payload(alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Slack answers 403/404/410 when the webhook is revoked or
            // its channel is archived; those never recover.
            let permanent = matches!(status.as_u16(), 403 | 404 | 410);
            return Err(NotifyError::Api {
                service: "slack".to_string(),
                status: status.as_u16(),
                body,
                permanent,
            });
        }
        Ok(())
    }

    fn kind(&self) -> &str {
        "slack"
    }

    fn wants_down_checks(&self) -> bool {
        true
    }
}

// Plugin

#[derive(Deserialize)]
struct SlackValue {
    webhook_url: String,
}

pub struct SlackPlugin;

impl TransportPlugin for SlackPlugin {
    fn kind(&self) -> &str {
        "slack"
    }

    fn validate_value(&self, value: &Value) -> Result<()> {
        serde_json::from_value::<SlackValue>(value.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("slack value: {e}")))?;
        Ok(())
    }

    fn create(&self, channel: &ChannelRow) -> Result<Box<dyn Transport>> {
        let cfg: SlackValue = serde_json::from_str(&channel.value)
            .map_err(|e| NotifyError::InvalidConfig(format!("slack value: {e}")))?;
        Ok(Box::new(SlackTransport {
            client: reqwest::Client::new(),
            webhook_url: cfg.webhook_url,
        }))
    }
}
