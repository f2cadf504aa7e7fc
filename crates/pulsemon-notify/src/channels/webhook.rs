use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use pulsemon_common::types::CheckStatus;
use pulsemon_storage::ChannelRow;

use crate::error::{NotifyError, Result};
use crate::plugin::TransportPlugin;
use crate::{Alert, Transport};

/// Plain HTTP callout. Separate URLs for down and up transitions; either
/// may be omitted, which makes that direction a no-op. `$NAME` and
/// `$STATUS` expand in both the URL and the body template.
pub struct WebhookTransport {
    client: reqwest::Client,
    url_down: Option<String>,
    url_up: Option<String>,
    body_template: Option<String>,
}

impl WebhookTransport {
    fn substitute(template: &str, alert: &Alert) -> String {
        template
            .replace("$NAME", &alert.check_name)
            .replace("$STATUS", &alert.status_line())
            .replace("$CHECK_ID", &alert.check_id)
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let url = match alert.new_status {
            CheckStatus::Down => self.url_down.as_deref(),
            _ => self.url_up.as_deref(),
        };
        let Some(url) = url else {
            return Ok(());
        };
        let url = Self::substitute(url, alert);

        let request = match &self.body_template {
            Some(template) => self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(Self::substitute(template, alert)),
            None => self.client.get(&url),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                service: "webhook".to_string(),
                status: status.as_u16(),
                body,
                // 410 is the provider telling us to stop calling.
                permanent: status.as_u16() == 410,
            });
        }
        Ok(())
    }

    fn kind(&self) -> &str {
        "webhook"
    }

    fn is_noop(&self, new_status: CheckStatus) -> bool {
        match new_status {
            CheckStatus::Down => self.url_down.is_none(),
            CheckStatus::Up => self.url_up.is_none(),
            _ => true,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}

// Plugin

#[derive(Deserialize)]
struct WebhookValue {
    url_down: Option<String>,
    url_up: Option<String>,
    body: Option<String>,
}

pub struct WebhookPlugin;

impl TransportPlugin for WebhookPlugin {
    fn kind(&self) -> &str {
        "webhook"
    }

    fn validate_value(&self, value: &Value) -> Result<()> {
        let cfg: WebhookValue = serde_json::from_value(value.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("webhook value: {e}")))?;
        if cfg.url_down.is_none() && cfg.url_up.is_none() {
            return Err(NotifyError::InvalidConfig(
                "webhook needs url_down or url_up".to_string(),
            ));
        }
        Ok(())
    }

    fn create(&self, channel: &ChannelRow) -> Result<Box<dyn Transport>> {
        let cfg: WebhookValue = serde_json::from_str(&channel.value)
            .map_err(|e| NotifyError::InvalidConfig(format!("webhook value: {e}")))?;
        Ok(Box::new(WebhookTransport {
            client: reqwest::Client::new(),
            url_down: cfg.url_down.filter(|u| !u.is_empty()),
            url_up: cfg.url_up.filter(|u| !u.is_empty()),
            body_template: cfg.body,
        }))
    }
}
