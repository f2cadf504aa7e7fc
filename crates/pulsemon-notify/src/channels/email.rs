use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;

use pulsemon_common::types::CheckStatus;
use pulsemon_storage::ChannelRow;

use crate::error::{NotifyError, Result};
use crate::plugin::TransportPlugin;
use crate::{Alert, Transport};

/// Deployment-wide SMTP relay settings; the channel value only carries
/// the recipient and the up/down opt-outs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

pub struct EmailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    to: String,
    notify_up: bool,
    notify_down: bool,
    verified: bool,
}

impl EmailTransport {
    fn new(settings: &SmtpSettings, cfg: &EmailValue, verified: bool) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?
            .port(settings.port);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from: settings.from.clone(),
            to: cfg.to.clone(),
            notify_up: cfg.up,
            notify_down: cfg.down,
            verified,
        })
    }

    fn format_body(alert: &Alert) -> String {
        let mut lines = vec![
            format!("\"{}\" is {}.", alert.check_name, alert.status_line()),
            String::new(),
            format!("Details: {}", alert.check_url()),
        ];
        if let Some(ping) = &alert.last_ping {
            lines.push(String::new());
            lines.push(format!(
                "Last ping: {} at {}",
                ping.kind,
                ping.created.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            if let Some(code) = ping.exit_status {
                lines.push(format!("Exit status: {code}"));
            }
            if let Some(body) = &ping.body {
                lines.push(String::new());
                lines.push(body.clone());
            }
        }
        lines.join("\n")
    }
}

#[async_trait]
impl Transport for EmailTransport {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        if !self.verified {
            return Err(NotifyError::NotVerified);
        }

        let subject = format!(
            "[pulsemon] {} is {}",
            alert.check_name,
            alert.status_line().to_uppercase()
        );
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| NotifyError::InvalidConfig(format!("from address: {e}")))?,
            )
            .to(self
                .to
                .parse()
                .map_err(|e| NotifyError::InvalidConfig(format!("to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(Self::format_body(alert))
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        Ok(())
    }

    fn kind(&self) -> &str {
        "email"
    }

    fn is_noop(&self, new_status: CheckStatus) -> bool {
        match new_status {
            CheckStatus::Up => !self.notify_up,
            CheckStatus::Down => !self.notify_down,
            _ => false,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    fn wants_last_ping(&self) -> bool {
        true
    }
}

// Plugin

#[derive(Deserialize)]
struct EmailValue {
    to: String,
    #[serde(default = "default_true")]
    up: bool,
    #[serde(default = "default_true")]
    down: bool,
}

fn default_true() -> bool {
    true
}

pub struct EmailPlugin {
    settings: SmtpSettings,
}

impl EmailPlugin {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }
}

impl TransportPlugin for EmailPlugin {
    fn kind(&self) -> &str {
        "email"
    }

    fn validate_value(&self, value: &Value) -> Result<()> {
        serde_json::from_value::<EmailValue>(value.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("email value: {e}")))?;
        Ok(())
    }

    fn create(&self, channel: &ChannelRow) -> Result<Box<dyn Transport>> {
        let cfg: EmailValue = serde_json::from_str(&channel.value)
            .map_err(|e| NotifyError::InvalidConfig(format!("email value: {e}")))?;
        let transport = EmailTransport::new(&self.settings, &cfg, channel.email_verified)?;
        Ok(Box::new(transport))
    }
}
