use std::collections::HashMap;

use serde_json::Value;

use pulsemon_storage::ChannelRow;

use crate::channels;
use crate::error::{NotifyError, Result};
use crate::Transport;

/// Factory for one transport kind. The channel's opaque `value` blob is
/// parsed and validated here, not in the dispatcher.
pub trait TransportPlugin: Send + Sync {
    fn kind(&self) -> &str;
    fn validate_value(&self, value: &Value) -> Result<()>;
    fn create(&self, channel: &ChannelRow) -> Result<Box<dyn Transport>>;
}

/// Maps channel `kind` strings to transport factories.
pub struct TransportRegistry {
    plugins: HashMap<String, Box<dyn TransportPlugin>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Registry with all built-in transports. Email needs the deployment's
    /// SMTP settings; the rest are self-contained.
    pub fn with_builtins(email: channels::email::SmtpSettings) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(channels::email::EmailPlugin::new(email)));
        registry.register(Box::new(channels::webhook::WebhookPlugin));
        registry.register(Box::new(channels::slack::SlackPlugin));
        registry.register(Box::new(channels::pagerduty::PagerDutyPlugin));
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn TransportPlugin>) {
        let kind = plugin.kind().to_string();
        self.plugins.insert(kind, plugin);
    }

    pub fn create(&self, channel: &ChannelRow) -> Result<Box<dyn Transport>> {
        let plugin = self
            .plugins
            .get(&channel.kind)
            .ok_or_else(|| NotifyError::UnknownKind(channel.kind.clone()))?;
        let value: Value = serde_json::from_str(&channel.value)?;
        plugin.validate_value(&value)?;
        plugin.create(channel)
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.plugins.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.plugins.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_builtins(channels::email::SmtpSettings::default())
    }
}
