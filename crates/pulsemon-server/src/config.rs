use std::env;

use serde::Deserialize;

use pulsemon_notify::channels::email::SmtpSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_db_url")]
    pub db_url: String,
    #[serde(default = "default_site_root")]
    pub site_root: String,
    /// Base URL pings are addressed to; defaults to `<site_root>/ping`.
    #[serde(default)]
    pub ping_endpoint: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_dir")]
    pub body_dir: String,

    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    /// Seconds between alerting loop cycles.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Concurrent notification fan-out per flip.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            num_workers: default_num_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportsConfig {
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_report_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            interval_secs: default_report_interval_secs(),
        }
    }
}

fn default_db_url() -> String {
    "sqlite://data/pulsemon.db?mode=rwc".to_string()
}

fn default_site_root() -> String {
    "http://localhost:8000".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_body_dir() -> String {
    "data/ping-bodies".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_tick_secs() -> u64 {
    2
}

fn default_num_workers() -> usize {
    10
}

fn default_report_interval_secs() -> u64 {
    86_400
}

impl Default for ServerConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` when it exists, fall back to defaults otherwise, then
    /// apply environment overrides. Main entry point for the binary.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env();
        if config.ping_endpoint.is_empty() {
            config.ping_endpoint = format!("{}/ping", config.site_root.trim_end_matches('/'));
        }
        Ok(config)
    }

    /// Environment variables win over the config file. Unset variables
    /// leave the file/default values in place.
    pub fn apply_env(&mut self) {
        if let Ok(v) = env::var("DB_URL") {
            self.db_url = v;
        }
        if let Ok(v) = env::var("SITE_ROOT") {
            self.site_root = v;
        }
        if let Ok(v) = env::var("PING_ENDPOINT") {
            self.ping_endpoint = v;
        }
        if let Ok(v) = env::var("PORT") {
            if let Ok(port) = v.parse() {
                self.port = port;
            }
        }
        if let Ok(v) = env::var("PING_BODY_DIR") {
            self.body_dir = v;
        }
        if let Ok(v) = env::var("SMTP_HOST") {
            self.smtp.host = v;
        }
        if let Ok(v) = env::var("SMTP_PORT") {
            if let Ok(port) = v.parse() {
                self.smtp.port = port;
            }
        }
        if let Ok(v) = env::var("SMTP_USERNAME") {
            self.smtp.username = Some(v);
        }
        if let Ok(v) = env::var("SMTP_PASSWORD") {
            self.smtp.password = Some(v);
        }
        if let Ok(v) = env::var("SMTP_FROM") {
            self.smtp.from = v;
        }
    }

    pub fn smtp_settings(&self) -> SmtpSettings {
        SmtpSettings {
            host: self.smtp.host.clone(),
            port: self.smtp.port,
            username: self.smtp.username.clone(),
            password: self.smtp.password.clone(),
            from: self.smtp.from.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.alerting.tick_secs, 2);
        assert_eq!(config.alerting.num_workers, 10);
        assert!(config.reports.recipients.is_empty());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            site_root = "https://ping.example.org"

            [alerting]
            num_workers = 4

            [smtp]
            host = "smtp.example.org"
            from = "alerts@example.org"
            "#,
        )
        .unwrap();
        assert_eq!(config.site_root, "https://ping.example.org");
        assert_eq!(config.alerting.num_workers, 4);
        assert_eq!(config.alerting.tick_secs, 2);
        assert_eq!(config.smtp.host, "smtp.example.org");
    }
}
