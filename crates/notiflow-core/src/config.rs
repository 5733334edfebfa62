//! Notiflow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{NotiflowError, Result};
use crate::types::ChannelKind;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotiflowConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

impl NotiflowConfig {
    /// Load config from the default path (~/.notiflow/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NotiflowError::Configuration(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| NotiflowError::Configuration(format!("Failed to parse config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Notiflow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".notiflow")
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using the deployment's notifier variable names.
    /// Setting any variable of a channel creates that channel's section.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let email_host = lookup("EMAIL_NOTIFIER_HOST");
        let email_port = lookup("EMAIL_NOTIFIER_PORT");
        let email_login = lookup("EMAIL_NOTIFIER_LOGIN");
        let email_pass = lookup("EMAIL_NOTIFIER_PASS");
        if email_host.is_some() || email_port.is_some() || email_login.is_some() || email_pass.is_some() {
            let email = self.channel.email.get_or_insert_with(EmailChannelConfig::default);
            if let Some(host) = email_host {
                email.host = host;
            }
            if let Some(port) = email_port {
                match port.parse() {
                    Ok(p) => email.port = p,
                    Err(_) => tracing::warn!("Ignoring invalid EMAIL_NOTIFIER_PORT: {port}"),
                }
            }
            if let Some(login) = email_login {
                email.username = login;
            }
            if let Some(pass) = email_pass {
                email.password = pass;
            }
        }

        let sms_login = lookup("SMS_NOTIFIER_LOGIN");
        let sms_pass = lookup("SMS_NOTIFIER_PASSWORD");
        let sms_sender = lookup("SMS_NOTIFIER_SENDER");
        if sms_login.is_some() || sms_pass.is_some() || sms_sender.is_some() {
            let sms = self.channel.sms.get_or_insert_with(SmsChannelConfig::default);
            if let Some(login) = sms_login {
                sms.login = login;
            }
            if let Some(pass) = sms_pass {
                sms.password = pass;
            }
            if let Some(sender) = sms_sender {
                sms.sender = sender;
            }
        }

        if let Some(token) = lookup("TG_NOTIFIER_BOT_TOKEN") {
            self.channel
                .telegram
                .get_or_insert_with(TelegramChannelConfig::default)
                .bot_token = token;
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 8000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub directory: String,
    #[serde(default = "bool_true")]
    pub file_enabled: bool,
}

fn bool_true() -> bool { true }
fn default_log_level() -> String { "info".into() }
fn default_log_dir() -> String { "logs".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_dir(),
            file_enabled: true,
        }
    }
}

/// Scheduling bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How late a job may fire and still run.
    #[serde(default = "default_misfire_grace")]
    pub misfire_grace_secs: u64,
}

fn default_misfire_grace() -> u64 { 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { misfire_grace_secs: default_misfire_grace() }
    }
}

/// Notification store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    /// Directory for the JSON backend.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_backend() -> StoreBackend { StoreBackend::Memory }
fn default_store_path() -> String { "~/.notiflow/store".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

/// Failover configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Channels in the order they are attempted.
    #[serde(default = "default_order")]
    pub order: Vec<ChannelKind>,
}

fn default_order() -> Vec<ChannelKind> { ChannelKind::ALL.to_vec() }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { order: default_order() }
    }
}

impl DispatchConfig {
    /// Configured order with duplicates removed, first occurrence wins.
    pub fn effective_order(&self) -> Vec<ChannelKind> {
        let mut order = Vec::with_capacity(self.order.len());
        for kind in &self.order {
            if !order.contains(kind) {
                order.push(*kind);
            }
        }
        order
    }
}

/// Channel configuration. A missing section means the channel is not configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub email: Option<EmailChannelConfig>,
    #[serde(default)]
    pub sms: Option<SmsChannelConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramChannelConfig>,
}

/// SMTP mail channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Implicit TLS when true, STARTTLS otherwise.
    #[serde(default = "bool_true")]
    pub use_tls: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_smtp_host() -> String { "smtp.yandex.ru".into() }
fn default_smtp_port() -> u16 { 465 }
fn default_timeout() -> u64 { 10 }
fn default_subject() -> String { "notify".into() }

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            use_tls: true,
            timeout_secs: default_timeout(),
            subject: default_subject(),
        }
    }
}

/// SMS gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsChannelConfig {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default = "default_sms_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_sms_balance_endpoint")]
    pub balance_endpoint: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_sms_endpoint() -> String { "https://smsc.ru/rest/send/".into() }
fn default_sms_balance_endpoint() -> String { "https://smsc.ru/sys/balance.php".into() }

impl Default for SmsChannelConfig {
    fn default() -> Self {
        Self {
            login: String::new(),
            password: String::new(),
            sender: String::new(),
            endpoint: default_sms_endpoint(),
            balance_endpoint: default_sms_balance_endpoint(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_telegram_api() -> String { "https://api.telegram.org".into() }

impl Default for TelegramChannelConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api(),
            timeout_secs: default_timeout(),
        }
    }
}
