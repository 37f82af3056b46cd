//! # Service Configuration
//!
//! Read once at startup from the environment. Every variable is optional;
//! a variable that is present but unparseable is a [`ConfigError`] rather
//! than a silent fallback to the default.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `PORT` | `8080` | Listen port |
//! | `DATABASE_URL` | unset | Postgres URL; unset selects the in-memory store |
//! | `AUTH_TOKEN` | unset | Shared bearer secret; unset disables the secret check |
//! | `GMX_PROTECTION_WINDOW_HOURS` | `48` | Buyer protection window, 1 to 8760 |
//! | `GMX_AUTO_COMPLETE_INTERVAL_SECS` | `300` | Auto-completion sweep period |
//! | `GMX_NOTIFY_WEBHOOK_URL` | unset | Notification webhook; unset logs notices |
//! | `GMX_NOTIFY_TIMEOUT_SECS` | `5` | Per-notice delivery timeout |
//! | `GMX_METRICS_ENABLED` | `true` | Serve `/metrics` and count requests |
//! | `GMX_LOG_FORMAT` | `text` | `text` or `json` |
//! | `GMX_BOOTSTRAP_ADMIN` | unset | Profile UUID promoted to admin at startup |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use gmx_core::ProfileId;
use gmx_state::{ProtectionWindow, MAX_PROTECTION_WINDOW_HOURS, PROTECTION_WINDOW_HOURS};

/// A configuration variable held an invalid value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "plain" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Service configuration.
///
/// Custom `Debug` redacts the auth token and database URL.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub auth_token: Option<String>,
    pub protection_window: ProtectionWindow,
    pub auto_complete_interval: Duration,
    pub notify_webhook_url: Option<String>,
    pub notify_timeout: Duration,
    pub metrics_enabled: bool,
    pub log_format: LogFormat,
    pub bootstrap_admin: Option<ProfileId>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("protection_window", &self.protection_window)
            .field("auto_complete_interval", &self.auto_complete_interval)
            .field("notify_webhook_url", &self.notify_webhook_url)
            .field("notify_timeout", &self.notify_timeout)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("log_format", &self.log_format)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: None,
            auth_token: None,
            protection_window: ProtectionWindow::default(),
            auto_complete_interval: Duration::from_secs(300),
            notify_webhook_url: None,
            notify_timeout: Duration::from_secs(5),
            metrics_enabled: true,
            log_format: LogFormat::Text,
            bootstrap_admin: None,
        }
    }
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}

fn positive(var: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let window_hours = positive(
            "GMX_PROTECTION_WINDOW_HOURS",
            parsed(&lookup, "GMX_PROTECTION_WINDOW_HOURS", u64::from(PROTECTION_WINDOW_HOURS))?,
        )?;
        let protection_window = u32::try_from(window_hours)
            .ok()
            .and_then(|h| ProtectionWindow::try_new(h).ok())
            .ok_or_else(|| ConfigError::Invalid {
                var: "GMX_PROTECTION_WINDOW_HOURS",
                value: window_hours.to_string(),
                reason: format!("must be at most {MAX_PROTECTION_WINDOW_HOURS} hours"),
            })?;
        let interval = positive(
            "GMX_AUTO_COMPLETE_INTERVAL_SECS",
            parsed(&lookup, "GMX_AUTO_COMPLETE_INTERVAL_SECS", 300)?,
        )?;
        let notify_timeout = positive(
            "GMX_NOTIFY_TIMEOUT_SECS",
            parsed(&lookup, "GMX_NOTIFY_TIMEOUT_SECS", 5)?,
        )?;

        let notify_webhook_url = lookup("GMX_NOTIFY_WEBHOOK_URL");
        if let Some(url) = &notify_webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    var: "GMX_NOTIFY_WEBHOOK_URL",
                    value: url.clone(),
                    reason: "must be an http(s) URL".to_string(),
                });
            }
        }

        let metrics_enabled = lookup("GMX_METRICS_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let bootstrap_admin = match lookup("GMX_BOOTSTRAP_ADMIN") {
            None => None,
            Some(value) => Some(ProfileId::from_uuid(
                Uuid::parse_str(value.trim()).map_err(|e| ConfigError::Invalid {
                    var: "GMX_BOOTSTRAP_ADMIN",
                    value,
                    reason: e.to_string(),
                })?,
            )),
        };

        Ok(Self {
            port: parsed(&lookup, "PORT", 8080)?,
            database_url: lookup("DATABASE_URL"),
            auth_token: lookup("AUTH_TOKEN"),
            protection_window,
            auto_complete_interval: Duration::from_secs(interval),
            notify_webhook_url,
            notify_timeout: Duration::from_secs(notify_timeout),
            metrics_enabled,
            log_format: parsed(&lookup, "GMX_LOG_FORMAT", LogFormat::Text)?,
            bootstrap_admin,
        })
    }
}
