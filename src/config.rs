use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mailer::SmtpEndpoint;
use crate::store::SettingsStore;

pub const DEFAULT_SMTP_PORT: u16 = 25;
pub const DEFAULT_FROM_ADDRESS: &str = "noreply@localhost";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

// Settings-table keys
pub const KEY_ENABLED: &str = "mailq_enabled";
pub const KEY_SMTP_SERVER: &str = "mailq_smtp_server";
pub const KEY_SMTP_USER: &str = "mailq_smtp_user";
pub const KEY_SMTP_PASSWORD: &str = "mailq_smtp_password";
pub const KEY_SMTP_PORT: &str = "mailq_smtp_port";
pub const KEY_SMTP_USE_SSL: &str = "mailq_smtp_use_ssl";
pub const KEY_DEFAULT_FROM: &str = "mailq_default_from_address";
pub const KEY_MAX_ERROR_ATTEMPTS: &str = "mailq_max_error_attempts";
pub const KEY_INTERVAL_SECS: &str = "mailq_interval_secs";

/// Rows inserted by `db::seed_defaults` when missing.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    (KEY_ENABLED, "false"),
    (KEY_SMTP_SERVER, ""),
    (KEY_SMTP_USER, ""),
    (KEY_SMTP_PASSWORD, ""),
    (KEY_SMTP_PORT, "25"),
    (KEY_SMTP_USE_SSL, "false"),
    (KEY_DEFAULT_FROM, DEFAULT_FROM_ADDRESS),
    (KEY_MAX_ERROR_ATTEMPTS, "0"),
    (KEY_INTERVAL_SECS, "60"),
];

/// Settings snapshot for one run of the dispatcher.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    #[serde(rename = "Enabled")]
    pub enabled: bool,
    #[serde(rename = "SmtpServer")]
    pub smtp_server: String,
    #[serde(rename = "SmtpUser")]
    pub smtp_user: String,
    #[serde(rename = "SmtpPassword")]
    pub smtp_password: String,
    #[serde(rename = "SmtpPort")]
    pub smtp_port: u16,
    #[serde(rename = "SmtpUseSSL")]
    pub smtp_use_ssl: bool,
    #[serde(rename = "DefaultFromAddress")]
    pub default_from_address: String,
    /// Zero or below disables the ceiling.
    #[serde(rename = "MaxErrorAttempts")]
    pub max_error_attempts: i64,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        RunConfiguration {
            enabled: false,
            smtp_server: String::new(),
            smtp_user: String::new(),
            smtp_password: String::new(),
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_use_ssl: false,
            default_from_address: DEFAULT_FROM_ADDRESS.to_string(),
            max_error_attempts: 0,
        }
    }
}

impl fmt::Debug for RunConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfiguration")
            .field("enabled", &self.enabled)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_password", &"<redacted>")
            .field("smtp_port", &self.smtp_port)
            .field("smtp_use_ssl", &self.smtp_use_ssl)
            .field("default_from_address", &self.default_from_address)
            .field("max_error_attempts", &self.max_error_attempts)
            .finish()
    }
}

impl RunConfiguration {
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        let mut cfg: RunConfiguration = toml::from_str(doc)?;
        // Blank sender means the default, as in the settings table
        if cfg.default_from_address.trim().is_empty() {
            cfg.default_from_address = DEFAULT_FROM_ADDRESS.to_string();
        }
        Ok(cfg)
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let doc = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&doc)
    }

    /// Build from `mailq_*` rows of the settings table. Missing rows fall
    /// back to defaults, unparsable values are rejected.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = RunConfiguration::default();
        let text = |key: &str, default: &str| -> String {
            settings
                .get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Ok(RunConfiguration {
            enabled: parse_bool(settings, KEY_ENABLED, defaults.enabled)?,
            smtp_server: text(KEY_SMTP_SERVER, ""),
            smtp_user: text(KEY_SMTP_USER, ""),
            smtp_password: text(KEY_SMTP_PASSWORD, ""),
            smtp_port: parse_num(settings, KEY_SMTP_PORT, defaults.smtp_port)?,
            smtp_use_ssl: parse_bool(settings, KEY_SMTP_USE_SSL, defaults.smtp_use_ssl)?,
            default_from_address: settings
                .get(KEY_DEFAULT_FROM)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .unwrap_or(defaults.default_from_address),
            max_error_attempts: parse_num(
                settings,
                KEY_MAX_ERROR_ATTEMPTS,
                defaults.max_error_attempts,
            )?,
        })
    }

    /// The run is configured only when an SMTP server is named. User and
    /// password stay optional for anonymous relays.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smtp_server.trim().is_empty() {
            return Err(ConfigError::MissingSmtpServer);
        }
        Ok(())
    }

    pub fn endpoint(&self) -> SmtpEndpoint {
        let credentials = if self.smtp_user.is_empty() {
            None
        } else {
            Some((self.smtp_user.clone(), self.smtp_password.clone()))
        };
        SmtpEndpoint {
            host: self.smtp_server.trim().to_string(),
            port: self.smtp_port,
            credentials,
            use_ssl: self.smtp_use_ssl,
        }
    }
}

/// Where a run reads its configuration from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Settings,
}

impl ConfigSource {
    pub fn load(&self, settings: &dyn SettingsStore) -> Result<RunConfiguration, ConfigError> {
        match self {
            ConfigSource::File(path) => RunConfiguration::load_file(path),
            ConfigSource::Settings => {
                let all = settings.setting_all().map_err(ConfigError::Unavailable)?;
                RunConfiguration::from_settings(&all)
            }
        }
    }
}

/// Seconds between scheduled runs, never below one.
pub fn interval_secs(settings: &dyn SettingsStore) -> u64 {
    settings
        .setting_get_or(KEY_INTERVAL_SECS, &DEFAULT_INTERVAL_SECS.to_string())
        .parse::<u64>()
        .unwrap_or(DEFAULT_INTERVAL_SECS)
        .max(1)
}

fn parse_bool(
    settings: &HashMap<String, String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match settings.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue { key, value: v }),
    }
}

fn parse_num<T: std::str::FromStr>(
    settings: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match settings.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: v.to_string(),
        }),
    }
}
