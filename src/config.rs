//! Settings for the token panel and the theme synchronizer.
//!
//! Every field has a default, so an absent or partial JSON file is fine.
//! Environment variables prefixed with `OXITOKEN_` override the file.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::panel::Digits;

const ENV_DIGITS: &str = "OXITOKEN_DIGITS";
const ENV_PERIOD: &str = "OXITOKEN_PERIOD";
const ENV_COOKIE_DOMAIN: &str = "OXITOKEN_COOKIE_DOMAIN";
const ENV_THEME_MAX_AGE: &str = "OXITOKEN_THEME_MAX_AGE_SECS";
const ENV_POLL_INTERVAL: &str = "OXITOKEN_POLL_INTERVAL_MS";

const ONE_YEAR_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read the settings file")]
    Io(#[from] std::io::Error),
    #[error("Could not parse the settings file")]
    Parse(#[from] serde_json::Error),
    #[error("Unsupported digit count {0}. Expected 6 or 8")]
    InvalidDigits(u32),
    #[error("The period must be at least one second")]
    InvalidPeriod,
    #[error("Invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub token: TokenSettings,
    pub theme: ThemeSettings,
}

/// Storage key names and the values used before the user picks any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    pub secret_key: String,
    pub digits_key: String,
    pub period_key: String,
    pub default_digits: Digits,
    pub default_period: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            secret_key: "totp-secret-key".to_string(),
            digits_key: "totp-digits".to_string(),
            period_key: "totp-period".to_string(),
            default_digits: Digits::Six,
            default_period: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeSettings {
    /// Name of the shared entry holding the preference tag.
    pub cookie_name: String,
    /// Key of the same tag in the local store.
    pub cache_key: String,
    pub max_age_secs: u64,
    /// Parent domain the shared entry is scoped to; host-only when absent.
    pub cookie_domain: Option<String>,
    pub poll_interval_ms: u64,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            cookie_name: "theme".to_string(),
            cache_key: "theme".to_string(),
            max_age_secs: ONE_YEAR_SECS,
            cookie_domain: None,
            poll_interval_ms: 500,
        }
    }
}

impl ThemeSettings {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Settings {
    /// Reads the optional JSON file, then applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };

        settings.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;

        tracing::debug!(path = %path.display(), "Settings loaded");
        Ok(settings)
    }

    /// Applies `OXITOKEN_*` overrides resolved through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DIGITS) {
            let digits = parse_env::<u32>(ENV_DIGITS, &value)?;
            self.token.default_digits = Digits::try_from(digits)?;
        }
        if let Some(value) = lookup(ENV_PERIOD) {
            self.token.default_period = parse_env(ENV_PERIOD, &value)?;
        }
        if let Some(value) = lookup(ENV_COOKIE_DOMAIN) {
            let domain = value.trim();
            self.theme.cookie_domain = (!domain.is_empty()).then(|| domain.to_string());
        }
        if let Some(value) = lookup(ENV_THEME_MAX_AGE) {
            self.theme.max_age_secs = parse_env(ENV_THEME_MAX_AGE, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL) {
            self.theme.poll_interval_ms = parse_env(ENV_POLL_INTERVAL, &value)?;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.token.default_period == 0 {
            return Err(ConfigError::InvalidPeriod);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
