//! Tracker configuration
//!
//! Sources, later overriding earlier:
//! 1. built-in defaults
//! 2. `payment-tracker.toml` in the working directory (optional)
//! 3. `PAYMENT_TRACKER__*` environment variables, e.g.
//!    `PAYMENT_TRACKER__POLL_INTERVAL_SECS=10`

use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CANCEL_REASON: &str = "Cancelled by user";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Payment service root, without the `/payments` segment
    pub base_url: String,
    /// Bearer token forwarded on every request
    #[serde(default)]
    pub auth_token: Option<String>,
    pub poll_interval_secs: u64,
    /// Reason sent with every user-initiated cancel
    pub cancel_reason: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            cancel_reason: DEFAULT_CANCEL_REASON.to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("payment-tracker")
    }

    /// Load with an explicit config file stem (extension is auto-detected).
    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        let cfg: TrackerConfig = Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("poll_interval_secs", DEFAULT_POLL_INTERVAL_SECS)?
            .set_default("cancel_reason", DEFAULT_CANCEL_REASON)?
            .add_source(File::with_name(file_stem).required(false))
            .add_source(
                Environment::with_prefix("PAYMENT_TRACKER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
