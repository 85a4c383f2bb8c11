//! Notification configuration.

use serde::{Deserialize, Serialize};

/// Alert delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Env var holding the webhook URL.
    #[serde(default = "default_webhook_url_env")]
    pub webhook_url_env: String,
    /// Webhook URL set directly. Takes precedence over the env var.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Send a test alert for every signal Stage A lets through,
    /// bypassing the cooldown stage.
    #[serde(default)]
    pub force_test_alert: bool,
    /// Horizon shown in the alert's CVD breakdown.
    #[serde(default = "default_breakdown_horizon")]
    pub breakdown_horizon: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_webhook_url_env() -> String {
    "DISCORD_WEBHOOK_SOL".to_string()
}

fn default_breakdown_horizon() -> String {
    "15m".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url_env: default_webhook_url_env(),
            webhook_url: None,
            force_test_alert: false,
            breakdown_horizon: default_breakdown_horizon(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl NotifyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".to_string());
        }
        if self.breakdown_horizon.is_empty() {
            return Err("breakdown_horizon must not be empty".to_string());
        }
        Ok(())
    }

    /// Webhook URL from config, else from the env var. Empty values count as unset.
    pub fn resolve_webhook_url(&self) -> Option<String> {
        let usable = |url: &String| !url.trim().is_empty();
        self.webhook_url
            .clone()
            .filter(usable)
            .or_else(|| std::env::var(&self.webhook_url_env).ok().filter(usable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_url_wins() {
        let config = NotifyConfig {
            webhook_url: Some("https://example.invalid/hook".to_string()),
            webhook_url_env: "SVP_TEST_UNUSED_WEBHOOK".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_webhook_url().as_deref(),
            Some("https://example.invalid/hook")
        );
    }

    #[test]
    fn test_missing_env_is_none() {
        let config = NotifyConfig {
            webhook_url_env: "SVP_TEST_WEBHOOK_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        assert!(config.resolve_webhook_url().is_none());

        let blank = NotifyConfig {
            webhook_url: Some("  ".to_string()),
            ..config
        };
        assert!(blank.resolve_webhook_url().is_none());
    }

    #[test]
    fn test_blank_config_url_falls_back_to_env() {
        let env = "SVP_TEST_WEBHOOK_BLANK_FALLBACK";
        std::env::set_var(env, "https://example.invalid/from-env");
        let config = NotifyConfig {
            webhook_url: Some(String::new()),
            webhook_url_env: env.to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_webhook_url().as_deref(),
            Some("https://example.invalid/from-env")
        );
    }

    #[test]
    fn test_defaults() {
        let config = NotifyConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.force_test_alert);
        assert_eq!(config.breakdown_horizon, "15m");
    }
}
