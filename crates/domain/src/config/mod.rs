mod bridge;
mod message;
mod observability;
mod pairing;
mod server;
mod storage;

pub use bridge::*;
pub use message::*;
pub use observability::*;
pub use pairing::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One week.
const MAX_SESSION_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;
/// Ten minutes.
const MAX_WAIT_MS: u64 = 10 * 60 * 1000;

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.max_concurrent_requests == 0 {
            errors.push(ConfigError::error(
                "server.max_concurrent_requests",
                "must be greater than 0",
            ));
        }
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 || rl.burst_size == 0 {
                errors.push(ConfigError::error(
                    "server.rate_limit",
                    "requests_per_second and burst_size must be > 0",
                ));
            }
        }
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        // ── pairing ────────────────────────────────────────────────
        if self.pairing.credentials_file.is_empty()
            || self.pairing.credentials_file.contains(&['/', '\\'][..])
        {
            errors.push(ConfigError::error(
                "pairing.credentials_file",
                "must be a plain file name",
            ));
        }
        if self.pairing.credentials_poll_ms == 0 {
            errors.push(ConfigError::error(
                "pairing.credentials_poll_ms",
                "poll interval must be greater than 0",
            ));
        }
        if self.pairing.credentials_timeout_ms < self.pairing.credentials_poll_ms {
            errors.push(ConfigError::warning(
                "pairing.credentials_timeout_ms",
                "shorter than the poll interval; the artifact is checked only once",
            ));
        }
        if self.pairing.session_timeout_secs == 0
            || self.pairing.session_timeout_secs > MAX_SESSION_TIMEOUT_SECS
        {
            errors.push(ConfigError::error(
                "pairing.session_timeout_secs",
                format!("must be between 1 and {MAX_SESSION_TIMEOUT_SECS}"),
            ));
        }
        for (field, value) in [
            ("pairing.ready_timeout_ms", self.pairing.ready_timeout_ms),
            ("pairing.credentials_timeout_ms", self.pairing.credentials_timeout_ms),
        ] {
            if value > MAX_WAIT_MS {
                errors.push(ConfigError::error(
                    field,
                    format!("must not exceed {MAX_WAIT_MS} ms"),
                ));
            }
        }
        let retry = &self.pairing.retry;
        if retry.backoff_factor < 1.0 {
            errors.push(ConfigError::error(
                "pairing.retry.backoff_factor",
                "must be at least 1.0",
            ));
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            errors.push(ConfigError::error(
                "pairing.retry.max_delay_ms",
                "must not be smaller than initial_delay_ms",
            ));
        }

        // ── collaborators ──────────────────────────────────────────
        if !self.bridge.url.starts_with("ws://") && !self.bridge.url.starts_with("wss://") {
            errors.push(ConfigError::error(
                "bridge.url",
                "must be a ws:// or wss:// URL",
            ));
        }
        if self.storage.base_url.is_empty() {
            errors.push(ConfigError::error("storage.base_url", "base_url must not be empty"));
        }
        if self.storage.locator_prefix.is_empty() {
            errors.push(ConfigError::warning(
                "storage.locator_prefix",
                "empty prefix; users receive the full storage locator",
            ));
        }

        if let Err(e) = self.message.tz() {
            errors.push(ConfigError::error("message.timezone", e));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let issues = Config::default().validate();
        assert!(
            issues.iter().all(|i| i.severity != ConfigSeverity::Error),
            "unexpected errors: {issues:?}"
        );
    }

    #[test]
    fn bad_timezone_and_bridge_url_are_errors() {
        let toml_str = r#"
[bridge]
url = "http://not-a-websocket"

[message]
timezone = "Nowhere/Special"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let issues = config.validate();
        let fields: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .map(|i| i.field.as_str())
            .collect();
        assert!(fields.contains(&"bridge.url"));
        assert!(fields.contains(&"message.timezone"));
    }

    #[test]
    fn credentials_file_must_not_escape_workspace() {
        let mut config = Config::default();
        config.pairing.credentials_file = "../creds.json".into();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.field == "pairing.credentials_file"));
    }

    #[test]
    fn inverted_backoff_bounds_are_rejected() {
        let mut config = Config::default();
        config.pairing.retry.initial_delay_ms = 5_000;
        config.pairing.retry.max_delay_ms = 1_000;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "pairing.retry.max_delay_ms" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn oversized_timeouts_are_rejected() {
        let mut config = Config::default();
        config.pairing.session_timeout_secs = u64::MAX;
        config.pairing.credentials_timeout_ms = u64::MAX;
        let fields: Vec<String> = config
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .map(|i| i.field)
            .collect();
        assert!(fields.contains(&"pairing.session_timeout_secs".to_string()));
        assert!(fields.contains(&"pairing.credentials_timeout_ms".to_string()));
    }

    #[test]
    fn issue_display_has_severity_tag() {
        let issue = ConfigError::warning("server.cors.allowed_origins", "wildcard");
        assert_eq!(issue.to_string(), "[WARN] server.cors.allowed_origins: wildcard");
    }
}
