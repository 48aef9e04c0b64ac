use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Confirmation messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Content of the two self-messages sent after credentials are exported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    #[serde(default = "d_bot_name")]
    pub bot_name: String,
    #[serde(default = "d_owner")]
    pub owner: String,
    /// IANA timezone used for the "linked at" timestamp.
    #[serde(default = "d_timezone")]
    pub timezone: String,
    /// Prepended to the reference token in the first message.
    #[serde(default)]
    pub token_prefix: String,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub channel_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            bot_name: d_bot_name(),
            owner: d_owner(),
            timezone: d_timezone(),
            token_prefix: String::new(),
            project_url: None,
            channel_url: None,
            thumbnail_url: None,
        }
    }
}

impl MessageConfig {
    /// Parse the configured timezone.
    pub fn tz(&self) -> Result<chrono_tz::Tz, String> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| format!("invalid timezone '{}': {e}", self.timezone))
    }
}

fn d_bot_name() -> String {
    "PairLink".into()
}
fn d_owner() -> String {
    "PairLink".into()
}
fn d_timezone() -> String {
    "UTC".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timezone_parses() {
        let cfg = MessageConfig::default();
        assert_eq!(cfg.tz().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn named_timezone_parses() {
        let cfg: MessageConfig = toml::from_str(r#"timezone = "Africa/Lagos""#).unwrap();
        assert_eq!(cfg.tz().unwrap(), chrono_tz::Africa::Lagos);
    }

    #[test]
    fn bogus_timezone_is_an_error() {
        let cfg: MessageConfig = toml::from_str(r#"timezone = "Mars/Olympus""#).unwrap();
        assert!(cfg.tz().unwrap_err().contains("Mars/Olympus"));
    }
}
