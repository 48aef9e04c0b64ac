use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pairing sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timing and storage settings for one pairing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Parent directory for per-session workspaces.  Each session gets
    /// `<workspace_root>/<session_id>`.
    #[serde(default = "d_workspace_root")]
    pub workspace_root: PathBuf,
    /// Name of the credential artifact the transport writes into the
    /// workspace once the device is registered.
    #[serde(default = "d_credentials_file")]
    pub credentials_file: String,
    /// How long to wait for the transport to report it is ready before
    /// requesting a pairing code.
    #[serde(default = "d_10000")]
    pub ready_timeout_ms: u64,
    /// Interval between checks for the credential artifact after the
    /// connection opens.
    #[serde(default = "d_250")]
    pub credentials_poll_ms: u64,
    /// Give up on the credential artifact after this long.
    #[serde(default = "d_15000")]
    pub credentials_timeout_ms: u64,
    /// Upper bound on how long one attempt waits for the connection to
    /// open or close (the user has to type the code in this window).
    #[serde(default = "d_600")]
    pub session_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            workspace_root: d_workspace_root(),
            credentials_file: d_credentials_file(),
            ready_timeout_ms: 10_000,
            credentials_poll_ms: 250,
            credentials_timeout_ms: 15_000,
            session_timeout_secs: 600,
            retry: RetryConfig::default(),
        }
    }
}

impl PairingConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn credentials_poll(&self) -> Duration {
        Duration::from_millis(self.credentials_poll_ms)
    }

    pub fn credentials_timeout(&self) -> Duration {
        Duration::from_millis(self.credentials_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

/// Back-off applied between attempts after a transient disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_2000")]
    pub initial_delay_ms: u64,
    #[serde(default = "d_60000")]
    pub max_delay_ms: u64,
    #[serde(default = "d_factor")]
    pub backoff_factor: f64,
    /// Maximum number of retries after the first attempt.  `0` disables
    /// retrying entirely.
    #[serde(default = "d_5")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
            max_attempts: 5,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_workspace_root() -> PathBuf {
    PathBuf::from("./data/sessions")
}
fn d_credentials_file() -> String {
    "creds.json".into()
}
fn d_250() -> u64 {
    250
}
fn d_600() -> u64 {
    600
}
fn d_2000() -> u64 {
    2_000
}
fn d_10000() -> u64 {
    10_000
}
fn d_15000() -> u64 {
    15_000
}
fn d_60000() -> u64 {
    60_000
}
fn d_factor() -> f64 {
    2.0
}
fn d_5() -> u32 {
    5
}
