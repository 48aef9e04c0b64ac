use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Protocol bridge connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the messaging-protocol bridge lives and how long to wait on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// WebSocket URL of the bridge (e.g. `ws://127.0.0.1:7070/v1/session`).
    #[serde(default = "d_bridge_url")]
    pub url: String,
    /// Environment variable holding the bridge token.  Sent as the
    /// `token` query parameter when set.
    #[serde(default = "d_token_env")]
    pub token_env: String,
    #[serde(default = "d_5000")]
    pub connect_timeout_ms: u64,
    /// Timeout for a single request/response exchange (pairing code,
    /// message send).
    #[serde(default = "d_20000")]
    pub request_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: d_bridge_url(),
            token_env: d_token_env(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 20_000,
        }
    }
}

fn d_bridge_url() -> String {
    "ws://127.0.0.1:7070/v1/session".into()
}
fn d_token_env() -> String {
    "PL_BRIDGE_TOKEN".into()
}
fn d_5000() -> u64 {
    5_000
}
fn d_20000() -> u64 {
    20_000
}
