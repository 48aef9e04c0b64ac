use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Archival storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "d_storage_url")]
    pub base_url: String,
    /// Environment variable holding the storage API key.  Unset means
    /// uploads are sent without credentials.
    #[serde(default = "d_key_env")]
    pub api_key_env: String,
    /// Folder (path segment) uploads land in.
    #[serde(default = "d_folder")]
    pub folder: String,
    /// Prefix stripped from returned locators to get the short reference
    /// token sent to the user.
    #[serde(default = "d_locator_prefix")]
    pub locator_prefix: String,
    #[serde(default = "d_timeout")]
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: d_storage_url(),
            api_key_env: d_key_env(),
            folder: d_folder(),
            locator_prefix: d_locator_prefix(),
            timeout_ms: d_timeout(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_storage_url() -> String {
    "http://localhost:9000".into()
}
fn d_key_env() -> String {
    "PL_STORAGE_KEY".into()
}
fn d_folder() -> String {
    "sessions".into()
}
fn d_locator_prefix() -> String {
    "https://storage.example/file/".into()
}
fn d_timeout() -> u64 {
    30_000
}
