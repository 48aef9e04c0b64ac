//! Runtime construction shared by the `serve` and `pair` commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use uuid::Uuid;

use pl_domain::config::{Config, ConfigSeverity};
use pl_storage::HttpArchiveStore;
use pl_transport::BridgeTransport;

use crate::runtime::{PairingContext, SessionSupervisor};
use crate::state::AppState;

/// Log every config issue and fail on errors.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

/// Validate config and wire the production collaborators.
pub async fn build_context(config: Arc<Config>) -> anyhow::Result<PairingContext> {
    validate_config(&config)?;

    // ── Workspace root ───────────────────────────────────────────────
    let root = &config.pairing.workspace_root;
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("creating workspace root {}", root.display()))?;
    tracing::info!(path = %root.display(), "workspace root ready");
    let timezone = config
        .message
        .tz()
        .map_err(|e| anyhow::anyhow!("message.timezone: {e}"))?;

    // ── Bridge transport ─────────────────────────────────────────────
    let transport =
        BridgeTransport::from_config(&config.bridge, &config.pairing.credentials_file);
    tracing::info!(url = %config.bridge.url, "bridge transport ready");

    // ── Archive store ────────────────────────────────────────────────
    let archive = HttpArchiveStore::new(&config.storage).context("creating archive store")?;
    tracing::info!(
        url = %config.storage.base_url,
        folder = %config.storage.folder,
        "archive store ready"
    );

    Ok(PairingContext {
        config,
        transport: Arc::new(transport),
        archive: Arc::new(archive),
        timezone,
    })
}

pub async fn build_app_state(
    config: Arc<Config>,
    shutdown_tx: Arc<tokio::sync::Notify>,
) -> anyhow::Result<AppState> {
    let ctx = build_context(config.clone()).await?;
    // Only the server sweeps: a one-shot `pair` may share the root with a
    // running server whose sessions are live.
    let root = &config.pairing.workspace_root;
    let swept = sweep_stale_workspaces(root).await;
    if swept > 0 {
        tracing::info!(path = %root.display(), swept, "removed stale session workspaces");
    }
    Ok(AppState {
        config,
        supervisor: Arc::new(SessionSupervisor::new(ctx)),
        shutdown_tx,
    })
}

/// Spawn the tasks that live as long as the server.
pub fn spawn_background_tasks(state: &AppState) {
    if state.config.server.exit_after_session {
        let mut completions = state.supervisor.subscribe();
        let shutdown_tx = state.shutdown_tx.clone();
        tokio::spawn(async move {
            if let Ok(outcome) = completions.recv().await {
                tracing::info!(
                    request_id = %outcome.request_id,
                    outcome = outcome.label(),
                    "first session finished, shutting down"
                );
                shutdown_tx.notify_one();
            }
        });
        tracing::info!("server will stop after the first pairing session");
    }
}

/// Remove workspaces left behind by a previous server.  Only directories
/// named like a session id are touched; the server has not started any
/// session yet.
async fn sweep_stale_workspaces(root: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %root.display(), error = %e, "cannot list workspace root");
            return 0;
        }
    };
    let mut swept = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_session = entry
            .file_name()
            .to_str()
            .is_some_and(|name| Uuid::parse_str(name).is_ok());
        if !is_session || !path.is_dir() {
            continue;
        }
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => swept += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to sweep stale workspace"),
        }
    }
    swept
}
