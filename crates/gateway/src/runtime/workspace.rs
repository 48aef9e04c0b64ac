//! Per-session scratch directory.
//!
//! The transport keeps its credential state under
//! `<workspace_root>/<session_id>`.  The directory exists exactly while the
//! session is live: [`SessionWorkspace::remove`] is called on every terminal
//! path, is idempotent, and `Drop` sweeps up anything a panicking or
//! cancelled flow left behind.

use std::io;
use std::path::{Path, PathBuf};

use pl_domain::trace::TraceEvent;

#[derive(Debug)]
pub struct SessionWorkspace {
    session_id: String,
    path: PathBuf,
    removed: bool,
}

impl SessionWorkspace {
    /// Create `<root>/<session_id>` (and any missing parents).
    pub async fn create(root: &Path, session_id: &str) -> io::Result<Self> {
        let path = root.join(session_id);
        tokio::fs::create_dir_all(&path).await?;
        tracing::debug!(session_id, path = %path.display(), "workspace created");
        Ok(Self {
            session_id: session_id.to_owned(),
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Recursively delete the workspace.
    ///
    /// Returns `true` only for the call that actually removed it.  An
    /// already-absent directory counts as removed.
    pub async fn remove(&mut self) -> bool {
        if self.removed {
            return false;
        }
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove workspace"
                );
                return false;
            }
        }
        self.removed = true;
        TraceEvent::WorkspaceRemoved {
            session_id: self.session_id.clone(),
        }
        .emit();
        true
    }
}

impl Drop for SessionWorkspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!(session_id = %self.session_id, "workspace removed on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                session_id = %self.session_id,
                error = %e,
                "failed to remove workspace on drop"
            ),
        }
    }
}
