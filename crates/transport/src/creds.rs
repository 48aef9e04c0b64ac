//! File-backed credential persistence inside a session workspace.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pl_domain::{Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Reads and atomically writes the credential artifact of one session.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored credentials.  A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<serde_json::Value>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist credentials: write a uniquely-named temp sibling, sync,
    /// then rename into place.
    ///
    /// The workspace directory is never created here.  Once the pairing
    /// core removed it, late updates fail instead of resurrecting it.
    pub async fn save(&self, credentials: &serde_json::Value) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::Other(format!("{} has no parent", self.path.display())))?;
        match fs::metadata(parent).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::Other(format!("{} is not a directory", parent.display())))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::Transport(format!(
                    "workspace {} no longer exists",
                    parent.display()
                )))
            }
            Err(e) => return Err(e.into()),
        }

        let bytes = serde_json::to_vec_pretty(credentials)?;
        let tmp_name = format!(
            ".{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            uuid::Uuid::new_v4().as_simple()
        );
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_data().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}
