//! The `ArchiveStore` trait and the upload descriptor it consumes.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use pl_domain::Result;
use tokio::io::AsyncRead;

/// A file to archive: its target name, size and a stream over its bytes.
pub struct ArtifactUpload {
    pub filename: String,
    pub content_length: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl ArtifactUpload {
    pub fn new(
        filename: impl Into<String>,
        content_length: u64,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_length,
            reader: Box::new(reader),
        }
    }

    /// Open `path` for streaming under the name `filename`.
    pub async fn from_file(path: impl AsRef<Path>, filename: impl Into<String>) -> Result<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let content_length = file.metadata().await?.len();
        Ok(Self::new(filename, content_length, file))
    }
}

impl fmt::Debug for ArtifactUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactUpload")
            .field("filename", &self.filename)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Remote blob storage for credential artifacts.
///
/// Implementations may talk to a real storage service or be a test double.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Upload the artifact and return the locator (URL) it is reachable at.
    async fn upload(&self, artifact: ArtifactUpload) -> Result<String>;
}

/// Strip `prefix` from a storage locator, leaving the short reference token.
///
/// A locator that does not carry the prefix is returned whole.
pub fn reference_token<'a>(locator: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return locator;
    }
    match locator.strip_prefix(prefix) {
        Some(token) if !token.is_empty() => token,
        _ => {
            tracing::warn!(locator, prefix, "locator does not carry the expected prefix");
            locator
        }
    }
}
