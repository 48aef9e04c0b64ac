//! `pl-storage`: archival storage for exported session credentials.
//!
//! Provides the [`ArchiveStore`] trait the pairing runtime uploads through,
//! a production HTTP implementation ([`HttpArchiveStore`]) and
//! [`reference_token`], which turns a storage locator into the short token
//! relayed to the user.
//!
//! ```rust,no_run
//! use pl_domain::config::StorageConfig;
//! use pl_storage::{ArchiveStore, ArtifactUpload, HttpArchiveStore};
//!
//! # async fn example() -> pl_domain::Result<()> {
//! let store = HttpArchiveStore::new(&StorageConfig::default())?;
//! let upload = ArtifactUpload::from_file("data/sessions/abc/creds.json", "15551234567.json").await?;
//! let locator = store.upload(upload).await?;
//! println!("archived at {locator}");
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod http;

pub use archive::{reference_token, ArchiveStore, ArtifactUpload};
pub use http::{from_reqwest, HttpArchiveStore};
