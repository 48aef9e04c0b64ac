//! Pairing runtime: the state machine that takes a phone number to exported
//! credentials.
//!
//! Entry point: [`SessionSupervisor::start`] validates the number, spawns
//! [`run_session`] on its own task and returns a [`PendingPairing`] that
//! resolves to the request's single [`PairingReply`].

pub mod error;
pub mod exporter;
pub mod monitor;
pub mod number;
pub mod policy;
pub mod reply;
pub mod requestor;
pub mod session;
pub mod supervisor;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use pl_domain::config::Config;
use pl_storage::ArchiveStore;
use pl_transport::Transport;

pub use error::PairingError;
pub use exporter::ExportReceipt;
pub use number::PhoneNumber;
pub use reply::{PairingReply, ReplySlot};
pub use session::{run_session, SessionOutcome};
pub use supervisor::{ActiveSession, PendingPairing, SessionSupervisor, SessionTask};

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct PairingContext {
    pub config: Arc<Config>,
    pub transport: Arc<dyn Transport>,
    pub archive: Arc<dyn ArchiveStore>,
    /// `message.timezone`, parsed once.
    pub timezone: chrono_tz::Tz,
}
