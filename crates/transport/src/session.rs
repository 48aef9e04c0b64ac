use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use pl_domain::Result;
use pl_protocol::{ConnectionEvent, Identity, MessageKey, OutgoingMessage};
use tokio::sync::mpsc;

/// Opens protocol sessions rooted at a workspace directory.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start a new protocol session.  Credentials already present in
    /// `workspace` are restored; new ones are persisted there.
    async fn open(&self, session_id: &str, workspace: &Path) -> Result<OpenedSession>;
}

/// A freshly opened session plus its connection event stream.
///
/// The receiver is the only subscription to connection status.  Dropping
/// it makes any later events for this session inert.
pub struct OpenedSession {
    pub session: Arc<dyn TransportSession>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

/// Operations the pairing core performs on an open protocol session.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Resolves once the session finished its startup handshake and
    /// [`is_registered`](Self::is_registered) is meaningful.
    async fn ready(&self) -> Result<()>;

    /// Whether the stored credentials already authenticate a device.
    fn is_registered(&self) -> bool;

    /// Request a one-time pairing code for a digits-only phone number.
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String>;

    /// The account this session authenticated as, once known.
    fn own_identity(&self) -> Option<Identity>;

    async fn send_message(&self, to: &str, message: OutgoingMessage) -> Result<MessageKey>;

    /// Tear the session down.  Safe to call more than once.
    async fn close(&self);
}
