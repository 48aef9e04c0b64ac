//! The single reply owed to whoever requested a pairing code.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::error::PairingError;

/// What the requester is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingReply {
    /// A code for the user to enter on their device.
    Code(String),
    /// Stored credentials already authenticate a device and were exported.
    Linked,
    Failed(PairingError),
}

impl PairingReply {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Code(_) | Self::Linked => 200,
            Self::Failed(e) => e.status_code(),
        }
    }

    /// Value of the `code` field in the JSON reply.
    pub fn message(&self) -> String {
        match self {
            Self::Code(code) => code.clone(),
            Self::Linked => "Session linked".into(),
            Self::Failed(e) => e.to_string(),
        }
    }
}

/// At-most-once reply channel shared by every attempt of one request.
///
/// `take()` on the inner sender is the check-and-set: the first
/// [`send`](Self::send) wins, later ones are dropped.
#[derive(Debug)]
pub struct ReplySlot {
    tx: Mutex<Option<oneshot::Sender<PairingReply>>>,
}

impl ReplySlot {
    pub fn new() -> (Self, oneshot::Receiver<PairingReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Deliver `reply` if nothing has been sent yet.  Returns whether this
    /// call consumed the slot.
    pub fn send(&self, reply: PairingReply) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            tracing::debug!(reply = ?reply, "reply already sent, dropping");
            return false;
        };
        if tx.send(reply).is_err() {
            tracing::debug!("requester went away before the reply");
        }
        true
    }

    pub fn is_sent(&self) -> bool {
        self.tx.lock().is_none()
    }
}
