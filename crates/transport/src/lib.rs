//! `pl-transport`: the seam between the pairing core and the messaging
//! protocol.
//!
//! The core only needs a handful of operations from a protocol session:
//! wait until it is ready, ask for a pairing code, learn which account it
//! authenticated as, send messages, close.  Connection status arrives as a
//! stream of [`ConnectionEvent`]s.  [`Transport`] and [`TransportSession`]
//! capture that contract; [`BridgeTransport`] implements it against an
//! external bridge process over WebSocket.
//!
//! Credentials are persisted by the transport, never by the core: every
//! `creds_update` from the bridge is written atomically to the session
//! workspace through [`CredentialStore`].

pub mod bridge;
pub mod creds;
pub mod session;

pub use bridge::BridgeTransport;
pub use creds::CredentialStore;
pub use session::{OpenedSession, Transport, TransportSession};

pub use pl_protocol::{ConnectionEvent, ErrorInfo, Identity, MessageKey, OutgoingMessage};
