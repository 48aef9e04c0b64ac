//! Bridge protocol: WebSocket message types exchanged with the messaging
//! bridge, plus the connection and message types the pairing core consumes.
//!
//! The bridge is a separate process that owns the messaging service's wire
//! protocol.  PairLink drives it over a JSON-over-WebSocket connection, one
//! connection per pairing session.

use serde::{Deserialize, Serialize};

/// Bumped whenever a message shape changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;

/// Close status the messaging service uses when it rejects the device's
/// credentials (logged out / unauthorized).
pub const UNAUTHORIZED_STATUS: u16 = 401;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reason attached to a connection close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub status_code: u16,
    #[serde(default)]
    pub message: String,
}

impl ErrorInfo {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code == UNAUTHORIZED_STATUS
    }
}

/// Connection status notification delivered by a transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open,
    Close { reason: Option<ErrorInfo> },
}

/// Wire form of a connection status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Identity & messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The account a session authenticated as.
///
/// Built from a device-qualified address such as
/// `15551234567:12@s.whatsapp.net`: `user` is the part before the device
/// suffix, `address` drops the device suffix so messages reach the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Identity {
    /// Parse a device-qualified address.  Returns `None` when there is no
    /// user part.
    pub fn from_address(raw: &str, name: Option<String>) -> Option<Self> {
        let (local, server) = match raw.split_once('@') {
            Some((local, server)) => (local, Some(server)),
            None => (raw, None),
        };
        let user = local.split(':').next().unwrap_or_default().trim();
        if user.is_empty() {
            return None;
        }
        let address = match server {
            Some(server) if !server.is_empty() => format!("{user}@{server}"),
            _ => user.to_owned(),
        };
        Some(Self {
            user: user.to_owned(),
            address,
            name,
        })
    }
}

/// Identifier of a sent message, used to quote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKey {
    pub id: String,
    pub remote: String,
}

/// Link-preview style attachment shown above a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// A text message to send through an open session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted: Option<MessageKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_preview: Option<LinkPreview>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: None,
            link_preview: None,
        }
    }

    pub fn quoting(mut self, key: MessageKey) -> Self {
        self.quoted = Some(key);
        self
    }

    pub fn with_preview(mut self, preview: LinkPreview) -> Self {
        self.link_preview = Some(preview);
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    /// Client → Bridge: start a protocol session, restoring credentials
    /// when the workspace already holds some.
    #[serde(rename = "open_session")]
    OpenSession {
        protocol_version: u32,
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<serde_json::Value>,
    },

    /// Bridge → Client: the session finished its startup handshake.
    #[serde(rename = "session_ready")]
    SessionReady { registered: bool },

    /// Client → Bridge: ask for a pairing code for a phone number.
    #[serde(rename = "request_pairing_code")]
    RequestPairingCode { request_id: String, phone_number: String },

    /// Bridge → Client: pairing code issued.
    #[serde(rename = "pairing_code")]
    PairingCode { request_id: String, code: String },

    /// Client → Bridge: send a message through the session.
    #[serde(rename = "send_message")]
    SendMessage {
        request_id: String,
        to: String,
        message: OutgoingMessage,
    },

    /// Bridge → Client: message accepted by the service.
    #[serde(rename = "message_sent")]
    MessageSent { request_id: String, key: MessageKey },

    /// Bridge → Client: a request could not be fulfilled.
    #[serde(rename = "request_failed")]
    RequestFailed { request_id: String, error: String },

    /// Bridge → Client: credentials changed and should be persisted.
    #[serde(rename = "creds_update")]
    CredsUpdate {
        credentials: serde_json::Value,
        #[serde(default)]
        registered: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        me: Option<AccountInfo>,
    },

    /// Bridge → Client: connection status changed.
    #[serde(rename = "connection_update")]
    ConnectionUpdate {
        connection: ConnectionState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },

    /// Client → Bridge: tear the protocol session down.
    #[serde(rename = "close_session")]
    CloseSession,

    /// Bidirectional: heartbeat.
    #[serde(rename = "ping")]
    Ping { timestamp: i64 },

    /// Bidirectional: heartbeat response.
    #[serde(rename = "pong")]
    Pong { timestamp: i64 },
}

/// Account details reported with a credentials update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl BridgeMessage {
    /// Translate a connection update into the event the pairing core
    /// consumes.  `connecting` carries no information and maps to `None`.
    pub fn connection_event(&self) -> Option<ConnectionEvent> {
        match self {
            BridgeMessage::ConnectionUpdate {
                connection: ConnectionState::Open,
                ..
            } => Some(ConnectionEvent::Open),
            BridgeMessage::ConnectionUpdate {
                connection: ConnectionState::Close,
                error,
            } => Some(ConnectionEvent::Close {
                reason: error.clone(),
            }),
            _ => None,
        }
    }
}
