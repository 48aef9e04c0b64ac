//! WebSocket client for the messaging bridge.
//!
//! One WebSocket connection per pairing session:
//!
//! 1. Connect (with `token=<PL_BRIDGE_TOKEN>` query param when set)
//! 2. Send `open_session`, carrying any credentials already in the workspace
//! 3. Reader task: resolve pending requests, persist `creds_update`, forward
//!    `connection_update` as [`ConnectionEvent`]s, answer pings
//! 4. Writer task: drain the outbound queue into the socket
//! 5. `close()` sends `close_session` and cancels both tasks

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pl_domain::config::BridgeConfig;
use pl_domain::{Error, Result};
use pl_protocol::{
    BridgeMessage, ConnectionEvent, ErrorInfo, Identity, MessageKey, OutgoingMessage,
    PROTOCOL_VERSION,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::creds::CredentialStore;
use crate::session::{OpenedSession, Transport, TransportSession};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Close status reported when the bridge connection drops without a
/// `connection_update`.  Classified like any other transient close.
pub const BRIDGE_LOST_STATUS: u16 = 503;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Opens protocol sessions through the bridge.
#[derive(Debug, Clone)]
pub struct BridgeTransport {
    url: String,
    token: Option<String>,
    credentials_file: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl BridgeTransport {
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        credentials_file: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            token,
            credentials_file: credentials_file.into(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(20),
        }
    }

    /// Build from config, reading the token from `cfg.token_env`.
    pub fn from_config(cfg: &BridgeConfig, credentials_file: &str) -> Self {
        let token = std::env::var(&cfg.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                env = %cfg.token_env,
                "bridge token not set, connecting without authentication"
            );
        }
        Self::new(cfg.url.clone(), token, credentials_file).with_timeouts(
            Duration::from_millis(cfg.connect_timeout_ms),
            Duration::from_millis(cfg.request_timeout_ms),
        )
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    fn build_url(&self, session_id: &str) -> String {
        let base = &self.url;
        let sep = if base.contains('?') { "&" } else { "?" };

        match &self.token {
            Some(token) => format!("{base}{sep}token={token}&session_id={session_id}"),
            None => format!("{base}{sep}session_id={session_id}"),
        }
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn open(&self, session_id: &str, workspace: &Path) -> Result<OpenedSession> {
        let store = CredentialStore::new(workspace.join(&self.credentials_file));
        let credentials = store.load().await?;

        let url = self.build_url(session_id);
        tracing::debug!(session_id, url = %self.url, "connecting to bridge");

        let (ws, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(&url))
                .await
                .map_err(|_| {
                    Error::Timeout(format!(
                        "bridge connect exceeded {}ms",
                        self.connect_timeout.as_millis()
                    ))
                })?
                .map_err(|e| Error::Transport(format!("bridge connect: {e}")))?;
        let (mut sink, stream) = ws.split();

        let hello = BridgeMessage::OpenSession {
            protocol_version: PROTOCOL_VERSION,
            session_id: session_id.to_owned(),
            credentials,
        };
        send_json(&mut sink, &hello).await?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<BridgeMessage>(32);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(false);
        let shared = Arc::new(Shared::default());
        let cancel = CancellationToken::new();

        tokio::spawn(write_loop(sink, outbound_rx, cancel.clone()));
        tokio::spawn(
            ReadLoop {
                session_id: session_id.to_owned(),
                stream,
                shared: shared.clone(),
                store,
                events_tx,
                ready_tx,
                outbound: outbound_tx.clone(),
                cancel: cancel.clone(),
            }
            .run(),
        );

        let session = BridgeSession {
            session_id: session_id.to_owned(),
            outbound: outbound_tx,
            shared,
            ready: ready_rx,
            cancel,
            request_timeout: self.request_timeout,
            closed: AtomicBool::new(false),
        };

        Ok(OpenedSession {
            session: Arc::new(session),
            events: events_rx,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Reply {
    PairingCode(String),
    Sent(MessageKey),
    Failed(String),
}

/// State shared between a session handle and its reader task.
#[derive(Default)]
struct Shared {
    registered: AtomicBool,
    identity: Mutex<Option<Identity>>,
    /// request_id → waiting caller.
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
}

struct BridgeSession {
    session_id: String,
    outbound: mpsc::Sender<BridgeMessage>,
    shared: Arc<Shared>,
    ready: watch::Receiver<bool>,
    cancel: CancellationToken,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl BridgeSession {
    async fn request(&self, request_id: String, msg: BridgeMessage) -> Result<Reply> {
        if self.closed.load(Ordering::Acquire) || self.cancel.is_cancelled() {
            return Err(Error::Transport("session is closed".into()));
        }

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(request_id.clone(), tx);

        if self.outbound.send(msg).await.is_err() {
            self.shared.pending.lock().remove(&request_id);
            return Err(Error::Transport("bridge writer stopped".into()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::Transport(
                "bridge connection closed before replying".into(),
            )),
            Err(_) => {
                self.shared.pending.lock().remove(&request_id);
                Err(Error::Timeout(format!(
                    "bridge did not answer within {}ms",
                    self.request_timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl TransportSession for BridgeSession {
    async fn ready(&self) -> Result<()> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|r| *r)
            .await
            .map(|_| ())
            .map_err(|_| Error::Transport("bridge closed before the session was ready".into()))
    }

    fn is_registered(&self) -> bool {
        self.shared.registered.load(Ordering::Acquire)
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let msg = BridgeMessage::RequestPairingCode {
            request_id: request_id.clone(),
            phone_number: phone_number.to_owned(),
        };
        match self.request(request_id, msg).await? {
            Reply::PairingCode(code) => Ok(code),
            Reply::Failed(e) => Err(Error::Transport(format!("pairing code request failed: {e}"))),
            Reply::Sent(_) => Err(Error::Transport(
                "bridge answered a pairing code request with message_sent".into(),
            )),
        }
    }

    fn own_identity(&self) -> Option<Identity> {
        self.shared.identity.lock().clone()
    }

    async fn send_message(&self, to: &str, message: OutgoingMessage) -> Result<MessageKey> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let msg = BridgeMessage::SendMessage {
            request_id: request_id.clone(),
            to: to.to_owned(),
            message,
        };
        match self.request(request_id, msg).await? {
            Reply::Sent(key) => Ok(key),
            Reply::Failed(e) => Err(Error::Transport(format!("send failed: {e}"))),
            Reply::PairingCode(_) => Err(Error::Transport(
                "bridge answered a send with pairing_code".into(),
            )),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(session_id = %self.session_id, "closing bridge session");
        let _ = tokio::time::timeout(
            Duration::from_secs(1),
            self.outbound.send(BridgeMessage::CloseSession),
        )
        .await;
        self.cancel.cancel();
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reader / writer tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ReadLoop {
    session_id: String,
    stream: SplitStream<WsStream>,
    shared: Arc<Shared>,
    store: CredentialStore,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ready_tx: watch::Sender<bool>,
    outbound: mpsc::Sender<BridgeMessage>,
    cancel: CancellationToken,
}

impl ReadLoop {
    async fn run(mut self) {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = self.stream.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => self.dispatch(&text).await,
                Some(Ok(Message::Close(_))) | None => {
                    self.connection_lost("bridge closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.connection_lost(&format!("bridge read error: {e}"));
                    break;
                }
            }
        }
        // Dropping the senders fails every in-flight request.
        self.shared.pending.lock().clear();
    }

    async fn dispatch(&mut self, text: &str) {
        let msg = match serde_json::from_str::<BridgeMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "unparseable bridge message");
                return;
            }
        };

        if let Some(event) = msg.connection_event() {
            if self.events_tx.send(event).is_err() {
                tracing::debug!(session_id = %self.session_id, "event receiver gone, dropping connection update");
            }
            return;
        }

        match msg {
            BridgeMessage::SessionReady { registered } => {
                self.shared.registered.store(registered, Ordering::Release);
                let _ = self.ready_tx.send(true);
            }
            BridgeMessage::PairingCode { request_id, code } => {
                self.complete(&request_id, Reply::PairingCode(code));
            }
            BridgeMessage::MessageSent { request_id, key } => {
                self.complete(&request_id, Reply::Sent(key));
            }
            BridgeMessage::RequestFailed { request_id, error } => {
                self.complete(&request_id, Reply::Failed(error));
            }
            BridgeMessage::CredsUpdate {
                credentials,
                registered,
                me,
            } => {
                // Registered only once those credentials are on disk.
                match self.store.save(&credentials).await {
                    Ok(()) if registered => {
                        self.shared.registered.store(true, Ordering::Release);
                    }
                    Ok(()) => {}
                    Err(e) => {
                        tracing::warn!(session_id = %self.session_id, error = %e, "failed to persist credentials");
                    }
                }
                if let Some(me) = me {
                    *self.shared.identity.lock() = Identity::from_address(&me.id, me.name);
                }
            }
            BridgeMessage::Ping { timestamp } => {
                let _ = self.outbound.send(BridgeMessage::Pong { timestamp }).await;
            }
            other => {
                tracing::debug!(session_id = %self.session_id, message = ?other, "ignoring bridge message");
            }
        }
    }

    fn complete(&self, request_id: &str, reply: Reply) {
        match self.shared.pending.lock().remove(request_id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => {
                tracing::debug!(session_id = %self.session_id, request_id, "reply for unknown request");
            }
        }
    }

    /// The socket went away without a `connection_update`.  Unless we
    /// closed it ourselves, surface it as a transient close.
    fn connection_lost(&self, reason: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::warn!(session_id = %self.session_id, reason, "bridge connection lost");
        let _ = self.events_tx.send(ConnectionEvent::Close {
            reason: Some(ErrorInfo::new(BRIDGE_LOST_STATUS, reason)),
        });
        self.cancel.cancel();
    }
}

async fn write_loop(
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<BridgeMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            // Flush queued messages (close_session in particular) before
            // honouring cancellation.
            biased;
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = send_json(&mut sink, &msg).await {
                        tracing::debug!(error = %e, "bridge writer stopping");
                        break;
                    }
                }
                None => break,
            },
            _ = cancel.cancelled() => break,
        }
    }
    let _ = sink.close().await;
}

async fn send_json(sink: &mut WsSink, msg: &BridgeMessage) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| Error::Transport(format!("bridge write: {e}")))
}
