//! In-memory transport and archive used by runtime and API tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pl_domain::config::Config;
use pl_domain::{Error, Result};
use pl_protocol::{ConnectionEvent, ErrorInfo, Identity, MessageKey, OutgoingMessage};
use pl_storage::{ArchiveStore, ArtifactUpload};
use pl_transport::{OpenedSession, Transport, TransportSession};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use super::PairingContext;

pub const ACCOUNT: &str = "15551234567:7@s.whatsapp.net";
pub const LOCATOR: &str = "https://storage.example/file/ABC123";

// ── Script ──────────────────────────────────────────────────────────

/// How one `open()` call behaves.
#[derive(Debug, Clone)]
pub struct FakeAttempt {
    pub fail_open: bool,
    pub ready: bool,
    pub registered: bool,
    /// The phone enters the code: the session becomes registered once a
    /// pairing code was requested.
    pub links: bool,
    /// `None` makes the pairing code request fail.
    pub code: Option<String>,
    pub identity: Option<Identity>,
    pub write_creds: bool,
    pub events: Vec<ConnectionEvent>,
    /// Keep the event stream open after the scripted events.
    pub hold_open: bool,
    pub fail_send: bool,
}

impl FakeAttempt {
    pub fn unregistered() -> Self {
        Self {
            fail_open: false,
            ready: true,
            registered: false,
            links: true,
            code: Some("ABCD-1234".into()),
            identity: Identity::from_address(ACCOUNT, Some("Ada".into())),
            write_creds: true,
            events: Vec::new(),
            hold_open: true,
            fail_send: false,
        }
    }

    pub fn registered() -> Self {
        Self {
            registered: true,
            code: None,
            ..Self::unregistered()
        }
    }

    pub fn events(mut self, events: Vec<ConnectionEvent>) -> Self {
        self.events = events;
        self
    }
}

pub fn close(status: u16) -> ConnectionEvent {
    ConnectionEvent::Close {
        reason: Some(ErrorInfo::new(status, "connection closed")),
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// One `open()` call as observed by the fake.
#[derive(Clone)]
pub struct OpenRecord {
    pub session_id: String,
    pub workspace: PathBuf,
    /// Whether any earlier attempt's workspace still existed at open time.
    pub earlier_workspace_present: bool,
    pub session: Arc<FakeSession>,
}

#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<FakeAttempt>>,
    pub opened: Mutex<Vec<OpenRecord>>,
}

impl FakeTransport {
    pub fn new(script: Vec<FakeAttempt>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        self.opened.lock()[index].session.clone()
    }

    pub fn workspace(&self, index: usize) -> PathBuf {
        self.opened.lock()[index].workspace.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, session_id: &str, workspace: &Path) -> Result<OpenedSession> {
        let attempt = self
            .script
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Transport("fake transport script exhausted".into()))?;
        if attempt.fail_open {
            return Err(Error::Transport("bridge unreachable".into()));
        }

        if attempt.write_creds {
            std::fs::write(workspace.join("creds.json"), br#"{"noise_key":"k"}"#)?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for event in &attempt.events {
            let _ = tx.send(event.clone());
        }
        let session = Arc::new(FakeSession {
            attempt: attempt.clone(),
            events_tx: Mutex::new(attempt.hold_open.then_some(tx)),
            code_requests: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            close_calls: AtomicU32::new(0),
        });

        let mut opened = self.opened.lock();
        let earlier_workspace_present = opened.iter().any(|r| r.workspace.exists());
        opened.push(OpenRecord {
            session_id: session_id.to_owned(),
            workspace: workspace.to_path_buf(),
            earlier_workspace_present,
            session: session.clone(),
        });

        Ok(OpenedSession {
            session,
            events: rx,
        })
    }
}

pub struct FakeSession {
    attempt: FakeAttempt,
    events_tx: Mutex<Option<mpsc::UnboundedSender<ConnectionEvent>>>,
    pub code_requests: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<(String, OutgoingMessage)>>,
    pub close_calls: AtomicU32,
}

impl FakeSession {
    pub fn closed(&self) -> bool {
        self.close_calls.load(Ordering::SeqCst) > 0
    }

    pub fn sent(&self) -> Vec<(String, OutgoingMessage)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl TransportSession for FakeSession {
    async fn ready(&self) -> Result<()> {
        if !self.attempt.ready {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn is_registered(&self) -> bool {
        self.attempt.registered || (self.attempt.links && !self.code_requests.lock().is_empty())
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String> {
        self.code_requests.lock().push(phone_number.to_owned());
        self.attempt
            .code
            .clone()
            .ok_or_else(|| Error::Transport("pairing code refused".into()))
    }

    fn own_identity(&self) -> Option<Identity> {
        self.attempt.identity.clone()
    }

    async fn send_message(&self, to: &str, message: OutgoingMessage) -> Result<MessageKey> {
        if self.attempt.fail_send {
            return Err(Error::Transport("send refused".into()));
        }
        let mut sent = self.sent.lock();
        sent.push((to.to_owned(), message));
        Ok(MessageKey {
            id: format!("MSG{}", sent.len()),
            remote: to.to_owned(),
        })
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.events_tx.lock().take();
    }
}

// ── Archive ─────────────────────────────────────────────────────────

pub struct FakeArchive {
    locator: std::result::Result<String, String>,
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeArchive {
    pub fn returning(locator: &str) -> Self {
        Self {
            locator: Ok(locator.into()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            locator: Err("bucket offline".into()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl ArchiveStore for FakeArchive {
    async fn upload(&self, mut artifact: ArtifactUpload) -> Result<String> {
        let mut body = Vec::new();
        artifact.reader.read_to_end(&mut body).await?;
        self.uploads.lock().push((artifact.filename, body));
        self.locator.clone().map_err(Error::Storage)
    }
}

// ── Context ─────────────────────────────────────────────────────────

/// Config with millisecond timings rooted at `root`.
pub fn fast_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.pairing.workspace_root = root.to_path_buf();
    config.pairing.ready_timeout_ms = 200;
    config.pairing.credentials_poll_ms = 5;
    config.pairing.credentials_timeout_ms = 50;
    config.pairing.session_timeout_secs = 5;
    config.pairing.retry.initial_delay_ms = 1;
    config.pairing.retry.max_delay_ms = 5;
    config.pairing.retry.max_attempts = 2;
    config
}

pub fn context(
    config: Config,
    transport: Arc<FakeTransport>,
    archive: Arc<FakeArchive>,
) -> PairingContext {
    PairingContext {
        timezone: config.message.tz().unwrap(),
        config: Arc::new(config),
        transport,
        archive,
    }
}
