//! Lifecycle monitor: turns the connection event stream of one session into
//! a single decision.
//!
//! ```text
//! AwaitingConnection ──Open──────────────► Exporting
//!         │──Close(401)───────────────────► Failed
//!         │──Close(other)─────────────────► Retrying
//!         └──Close(no reason)─────────────► AwaitingConnection
//! ```
//!
//! `Exporting`, `Retrying` and `Failed` are terminal for the session; any
//! event observed after them is ignored.

use pl_protocol::{ConnectionEvent, ErrorInfo};

use super::policy::{classify, CloseClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    AwaitingConnection,
    Exporting,
    Retrying,
    Failed,
}

impl MonitorState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::AwaitingConnection)
    }
}

/// What the session flow must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorAction {
    /// Connection is open: export the credentials.
    Export,
    /// Transient close: tear down and try again.
    Retry(ErrorInfo),
    /// Credentials rejected: tear down and stop.
    Fail(ErrorInfo),
    Ignore,
}

#[derive(Debug)]
pub struct LifecycleMonitor {
    session_id: String,
    state: MonitorState,
}

impl LifecycleMonitor {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: MonitorState::AwaitingConnection,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn observe(&mut self, event: ConnectionEvent) -> MonitorAction {
        if self.state.is_terminal() {
            tracing::debug!(
                session_id = %self.session_id,
                state = ?self.state,
                event = ?event,
                "event after terminal state ignored"
            );
            return MonitorAction::Ignore;
        }

        match event {
            ConnectionEvent::Open => {
                tracing::info!(session_id = %self.session_id, "connection open");
                self.state = MonitorState::Exporting;
                MonitorAction::Export
            }
            ConnectionEvent::Close { reason: None } => {
                tracing::debug!(session_id = %self.session_id, "close without reason ignored");
                MonitorAction::Ignore
            }
            ConnectionEvent::Close { reason: Some(info) } => {
                let class = classify(&info);
                tracing::warn!(
                    session_id = %self.session_id,
                    status_code = info.status_code,
                    message = %info.message,
                    permanent = class == CloseClass::Permanent,
                    "connection closed"
                );
                match class {
                    CloseClass::Permanent => {
                        self.state = MonitorState::Failed;
                        MonitorAction::Fail(info)
                    }
                    CloseClass::Transient => {
                        self.state = MonitorState::Retrying;
                        MonitorAction::Retry(info)
                    }
                }
            }
        }
    }
}
