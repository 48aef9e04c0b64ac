//! One pairing request, end to end.
//!
//! [`run_session`] drives attempts until one reaches a terminal state:
//!
//! - requestor opens a session (and usually issues a pairing code)
//! - the lifecycle monitor waits for the connection to open or close
//! - open: the exporter archives and relays the credentials
//! - transient close: tear down, back off, start a fresh attempt
//! - unauthorized close, export failure, deadline: tear down and stop
//!
//! Every attempt tears down its transport session and workspace before the
//! next one starts.  The request gets exactly one reply through its
//! [`ReplySlot`], whichever attempt produces it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pl_domain::trace::TraceEvent;
use pl_protocol::{ConnectionEvent, ErrorInfo};
use pl_transport::TransportSession;
use tokio::sync::mpsc;

use super::error::PairingError;
use super::exporter::{self, ExportReceipt};
use super::monitor::{LifecycleMonitor, MonitorAction};
use super::number::PhoneNumber;
use super::policy::{self, RetryBackoff};
use super::reply::{PairingReply, ReplySlot};
use super::requestor;
use super::workspace::SessionWorkspace;
use super::PairingContext;

/// Status reported when the transport's event stream ends without a close.
const EVENT_STREAM_ENDED_STATUS: u16 = 503;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session (one attempt)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A live attempt: its workspace, transport handle and event stream.
pub struct Session {
    pub session_id: String,
    pub phone_number: PhoneNumber,
    /// Stored credentials already authenticate a device.
    pub registered: bool,
    pub workspace: SessionWorkspace,
    pub transport: Arc<dyn TransportSession>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl Session {
    /// Close the transport session, stop listening and delete the
    /// workspace.  Safe to call more than once.
    pub async fn teardown(&mut self) {
        self.transport.close().await;
        self.events.close();
        self.workspace.remove().await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a pairing request ended.  Handed to the supervisor, which decides
/// what the process does next.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub request_id: String,
    pub phone_number: PhoneNumber,
    pub attempts: u32,
    pub duration: Duration,
    pub result: Result<ExportReceipt, PairingError>,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn label(&self) -> &'static str {
        match &self.result {
            Ok(_) => "exported",
            Err(e) => e.kind(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Flow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum AttemptEnd {
    Done(Result<ExportReceipt, PairingError>),
    Retry(ErrorInfo),
}

pub async fn run_session(
    ctx: &PairingContext,
    request_id: &str,
    number: PhoneNumber,
    reply: &ReplySlot,
) -> SessionOutcome {
    let started = Instant::now();
    let backoff = RetryBackoff::from_config(&ctx.config.pairing.retry);
    let mut attempt: u32 = 1;

    let result = loop {
        match run_attempt(ctx, request_id, &number, attempt, reply).await {
            AttemptEnd::Done(result) => break result,
            AttemptEnd::Retry(info) => {
                let retries_done = attempt - 1;
                if backoff.should_give_up(retries_done) {
                    tracing::warn!(request_id, attempt, "no retries left");
                    break Err(if backoff.max_retries == 0 {
                        PairingError::TransientConnection {
                            status_code: info.status_code,
                            message: info.message,
                        }
                    } else {
                        PairingError::RetriesExhausted(retries_done)
                    });
                }

                let delay = backoff.delay_for_retry(retries_done);
                TraceEvent::RetryScheduled {
                    request_id: request_id.to_owned(),
                    attempt: attempt + 1,
                    delay_ms: delay.as_millis() as u64,
                }
                .emit();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    };

    match &result {
        Ok(_) => reply.send(PairingReply::Linked),
        Err(e) => reply.send(PairingReply::Failed(e.clone())),
    };

    SessionOutcome {
        request_id: request_id.to_owned(),
        phone_number: number,
        attempts: attempt,
        duration: started.elapsed(),
        result,
    }
}

async fn run_attempt(
    ctx: &PairingContext,
    request_id: &str,
    number: &PhoneNumber,
    attempt: u32,
    reply: &ReplySlot,
) -> AttemptEnd {
    let mut session = match requestor::request(ctx, request_id, number, attempt, reply).await {
        Ok(session) => session,
        Err(e) => return AttemptEnd::Done(Err(e)),
    };

    let mut monitor = LifecycleMonitor::new(session.session_id.clone());
    let deadline = policy::deadline_after(ctx.config.pairing.session_timeout());

    let end = loop {
        let event = match tokio::time::timeout_at(deadline, session.events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::warn!(session_id = %session.session_id, "event stream ended");
                break AttemptEnd::Retry(ErrorInfo::new(
                    EVENT_STREAM_ENDED_STATUS,
                    "event stream ended",
                ));
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    timeout_secs = ctx.config.pairing.session_timeout_secs,
                    "session expired"
                );
                break AttemptEnd::Done(Err(PairingError::Expired));
            }
        };

        match monitor.observe(event) {
            MonitorAction::Ignore => continue,
            MonitorAction::Export => {
                TraceEvent::ConnectionOpened {
                    session_id: session.session_id.clone(),
                }
                .emit();
                break AttemptEnd::Done(exporter::export(ctx, &session).await);
            }
            MonitorAction::Retry(info) => break AttemptEnd::Retry(info),
            MonitorAction::Fail(info) => {
                trace_close(&session, &info, true);
                break AttemptEnd::Done(Err(PairingError::AuthenticationFailure));
            }
        }
    };

    if let AttemptEnd::Retry(info) = &end {
        trace_close(&session, info, false);
    }
    session.teardown().await;
    end
}

fn trace_close(session: &Session, info: &ErrorInfo, permanent: bool) {
    TraceEvent::ConnectionClosed {
        session_id: session.session_id.clone(),
        status_code: info.status_code,
        permanent,
    }
    .emit();
}
