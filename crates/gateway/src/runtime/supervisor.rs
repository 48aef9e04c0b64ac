//! Session supervisor: owns every in-flight pairing request.
//!
//! Each request runs on its own task.  The supervisor keeps a registry of
//! active requests for the API, emits `SessionCompleted` when one ends and
//! broadcasts its [`SessionOutcome`] so the host can decide what the
//! process does next (keep serving, or shut down after one session).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pl_domain::trace::TraceEvent;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::error::PairingError;
use super::number::PhoneNumber;
use super::reply::{PairingReply, ReplySlot};
use super::session::{run_session, SessionOutcome};
use super::PairingContext;

/// Registry entry for a request that has not finished yet.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSession {
    pub request_id: String,
    /// Masked number (last four digits).
    pub phone_number: String,
    pub started_at: DateTime<Utc>,
}

pub struct SessionSupervisor {
    ctx: PairingContext,
    active: RwLock<HashMap<String, ActiveSession>>,
    completions: broadcast::Sender<SessionOutcome>,
}

impl SessionSupervisor {
    pub fn new(ctx: PairingContext) -> Self {
        let (completions, _) = broadcast::channel(64);
        Self {
            ctx,
            active: RwLock::new(HashMap::new()),
            completions,
        }
    }

    pub fn context(&self) -> &PairingContext {
        &self.ctx
    }

    /// Validate `raw_number` and start pairing it.
    ///
    /// An invalid number is rejected here, before any workspace or
    /// transport session exists.
    pub fn start(self: &Arc<Self>, raw_number: &str) -> Result<PendingPairing, PairingError> {
        let number = PhoneNumber::parse(raw_number)?;
        let request_id = Uuid::new_v4().to_string();
        let (slot, reply_rx) = ReplySlot::new();

        self.active.write().insert(
            request_id.clone(),
            ActiveSession {
                request_id: request_id.clone(),
                phone_number: number.masked(),
                started_at: Utc::now(),
            },
        );
        tracing::info!(request_id = %request_id, number = %number.masked(), "pairing requested");

        let guard = ActiveGuard {
            supervisor: self.clone(),
            request_id: request_id.clone(),
        };
        let task_request_id = request_id.clone();
        let handle = tokio::spawn(async move {
            let supervisor = guard.supervisor.clone();
            let outcome = run_session(&supervisor.ctx, &task_request_id, number, &slot).await;
            drop(guard);
            supervisor.complete(&outcome);
            outcome
        });

        Ok(PendingPairing {
            request_id,
            reply: reply_rx,
            task: SessionTask { handle },
        })
    }

    /// Requests still in flight, oldest first.
    pub fn active(&self) -> Vec<ActiveSession> {
        let mut list: Vec<ActiveSession> = self.active.read().values().cloned().collect();
        list.sort_by_key(|s| s.started_at);
        list
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Receive every outcome from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionOutcome> {
        self.completions.subscribe()
    }

    fn complete(&self, outcome: &SessionOutcome) {
        TraceEvent::SessionCompleted {
            request_id: outcome.request_id.clone(),
            outcome: outcome.label().to_owned(),
            attempts: outcome.attempts,
            duration_ms: outcome.duration.as_millis() as u64,
        }
        .emit();
        match &outcome.result {
            Ok(receipt) => tracing::info!(
                request_id = %outcome.request_id,
                filename = %receipt.filename,
                attempts = outcome.attempts,
                "pairing session succeeded"
            ),
            Err(e) => tracing::warn!(
                request_id = %outcome.request_id,
                error = %e,
                attempts = outcome.attempts,
                "pairing session failed"
            ),
        }
        // No subscribers is fine.
        let _ = self.completions.send(outcome.clone());
    }
}

/// Removes a request from the registry when its task ends, even by panic.
struct ActiveGuard {
    supervisor: Arc<SessionSupervisor>,
    request_id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.supervisor.active.write().remove(&self.request_id);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A started request whose reply has not been read yet.
pub struct PendingPairing {
    pub request_id: String,
    reply: oneshot::Receiver<PairingReply>,
    task: SessionTask,
}

impl PendingPairing {
    /// Wait for the request's reply.  The session keeps running after
    /// this returns; the [`SessionTask`] resolves when it ends.
    pub async fn reply(self) -> (PairingReply, SessionTask) {
        let reply = self.reply.await.unwrap_or_else(|_| {
            PairingReply::Failed(PairingError::Unexpected(
                "session ended without replying".into(),
            ))
        });
        (reply, self.task)
    }
}

/// The task running a session.  Dropping it detaches the task.
pub struct SessionTask {
    handle: JoinHandle<SessionOutcome>,
}

impl SessionTask {
    pub async fn outcome(self) -> Result<SessionOutcome, PairingError> {
        self.handle
            .await
            .map_err(|e| PairingError::Unexpected(format!("session task failed: {e}")))
    }
}
