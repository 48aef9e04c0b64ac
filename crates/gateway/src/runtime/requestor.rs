//! Pairing requestor: opens one protocol session for a number and, when the
//! device is not registered yet, obtains the pairing code.

use pl_domain::trace::TraceEvent;
use uuid::Uuid;

use super::error::PairingError;
use super::number::PhoneNumber;
use super::reply::{PairingReply, ReplySlot};
use super::session::Session;
use super::workspace::SessionWorkspace;
use super::PairingContext;

/// Start attempt number `attempt` of request `request_id`.
///
/// Creates a fresh workspace, opens a transport session rooted at it and
/// waits (bounded) for the transport to become ready.  An unregistered
/// session requests a pairing code and hands it to `reply`; a registered
/// one goes straight to monitoring.  On any error the workspace is already
/// gone and the transport session closed.
pub async fn request(
    ctx: &PairingContext,
    request_id: &str,
    number: &PhoneNumber,
    attempt: u32,
    reply: &ReplySlot,
) -> Result<Session, PairingError> {
    let pairing = &ctx.config.pairing;
    let session_id = Uuid::new_v4().to_string();

    let mut workspace = SessionWorkspace::create(&pairing.workspace_root, &session_id)
        .await
        .map_err(|e| PairingError::Unexpected(format!("creating workspace: {e}")))?;

    TraceEvent::SessionStarted {
        request_id: request_id.to_owned(),
        session_id: session_id.clone(),
        attempt,
    }
    .emit();

    let opened = match ctx.transport.open(&session_id, workspace.path()).await {
        Ok(opened) => opened,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "failed to open transport session");
            workspace.remove().await;
            return Err(PairingError::Unexpected(format!("opening session: {e}")));
        }
    };

    let mut session = Session {
        session_id,
        phone_number: number.clone(),
        registered: false,
        workspace,
        transport: opened.session,
        events: opened.events,
    };

    match tokio::time::timeout(pairing.ready_timeout(), session.transport.ready()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            session.teardown().await;
            return Err(PairingError::Unexpected(format!("session setup: {e}")));
        }
        Err(_) => {
            tracing::warn!(
                session_id = %session.session_id,
                timeout_ms = pairing.ready_timeout_ms,
                "transport not ready in time"
            );
            session.teardown().await;
            return Err(PairingError::Unexpected("session was not ready in time".into()));
        }
    }

    session.registered = session.transport.is_registered();
    if session.registered {
        tracing::info!(
            session_id = %session.session_id,
            number = %number.masked(),
            "credentials already registered, skipping pairing code"
        );
        return Ok(session);
    }

    let code = match session.transport.request_pairing_code(number.as_str()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(session_id = %session.session_id, error = %e, "pairing code request failed");
            session.teardown().await;
            return Err(PairingError::Unexpected(format!("requesting pairing code: {e}")));
        }
    };

    TraceEvent::PairingCodeIssued {
        session_id: session.session_id.clone(),
    }
    .emit();
    if !reply.send(PairingReply::Code(code)) {
        tracing::info!(
            session_id = %session.session_id,
            attempt,
            "reply already sent, new pairing code not delivered"
        );
    }

    Ok(session)
}
