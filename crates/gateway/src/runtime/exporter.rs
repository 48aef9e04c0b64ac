//! Credential exporter: runs once the connection opens.
//!
//! 1. Poll (bounded) until the session is registered, knows its account
//!    and the credential artifact is in the workspace
//! 2. Upload it as `<account>.json` and derive the reference token
//! 3. Send the token to the account itself
//! 4. Send a status message quoting the token message

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use pl_domain::config::MessageConfig;
use pl_domain::trace::TraceEvent;
use pl_protocol::{Identity, LinkPreview, MessageKey, OutgoingMessage};
use pl_storage::{reference_token, ArtifactUpload};

use super::error::PairingError;
use super::policy::deadline_after;
use super::session::Session;
use super::PairingContext;

/// Where the credentials ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub filename: String,
    pub locator: String,
    pub token: String,
}

pub async fn export(ctx: &PairingContext, session: &Session) -> Result<ExportReceipt, PairingError> {
    let pairing = &ctx.config.pairing;
    let artifact = session.workspace.path().join(&pairing.credentials_file);

    // Open can arrive before the registered credentials and the account
    // identity; the artifact only counts once both are in.
    let transport = &session.transport;
    let artifact_path = &artifact;
    let linked = poll_until(pairing.credentials_poll(), pairing.credentials_timeout(), || async move {
        if !transport.is_registered() {
            return None;
        }
        let identity = transport.own_identity()?;
        let present = tokio::fs::try_exists(artifact_path).await.unwrap_or(false);
        present.then_some(identity)
    })
    .await;

    let Some(identity) = linked else {
        tracing::error!(
            session_id = %session.session_id,
            path = %artifact.display(),
            registered = session.transport.is_registered(),
            has_identity = session.transport.own_identity().is_some(),
            "registered credentials never appeared"
        );
        return Err(PairingError::MissingCredentials);
    };
    let filename = format!("{}.json", identity.user);

    let upload = ArtifactUpload::from_file(&artifact, filename.clone())
        .await
        .map_err(|e| PairingError::DeliveryFailed(format!("reading credentials: {e}")))?;
    let locator = ctx.archive.upload(upload).await.map_err(|e| {
        tracing::error!(session_id = %session.session_id, error = %e, "credential upload failed");
        PairingError::DeliveryFailed(format!("upload: {e}"))
    })?;
    let token = reference_token(&locator, &ctx.config.storage.locator_prefix).to_owned();

    let message_cfg = &ctx.config.message;
    let token_text = format!("{}{}", message_cfg.token_prefix, token);
    let token_key = send(session, &identity, OutgoingMessage::text(token_text)).await?;
    send(
        session,
        &identity,
        status_message(message_cfg, ctx.timezone, &identity, Utc::now(), token_key),
    )
    .await?;

    TraceEvent::CredentialsExported {
        session_id: session.session_id.clone(),
    }
    .emit();
    tracing::info!(session_id = %session.session_id, filename = %filename, "credentials exported");

    Ok(ExportReceipt {
        filename,
        locator,
        token,
    })
}

async fn send(
    session: &Session,
    identity: &Identity,
    message: OutgoingMessage,
) -> Result<MessageKey, PairingError> {
    session
        .transport
        .send_message(&identity.address, message)
        .await
        .map_err(|e| {
            tracing::error!(session_id = %session.session_id, error = %e, "self-message failed");
            PairingError::DeliveryFailed(format!("send: {e}"))
        })
}

/// Run `check` every `poll` until it yields a value or `timeout` elapses.
/// Always checks at least once.
pub async fn poll_until<T, F, Fut>(poll: Duration, timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = deadline_after(timeout);
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

/// The second self-message: who linked, when, and where to follow the
/// project.  Quotes the token message.
pub fn status_message(
    cfg: &MessageConfig,
    tz: Tz,
    identity: &Identity,
    now: DateTime<Utc>,
    quoted: MessageKey,
) -> OutgoingMessage {
    let linked_at = now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z");
    let account = identity.name.as_deref().unwrap_or(&identity.user);

    let mut text = format!(
        "*{bot}* session linked\n\n\
         Account: {account}\n\
         Owner: {owner}\n\
         Linked at: {linked_at}\n\n\
         Do not share the token above.",
        bot = cfg.bot_name,
        owner = cfg.owner,
    );
    if let Some(channel) = &cfg.channel_url {
        text.push_str(&format!("\n\nUpdates: {channel}"));
    }

    let preview = LinkPreview {
        title: cfg.bot_name.clone(),
        body: format!("by {}", cfg.owner),
        source_url: cfg.project_url.clone().or_else(|| cfg.channel_url.clone()),
        thumbnail_url: cfg.thumbnail_url.clone(),
    };

    OutgoingMessage::text(text).quoting(quoted).with_preview(preview)
}
