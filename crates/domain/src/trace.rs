use serde::Serialize;

/// Structured trace events emitted across all PairLink crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionStarted {
        request_id: String,
        session_id: String,
        attempt: u32,
    },
    PairingCodeIssued {
        session_id: String,
    },
    ConnectionOpened {
        session_id: String,
    },
    ConnectionClosed {
        session_id: String,
        status_code: u16,
        permanent: bool,
    },
    RetryScheduled {
        request_id: String,
        attempt: u32,
        delay_ms: u64,
    },
    ArchiveUpload {
        filename: String,
        status: u16,
        duration_ms: u64,
    },
    CredentialsExported {
        session_id: String,
    },
    WorkspaceRemoved {
        session_id: String,
    },
    SessionCompleted {
        request_id: String,
        outcome: String,
        attempts: u32,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pl_event");
    }
}
