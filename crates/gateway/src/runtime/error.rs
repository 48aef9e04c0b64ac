use thiserror::Error;

/// Why a pairing session ended without exporting credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    #[error("invalid phone number")]
    InvalidInput,
    #[error("connection closed ({status_code}): {message}")]
    TransientConnection { status_code: u16, message: String },
    #[error("authentication rejected")]
    AuthenticationFailure,
    #[error("credentials were not written")]
    MissingCredentials,
    #[error("credential delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("gave up after {0} retries")]
    RetriesExhausted(u32),
    #[error("session expired")]
    Expired,
    #[error("service unavailable: {0}")]
    Unexpected(String),
}

impl PairingError {
    /// HTTP status returned to the requester.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::AuthenticationFailure => 401,
            Self::MissingCredentials | Self::DeliveryFailed(_) => 500,
            Self::TransientConnection { .. }
            | Self::RetriesExhausted(_)
            | Self::Expired
            | Self::Unexpected(_) => 503,
        }
    }

    /// Short label used in trace events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::TransientConnection { .. } => "transient_connection",
            Self::AuthenticationFailure => "authentication_failure",
            Self::MissingCredentials => "missing_credentials",
            Self::DeliveryFailed(_) => "delivery_failed",
            Self::RetriesExhausted(_) => "retries_exhausted",
            Self::Expired => "expired",
            Self::Unexpected(_) => "unexpected",
        }
    }
}
