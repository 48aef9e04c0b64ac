use std::sync::Arc;

use pl_domain::config::Config;

use crate::runtime::SessionSupervisor;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub supervisor: Arc<SessionSupervisor>,
    /// Notified to stop the HTTP server gracefully.
    pub shutdown_tx: Arc<tokio::sync::Notify>,
}
