use crate::session::{SessionConfig, SessionServices};
use crate::storage::UserDirectory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// A session currently attached to a connection
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSession {
    pub username: String,
    pub scenario_key: String,
    pub mode: &'static str,
    pub started_at: DateTime<Utc>,
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub services: SessionServices,

    pub users: Arc<dyn UserDirectory>,

    pub session_config: SessionConfig,

    /// Parent of every session's cancellation token
    pub shutdown: CancellationToken,

    /// Live sessions (connection id → session)
    pub sessions: Arc<RwLock<HashMap<String, ActiveSession>>>,
}

impl AppState {
    pub fn new(
        services: SessionServices,
        users: Arc<dyn UserDirectory>,
        session_config: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            services,
            users,
            session_config,
            shutdown,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
