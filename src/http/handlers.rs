use super::state::{ActiveSession, AppState};
use crate::scenario;
use crate::session::{run_text_session, ConversationSession};
use crate::storage::User;
use crate::transport::websocket;
use axum::{
    extract::{ws::WebSocket, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Audio,
    Text,
}

impl SessionMode {
    fn as_str(self) -> &'static str {
        match self {
            SessionMode::Audio => "audio",
            SessionMode::Text => "text",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SimulationQuery {
    pub token: Option<String>,
    pub scenario: Option<String>,
    #[serde(default)]
    pub mode: SessionMode,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ScenarioResponse {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /ws/simulation?token=..&scenario=..&mode=audio|text
/// Upgrade to a live simulation session
pub async fn simulation_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SimulationQuery>,
) -> impl IntoResponse {
    let Some(user) = query
        .token
        .as_deref()
        .and_then(|token| state.users.resolve(token))
    else {
        warn!("Rejected simulation upgrade: invalid token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid token".to_string(),
            }),
        )
            .into_response();
    };

    let scenario_key = query.scenario.unwrap_or_default();
    if scenario::lookup(&scenario_key).is_none() {
        warn!("User {} requested unknown scenario: {}", user.username, scenario_key);
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Invalid scenario key".to_string(),
            }),
        )
            .into_response();
    }

    info!(
        "User {} connecting with scenario {} ({} mode)",
        user.username,
        scenario_key,
        query.mode.as_str()
    );

    let mode = query.mode;
    ws.on_upgrade(move |socket| handle_socket(socket, state, user, scenario_key, mode))
        .into_response()
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    user: User,
    scenario_key: String,
    mode: SessionMode,
) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(
            connection_id.clone(),
            ActiveSession {
                username: user.username.clone(),
                scenario_key: scenario_key.clone(),
                mode: mode.as_str(),
                started_at: Utc::now(),
            },
        );
    }

    let (reader, writer) = websocket::split(socket);

    match mode {
        SessionMode::Audio => {
            let session = ConversationSession::new(
                user.clone(),
                scenario_key,
                state.session_config.clone(),
                &state.shutdown,
            );
            match session.run(reader, writer, &state.services).await {
                Ok(stats) => info!(
                    "Session {} for {} finished: {} caller frames, {} replies, recording: {:?}",
                    stats.session_id,
                    stats.username,
                    stats.caller_frames,
                    stats.replies,
                    stats.recording_path
                ),
                Err(e) => error!("Audio session for {} failed to start: {:#}", user.username, e),
            }
        }
        SessionMode::Text => {
            let result = run_text_session(
                reader,
                writer,
                &user,
                &scenario_key,
                state.services.dialogue.clone(),
                state.shutdown.child_token(),
            )
            .await;
            match result {
                Ok(turns) => info!("Text session for {} finished after {} turns", user.username, turns),
                Err(e) => error!("Text session for {} failed: {:#}", user.username, e),
            }
        }
    }

    let mut sessions = state.sessions.write().await;
    sessions.remove(&connection_id);
}

/// GET /scenarios
/// List the scenarios a session can be started with
pub async fn list_scenarios() -> impl IntoResponse {
    let scenarios: Vec<ScenarioResponse> = scenario::all()
        .iter()
        .map(|s| ScenarioResponse {
            key: s.key,
            name: s.name,
            description: s.description,
        })
        .collect();

    (StatusCode::OK, Json(scenarios))
}

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let active_sessions = state.sessions.read().await.len();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            active_sessions,
        }),
    )
}
