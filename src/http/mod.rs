//! HTTP API server
//!
//! - GET /ws/simulation?token=&scenario=&mode= - Upgrade to a live session
//! - GET /scenarios - Scenario catalog
//! - GET /health - Health check with active session count

mod handlers;
mod routes;
mod state;

pub use handlers::SessionMode;
pub use routes::create_router;
pub use state::{ActiveSession, AppState};
