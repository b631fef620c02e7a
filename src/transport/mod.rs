//! Live connection plumbing
//!
//! - `Frame`/`FrameReader`/`FrameWriter`: transport-neutral frame contract
//! - `websocket`: axum WebSocket implementation of that contract
//! - `pumps`: read and write loops bridging the connection and session queues

pub mod frame;
pub mod pumps;
pub mod websocket;

pub use frame::{Frame, FrameKind, FrameReader, FrameWriter};
pub use pumps::{read_pump, write_pump};
