//! Conversation recording: caller base track, timestamped reply chunks, and
//! the offline merge into one playable file

mod archiver;
mod chunk;
pub mod mix;

pub use archiver::{run_archiver, ArchiveChunk, ConversationArchiver};
pub use chunk::ChunkMetadata;
pub use mix::{EncoderSettings, MixGraph, MixPlan};
