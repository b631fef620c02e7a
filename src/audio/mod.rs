pub mod frame;

pub use frame::{pcm16_le_samples, AudioFrame};
