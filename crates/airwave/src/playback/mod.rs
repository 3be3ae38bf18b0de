//! Playback engine, its observable types and the broadcast they travel on

pub mod bus;
pub mod engine;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use bus::{Broadcast, Subscription};
pub use engine::PlaybackEngine;
pub use types::{FrequencySample, NowPlaying, PlaybackState, RemoteCommand, StreamDetails};
