//! Configuration for the airwave engine
//!
//! Compile-time defaults live in the const sub-modules; `EngineConfig`
//! carries the subset a host application may tune at runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Frequency feed configuration
pub mod feed {
    /// Number of amplitude buckets per sample
    pub const BUCKETS: usize = 16;

    /// Upper bound on the emission rate, to keep UI threads unsaturated
    pub const MAX_RATE_HZ: u32 = 20;

    /// Resting value every bucket decays to after stop
    pub const FLOOR: f32 = 0.05;

    /// Highest value a bucket may take while running
    pub const CEILING: f32 = 0.95;

    /// Per-tick multiplier applied to (value - FLOOR) while decaying
    pub const DECAY_FACTOR: f32 = 0.6;

    /// Hard cap on decay ticks; the last tick snaps every bucket to FLOOR
    pub const MAX_DECAY_TICKS: u32 = 12;
}

/// Audio analysis configuration
pub mod audio {
    /// FFT window size for spectrum analysis
    pub const FFT_SIZE: usize = 512;

    /// Exponential smoothing factor (0.0-1.0, higher = slower response)
    pub const SMOOTHING: f32 = 0.7;
}

/// Network-related configuration
pub mod network {
    /// User agent for HTTP requests
    pub const USER_AGENT: &str = concat!("Airwave/", env!("CARGO_PKG_VERSION"));

    /// Connection timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
}

/// Timeout configuration
pub mod timeouts {
    /// Time an open may stay pending before the engine fails it
    pub const OPEN_TIMEOUT_SECS: u64 = 15;

    /// Time after ready without any decoded sample before the stream is declared dead
    pub const NO_AUDIO_TIMEOUT_SECS: u64 = 10;

    /// Time without new samples before a stall is logged
    pub const STREAM_STALL_TIMEOUT_SECS: u64 = 5;
}

/// Runtime configuration for a `PlaybackEngine`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds an open may stay pending before `Timeout`
    pub open_timeout_secs: u64,
    /// Frequency feed tick rate; clamped to `1..=feed::MAX_RATE_HZ`
    pub feed_rate_hz: u32,
    /// Artwork reference published with now-playing metadata
    pub artwork: Option<String>,
    /// Per-subscriber queue depth before the oldest item is dropped
    pub subscriber_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            open_timeout_secs: timeouts::OPEN_TIMEOUT_SECS,
            feed_rate_hz: feed::MAX_RATE_HZ,
            artwork: None,
            subscriber_capacity: 32,
        }
    }
}

impl EngineConfig {
    /// Open timeout as a `Duration`; zero is treated as one second
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs.max(1))
    }

    /// Interval between frequency feed ticks
    pub fn feed_interval(&self) -> Duration {
        let hz = self.feed_rate_hz.clamp(1, feed::MAX_RATE_HZ);
        Duration::from_millis(1000 / hz as u64)
    }

    /// Subscriber queue depth, never below one
    pub fn subscriber_capacity(&self) -> usize {
        self.subscriber_capacity.max(1)
    }
}
