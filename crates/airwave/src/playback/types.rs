//! Shared playback types
//!
//! Pure data types observed by engine subscribers.

use std::fmt;

use crate::config::feed::{BUCKETS, CEILING, FLOOR};
use crate::error::PlaybackError;
use crate::track::Track;

/// Current playback state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Starting(Track),
    Playing(Track),
    Stopping,
    Failed(Track, PlaybackError),
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }

    /// Track of the current episode, if any
    pub fn track(&self) -> Option<&Track> {
        match self {
            PlaybackState::Starting(t)
            | PlaybackState::Playing(t)
            | PlaybackState::Failed(t, _) => Some(t),
            PlaybackState::Idle | PlaybackState::Stopping => None,
        }
    }

    /// Short state name for logs and status lines
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "Idle",
            PlaybackState::Starting(_) => "Starting",
            PlaybackState::Playing(_) => "Playing",
            PlaybackState::Stopping => "Stopping",
            PlaybackState::Failed(..) => "Failed",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Failed(track, err) => write!(f, "Failed({}: {})", track.url(), err),
            PlaybackState::Starting(track) | PlaybackState::Playing(track) => {
                write!(f, "{}({})", self.name(), track.url())
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Transport command raised by the OS lock-screen / notification surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    PlayRequested,
    PauseRequested,
}

/// One snapshot of amplitude buckets for a visualizer.
///
/// Every bucket is kept inside `[FLOOR, CEILING]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencySample {
    buckets: [f32; BUCKETS],
}

impl FrequencySample {
    /// Build a sample, clamping every value into `[FLOOR, CEILING]`.
    /// NaN maps to the floor.
    pub fn new(values: [f32; BUCKETS]) -> Self {
        let mut buckets = values;
        for v in buckets.iter_mut() {
            *v = if v.is_nan() { FLOOR } else { v.clamp(FLOOR, CEILING) };
        }
        Self { buckets }
    }

    /// All buckets at the resting floor
    pub fn resting() -> Self {
        Self {
            buckets: [FLOOR; BUCKETS],
        }
    }

    pub fn buckets(&self) -> &[f32; BUCKETS] {
        &self.buckets
    }

    pub fn is_resting(&self) -> bool {
        self.buckets.iter().all(|&v| v <= FLOOR)
    }
}

impl Default for FrequencySample {
    fn default() -> Self {
        Self::resting()
    }
}

/// Codec information reported by the backend once a stream is ready
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDetails {
    pub codec_name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub bitrate: Option<u32>,
    pub station_name: Option<String>,
}

impl fmt::Display for StreamDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel_str = if self.channels == 1 { "Mono" } else { "Stereo" };
        write!(f, "{}", self.codec_name)?;
        if let Some(br) = self.bitrate {
            write!(f, " · {} kbps", br)?;
        }
        write!(f, " · {} Hz · {}", self.sample_rate, channel_str)
    }
}

/// Lock-screen / notification metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub subtitle: String,
    pub artwork: Option<String>,
    pub is_live: bool,
}

impl NowPlaying {
    /// Metadata for a track; the subtitle starts as the tag line
    pub fn for_track(track: &Track, artwork: Option<String>) -> Self {
        let title = if track.label().is_empty() {
            track.url().to_string()
        } else {
            track.label().to_string()
        };
        Self {
            title,
            subtitle: track.tag_line(),
            artwork,
            is_live: true,
        }
    }
}
