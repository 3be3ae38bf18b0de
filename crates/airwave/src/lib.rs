//! Airwave — live internet radio playback engine
//!
//! Plays one stream at a time, keeps an observable state machine
//! consistent under rapid play/stop/switch and asynchronous backend
//! failures, coordinates with the desktop session, and emits amplitude
//! buckets for a visualizer.
//!
//! ## Quick start
//!
//! ```no_run
//! use airwave::backend::{NativeBackend, SpectrumTap};
//! use airwave::feed::SpectrumFeed;
//! use airwave::session::DesktopSession;
//! use airwave::{EngineConfig, PlaybackEngine, Track};
//!
//! let tap = SpectrumTap::new();
//! let engine = PlaybackEngine::new(
//!     NativeBackend::new(tap.clone()),
//!     DesktopSession::new(),
//!     SpectrumFeed::new(tap),
//!     EngineConfig::default(),
//! )?;
//! engine.play(Track::new("http://radio.example/live.mp3", "Example FM"))?;
//! for state in engine.observe_state() {
//!     println!("{state}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod feed;
pub mod playback;
pub mod session;
pub mod track;

pub use config::EngineConfig;
pub use error::{PlaybackError, Result};
pub use playback::{FrequencySample, NowPlaying, PlaybackEngine, PlaybackState, RemoteCommand};
pub use track::Track;
