//! Error types for Airwave
//!
//! Centralized error handling using thiserror. `PlaybackError` is the
//! public taxonomy surfaced through `PlaybackState::Failed`; `BackendError`
//! and `SessionError` stay on their side of the engine boundary.

use std::time::Duration;

use thiserror::Error;

/// Playback failures visible to engine callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Caller error, rejected before any resource is touched
    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    /// The stream could not be opened (network, probe, decoder)
    #[error("Could not open stream: {0}")]
    BackendOpenFailure(String),

    /// The stream died while playing
    #[error("Stream failed: {0}")]
    BackendRuntimeFailure(String),

    /// Open neither succeeded nor failed in time
    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The platform refused background/focus configuration (non-fatal)
    #[error("Session grant denied: {0}")]
    SessionGrantDenied(String),
}

/// Result type alias for the public engine API
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Errors raised inside a stream backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{}", friendly_network_error(.0))]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Audio error: {0}")]
    Audio(String),
}

/// Errors raised by a session coordinator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Denied: {0}")]
    Denied(String),

    #[error("No session grant held")]
    NoGrant,

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Errors raised while constructing an engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if e.is_status() {
        if let Some(status) = e.status() {
            return format!("HTTP {status}");
        }
    }
    format!("Network error: {e}")
}
