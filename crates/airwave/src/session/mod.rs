//! Platform session coordination
//!
//! A `SessionCoordinator` owns whatever the host OS needs for continuous
//! background audio: audio focus, sleep/background inhibition, remote
//! transport controls and now-playing metadata. All of it is acquired as
//! one `SessionGrant` when an episode starts and released when it ends.
//!
//! Session failures never stop playback. A coordinator that could only
//! partially configure the platform still returns a grant, marked degraded.

use crossbeam_channel::Sender;

use crate::error::SessionError;
use crate::playback::engine::Mailbox;
use crate::playback::types::{NowPlaying, RemoteCommand};
use crate::track::Track;

pub mod desktop;
#[cfg(target_os = "linux")]
pub mod mpris;

pub use desktop::{DesktopSession, NowPlayingBoard, RemoteControl};
#[cfg(target_os = "linux")]
pub use mpris::MprisSurface;

/// Token for one acquired session. At most one is outstanding per engine.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionGrant {
    id: u64,
    degraded: Vec<String>,
}

impl SessionGrant {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            degraded: Vec::new(),
        }
    }

    /// Record a facility that could not be configured
    pub fn degrade(&mut self, reason: impl Into<String>) {
        self.degraded.push(reason.into());
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn degraded_reasons(&self) -> &[String] {
        &self.degraded
    }
}

/// Entry point for lock-screen / media-key commands into the engine.
///
/// Commands take the same path as `play`/`stop` from the UI.
#[derive(Clone)]
pub struct RemoteCommandSink {
    tx: Sender<Mailbox>,
}

impl RemoteCommandSink {
    pub(crate) fn new(tx: Sender<Mailbox>) -> Self {
        Self { tx }
    }

    /// Deliver a command; false once the engine has shut down
    pub fn send(&self, command: RemoteCommand) -> bool {
        self.tx.send(Mailbox::Remote(command)).is_ok()
    }
}

impl std::fmt::Debug for RemoteCommandSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCommandSink").finish_non_exhaustive()
    }
}

pub trait SessionCoordinator: Send + 'static {
    /// Configure focus and background execution and register remote
    /// commands. Never fails outright; problems go into the grant.
    fn acquire_for_playback(&mut self, track: &Track, remote: RemoteCommandSink) -> SessionGrant;

    /// Only valid while `grant` is the outstanding grant
    fn publish_now_playing(
        &mut self,
        grant: &SessionGrant,
        now_playing: &NowPlaying,
    ) -> Result<(), SessionError>;

    fn clear_now_playing(&mut self) -> Result<(), SessionError>;

    /// Undo everything `grant` acquired. Releasing a stale grant is a no-op.
    fn release(&mut self, grant: SessionGrant) -> Result<(), SessionError>;
}

/// OS media surface (MPRIS on Linux) that shows now-playing metadata and
/// delivers transport buttons. Attached once per grant.
pub trait MediaSurface: Send + 'static {
    fn attach(&mut self, remote: RemoteCommandSink) -> Result<(), SessionError>;

    fn show(&mut self, now_playing: &NowPlaying) -> Result<(), SessionError>;

    /// Mark playback stopped while staying registered
    fn hide(&mut self) -> Result<(), SessionError>;

    fn detach(&mut self) -> Result<(), SessionError>;
}
