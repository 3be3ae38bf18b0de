//! Desktop session coordinator
//!
//! Desktop audio servers have no focus grant and do not suspend background
//! processes, so the session here is the media surface: now-playing
//! metadata and transport buttons. An optional `MediaSurface` carries both
//! to the OS (MPRIS on Linux). The in-process `NowPlayingBoard` and
//! `RemoteControl` mirror it for front ends that draw their own.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::{MediaSurface, RemoteCommandSink, SessionCoordinator, SessionGrant};
use crate::error::SessionError;
use crate::playback::types::{NowPlaying, RemoteCommand};
use crate::track::Track;

/// Now-playing metadata as currently published. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct NowPlayingBoard {
    inner: Arc<Mutex<Option<NowPlaying>>>,
}

impl NowPlayingBoard {
    pub fn current(&self) -> Option<NowPlaying> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, value: Option<NowPlaying>) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

/// Media-key surface. Presses are dropped while no session is held.
#[derive(Debug, Clone, Default)]
pub struct RemoteControl {
    inner: Arc<Mutex<Option<RemoteCommandSink>>>,
}

impl RemoteControl {
    /// Forward a command; false when nothing is registered
    pub fn press(&self, command: RemoteCommand) -> bool {
        let sink = self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match sink {
            Some(sink) => sink.send(command),
            None => {
                debug!(?command, "remote command with no session registered");
                false
            }
        }
    }

    pub fn is_registered(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn register(&self, sink: Option<RemoteCommandSink>) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = sink;
    }
}

#[derive(Default)]
pub struct DesktopSession {
    next_id: u64,
    current: Option<u64>,
    board: NowPlayingBoard,
    remote: RemoteControl,
    surface: Option<Box<dyn MediaSurface>>,
    surface_attached: bool,
}

impl DesktopSession {
    /// Session with only the in-process board and remote control
    pub fn new() -> Self {
        Self::default()
    }

    /// Also publish through `surface` while a grant is held
    pub fn with_surface(mut self, surface: impl MediaSurface) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    pub fn board(&self) -> NowPlayingBoard {
        self.board.clone()
    }

    pub fn remote_control(&self) -> RemoteControl {
        self.remote.clone()
    }

    pub fn holds_grant(&self) -> bool {
        self.current.is_some()
    }

    /// Whether the OS surface accepted the current grant
    pub fn surface_attached(&self) -> bool {
        self.surface_attached
    }

    fn attached_surface(&mut self) -> Option<&mut (dyn MediaSurface + 'static)> {
        if self.surface_attached {
            self.surface.as_deref_mut()
        } else {
            None
        }
    }

    fn teardown(&mut self) -> Result<(), SessionError> {
        self.remote.register(None);
        self.board.set(None);
        self.current = None;
        let detached = match self.attached_surface() {
            Some(surface) => surface.detach(),
            None => Ok(()),
        };
        self.surface_attached = false;
        detached
    }
}

impl std::fmt::Debug for DesktopSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopSession")
            .field("current", &self.current)
            .field("has_surface", &self.surface.is_some())
            .field("surface_attached", &self.surface_attached)
            .finish_non_exhaustive()
    }
}

impl SessionCoordinator for DesktopSession {
    fn acquire_for_playback(&mut self, track: &Track, remote: RemoteCommandSink) -> SessionGrant {
        if let Some(stale) = self.current {
            warn!(grant = stale, "acquire while a grant is outstanding; releasing it");
            if let Err(e) = self.teardown() {
                warn!(grant = stale, error = %e, "media surface detach failed");
            }
        }

        self.next_id += 1;
        let mut grant = SessionGrant::new(self.next_id);

        if let Some(surface) = self.surface.as_deref_mut() {
            match surface.attach(remote.clone()) {
                Ok(()) => self.surface_attached = true,
                Err(e) => {
                    warn!(grant = grant.id(), error = %e, "media surface unavailable");
                    grant.degrade(e.to_string());
                }
            }
        }
        self.remote.register(Some(remote));
        self.current = Some(grant.id());

        info!(
            grant = grant.id(),
            url = track.url(),
            os_surface = self.surface_attached,
            "session acquired"
        );
        grant
    }

    fn publish_now_playing(
        &mut self,
        grant: &SessionGrant,
        now_playing: &NowPlaying,
    ) -> Result<(), SessionError> {
        if self.current != Some(grant.id()) {
            return Err(SessionError::NoGrant);
        }
        debug!(title = %now_playing.title, subtitle = %now_playing.subtitle, "now playing");
        self.board.set(Some(now_playing.clone()));
        match self.attached_surface() {
            Some(surface) => surface.show(now_playing),
            None => Ok(()),
        }
    }

    fn clear_now_playing(&mut self) -> Result<(), SessionError> {
        self.board.set(None);
        match self.attached_surface() {
            Some(surface) => surface.hide(),
            None => Ok(()),
        }
    }

    fn release(&mut self, grant: SessionGrant) -> Result<(), SessionError> {
        if self.current != Some(grant.id()) {
            debug!(grant = grant.id(), "release of stale grant ignored");
            return Ok(());
        }
        let detached = self.teardown();
        info!(grant = grant.id(), "session released");
        detached
    }
}
