//! MPRIS media surface for Linux desktops
//!
//! Registers `org.mpris.MediaPlayer2.airwave` on the session bus so desktop
//! shells, lock screens and media keys see the station and can drive the
//! engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use souvlaki::{MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, PlatformConfig};
use tracing::debug;

use super::{MediaSurface, RemoteCommandSink};
use crate::error::SessionError;
use crate::playback::types::{NowPlaying, RemoteCommand};

const DBUS_NAME: &str = "airwave";
const DISPLAY_NAME: &str = "Airwave";

/// MPRIS registration, created on attach and dropped on detach
#[derive(Default)]
pub struct MprisSurface {
    controls: Option<MediaControls>,
    playing: Arc<AtomicBool>,
}

impl MprisSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn controls(&mut self) -> Result<&mut MediaControls, SessionError> {
        self.controls.as_mut().ok_or(SessionError::NoGrant)
    }
}

fn platform(e: souvlaki::Error) -> SessionError {
    SessionError::Platform(format!("mpris: {e:?}"))
}

/// Translate a bus event into an engine command. Toggle depends on
/// whether something is currently shown as playing.
fn translate(event: MediaControlEvent, playing: bool) -> Option<RemoteCommand> {
    match event {
        MediaControlEvent::Play => Some(RemoteCommand::PlayRequested),
        MediaControlEvent::Pause | MediaControlEvent::Stop => Some(RemoteCommand::PauseRequested),
        MediaControlEvent::Toggle if playing => Some(RemoteCommand::PauseRequested),
        MediaControlEvent::Toggle => Some(RemoteCommand::PlayRequested),
        _ => None,
    }
}

impl MediaSurface for MprisSurface {
    fn attach(&mut self, remote: RemoteCommandSink) -> Result<(), SessionError> {
        if self.controls.is_some() {
            self.detach()?;
        }

        let mut controls = MediaControls::new(PlatformConfig {
            dbus_name: DBUS_NAME,
            display_name: DISPLAY_NAME,
            hwnd: None,
        })
        .map_err(|e| SessionError::Denied(format!("session bus unavailable: {e:?}")))?;

        let playing = self.playing.clone();
        controls
            .attach(move |event| {
                match translate(event, playing.load(Ordering::Relaxed)) {
                    Some(command) => {
                        remote.send(command);
                    }
                    None => debug!("unhandled mpris event"),
                }
            })
            .map_err(platform)?;

        self.controls = Some(controls);
        Ok(())
    }

    fn show(&mut self, now_playing: &NowPlaying) -> Result<(), SessionError> {
        let artist = Some(now_playing.subtitle.as_str()).filter(|s| !s.is_empty());
        let controls = self.controls()?;
        controls
            .set_metadata(MediaMetadata {
                title: Some(&now_playing.title),
                artist,
                cover_url: now_playing.artwork.as_deref(),
                ..Default::default()
            })
            .map_err(platform)?;
        controls
            .set_playback(MediaPlayback::Playing { progress: None })
            .map_err(platform)?;
        self.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn hide(&mut self) -> Result<(), SessionError> {
        self.playing.store(false, Ordering::Relaxed);
        match self.controls.as_mut() {
            Some(controls) => controls.set_playback(MediaPlayback::Stopped).map_err(platform),
            None => Ok(()),
        }
    }

    fn detach(&mut self) -> Result<(), SessionError> {
        self.playing.store(false, Ordering::Relaxed);
        match self.controls.take() {
            Some(mut controls) => controls.detach().map_err(platform),
            None => Ok(()),
        }
    }
}

impl Drop for MprisSurface {
    fn drop(&mut self) {
        let _ = self.detach();
    }
}
