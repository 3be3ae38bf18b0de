//! Playback engine
//!
//! `PlaybackEngine` is a thin handle around an actor thread that owns the
//! state machine, the current `StreamHandle`, the session grant and the
//! frequency feed. Every input (caller commands, remote commands, backend
//! callbacks, timer ticks) is serialized through one mailbox, so there is
//! exactly one place where state changes.
//!
//! Backend callbacks carry the generation of the play request that
//! produced them; anything from an older generation is dropped.

use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use super::bus::{Broadcast, Subscription};
use super::types::{FrequencySample, NowPlaying, PlaybackState, RemoteCommand, StreamDetails};
use crate::backend::{BackendEvent, BackendNotifier, StreamBackend, StreamHandle};
use crate::config::EngineConfig;
use crate::error::{EngineError, PlaybackError, Result};
use crate::feed::FrequencyFeed;
use crate::session::{RemoteCommandSink, SessionCoordinator, SessionGrant};
use crate::track::Track;

/// Everything the actor thread can be asked to do
pub(crate) enum Mailbox {
    Play {
        track: Track,
        reply: Sender<Result<()>>,
    },
    Stop {
        reply: Sender<()>,
    },
    Remote(RemoteCommand),
    Backend {
        generation: u64,
        event: BackendEvent,
    },
    Shutdown,
}

/// State visible to the handle without a round trip through the actor
struct Shared {
    state: Broadcast<PlaybackState>,
    frequency: Broadcast<FrequencySample>,
    details: Mutex<Option<StreamDetails>>,
}

impl Shared {
    fn set_details(&self, details: Option<StreamDetails>) {
        *self.details.lock().unwrap_or_else(|e| e.into_inner()) = details;
    }
}

/// Handle to a running playback engine
pub struct PlaybackEngine {
    tx: Sender<Mailbox>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Spawn the engine thread. The engine starts `Idle`.
    pub fn new<B, S, F>(
        backend: B,
        session: S,
        feed: F,
        config: EngineConfig,
    ) -> std::result::Result<Self, EngineError>
    where
        B: StreamBackend,
        S: SessionCoordinator,
        F: FrequencyFeed,
    {
        let capacity = config.subscriber_capacity();
        let shared = Arc::new(Shared {
            state: Broadcast::with_initial(PlaybackState::Idle, capacity),
            frequency: Broadcast::transient(capacity),
            details: Mutex::new(None),
        });

        let (tx, rx) = unbounded();
        let actor = EngineActor {
            backend,
            session,
            feed,
            config,
            shared: shared.clone(),
            tx: tx.clone(),
            state: PlaybackState::Idle,
            generation: 0,
            episode: None,
            last_track: None,
        };

        let thread = thread::Builder::new()
            .name("playback-engine".to_string())
            .spawn(move || actor.run(rx))?;

        Ok(Self {
            tx,
            shared,
            thread: Some(thread),
        })
    }

    /// Start playing `track`, replacing whatever is playing.
    ///
    /// Returns once the request has been applied: the state is then
    /// `Starting` or, if the backend refused synchronously, `Failed`.
    /// Only a blank URL is reported as an error.
    pub fn play(&self, track: Track) -> Result<()> {
        if track.is_blank() {
            warn!("rejecting track with empty URL");
            return Err(PlaybackError::InvalidTrack("stream URL is empty".to_string()));
        }
        let (reply, ack) = bounded(1);
        self.tx
            .send(Mailbox::Play { track, reply })
            .map_err(|_| Self::not_running())?;
        ack.recv().map_err(|_| Self::not_running())?
    }

    /// Stop playback and release everything. No-op when idle.
    pub fn stop(&self) {
        let (reply, ack) = bounded(1);
        if self.tx.send(Mailbox::Stop { reply }).is_ok() {
            let _ = ack.recv();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared
            .state
            .with_latest(|s| s.is_some_and(PlaybackState::is_playing))
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PlaybackState {
        self.shared.state.latest().unwrap_or_default()
    }

    /// Current state first, then every transition
    pub fn observe_state(&self) -> Subscription<PlaybackState> {
        self.shared.state.subscribe()
    }

    /// Frequency samples published from now on
    pub fn observe_frequency(&self) -> Subscription<FrequencySample> {
        self.shared.frequency.subscribe()
    }

    /// Codec details of the playing stream
    pub fn stream_details(&self) -> Option<StreamDetails> {
        self.shared
            .details
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Inject remote transport commands without holding a session grant
    pub fn remote_commands(&self) -> RemoteCommandSink {
        RemoteCommandSink::new(self.tx.clone())
    }

    /// Stop, release everything and join the engine thread
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(Mailbox::Shutdown);
            if thread.join().is_err() {
                error!("engine thread panicked");
            }
        }
    }

    fn not_running() -> PlaybackError {
        PlaybackError::BackendOpenFailure("playback engine is not running".to_string())
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

/// Resources held for one Starting/Playing episode
struct Episode<H> {
    generation: u64,
    track: Track,
    handle: Option<H>,
    grant: Option<SessionGrant>,
    opened_at: Instant,
    title: Option<String>,
}

struct EngineActor<B: StreamBackend, S, F> {
    backend: B,
    session: S,
    feed: F,
    config: EngineConfig,
    shared: Arc<Shared>,
    tx: Sender<Mailbox>,
    state: PlaybackState,
    generation: u64,
    episode: Option<Episode<B::Handle>>,
    last_track: Option<Track>,
}

impl<B, S, F> EngineActor<B, S, F>
where
    B: StreamBackend,
    S: SessionCoordinator,
    F: FrequencyFeed,
{
    fn run(mut self, rx: Receiver<Mailbox>) {
        let interval = self.config.feed_interval();
        let mut next_tick = Instant::now() + interval;

        loop {
            let wait = next_tick.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok(Mailbox::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(msg) => self.handle(msg),
                Err(RecvTimeoutError::Timeout) => {}
            }

            let now = Instant::now();
            if now >= next_tick {
                self.tick(now);
                next_tick += interval;
                if next_tick < now {
                    next_tick = now + interval;
                }
            }
        }

        self.stop();
        debug!("engine thread exiting");
    }

    fn handle(&mut self, msg: Mailbox) {
        match msg {
            Mailbox::Play { track, reply } => {
                let _ = reply.send(self.play(track));
            }
            Mailbox::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            Mailbox::Remote(command) => self.remote(command),
            Mailbox::Backend { generation, event } => self.backend_event(generation, event),
            Mailbox::Shutdown => {}
        }
    }

    fn play(&mut self, track: Track) -> Result<()> {
        if track.is_blank() {
            return Err(PlaybackError::InvalidTrack("stream URL is empty".to_string()));
        }

        if self.episode.is_some() {
            debug!(generation = self.generation, "replacing current episode");
        }
        self.release_episode();

        self.generation += 1;
        let generation = self.generation;
        self.last_track = Some(track.clone());
        self.transition(PlaybackState::Starting(track.clone()));
        info!(generation, url = track.url(), "starting stream");

        let remote = RemoteCommandSink::new(self.tx.clone());
        let grant = self.session.acquire_for_playback(&track, remote);
        if grant.is_degraded() {
            let denied = PlaybackError::SessionGrantDenied(grant.degraded_reasons().join("; "));
            warn!(generation, error = %denied, "continuing with degraded session");
        }

        let notifier = BackendNotifier::new(generation, self.tx.clone());
        let opened = self.backend.open(track.url(), notifier);

        self.episode = Some(Episode {
            generation,
            track,
            handle: None,
            grant: Some(grant),
            opened_at: Instant::now(),
            title: None,
        });

        match opened {
            Ok(handle) => {
                if let Some(episode) = self.episode.as_mut() {
                    episode.handle = Some(handle);
                }
            }
            Err(e) => self.fail(PlaybackError::BackendOpenFailure(e.to_string())),
        }
        Ok(())
    }

    fn stop(&mut self) {
        if matches!(self.state, PlaybackState::Idle | PlaybackState::Stopping) {
            debug!("stop while idle ignored");
            return;
        }
        self.transition(PlaybackState::Stopping);
        self.release_episode();
        self.transition(PlaybackState::Idle);
        info!(generation = self.generation, "stopped");
    }

    fn remote(&mut self, command: RemoteCommand) {
        debug!(?command, "remote command");
        match command {
            RemoteCommand::PauseRequested => self.stop(),
            RemoteCommand::PlayRequested => {
                let Some(track) = self.last_track.clone() else {
                    warn!("remote play with no previous track ignored");
                    return;
                };
                let active = matches!(
                    &self.state,
                    PlaybackState::Starting(t) | PlaybackState::Playing(t) if *t == track
                );
                if active {
                    debug!(url = track.url(), "remote play for active track ignored");
                    return;
                }
                if let Err(e) = self.play(track) {
                    warn!(error = %e, "remote play rejected");
                }
            }
        }
    }

    fn backend_event(&mut self, generation: u64, event: BackendEvent) {
        let current = self
            .episode
            .as_ref()
            .is_some_and(|ep| ep.generation == generation);
        if !current {
            debug!(generation, latest = self.generation, ?event, "stale backend event ignored");
            return;
        }

        match event {
            BackendEvent::Ready(details) => {
                let PlaybackState::Starting(track) = &self.state else {
                    debug!(generation, "duplicate ready ignored");
                    return;
                };
                let track = track.clone();
                info!(generation, %details, url = track.url(), "playing");
                self.shared.set_details(Some(details));
                self.feed.start();
                self.publish_now_playing();
                self.transition(PlaybackState::Playing(track));
            }
            BackendEvent::Metadata { title } => {
                if let Some(episode) = self.episode.as_mut() {
                    episode.title = Some(title);
                }
                if self.state.is_playing() {
                    self.publish_now_playing();
                }
            }
            BackendEvent::Failed(reason) => {
                let error = match self.state {
                    PlaybackState::Starting(_) => PlaybackError::BackendOpenFailure(reason),
                    _ => PlaybackError::BackendRuntimeFailure(reason),
                };
                self.fail(error);
            }
        }
    }

    fn tick(&mut self, now: Instant) {
        let timeout = self.config.open_timeout();
        let timed_out = matches!(self.state, PlaybackState::Starting(_))
            && self
                .episode
                .as_ref()
                .is_some_and(|ep| now.saturating_duration_since(ep.opened_at) >= timeout);
        if timed_out {
            self.fail(PlaybackError::Timeout(timeout));
        }

        if let Some(sample) = self.feed.sample() {
            self.shared.frequency.publish(sample);
        }
    }

    /// Tear the episode down and park in `Failed`. No retry.
    fn fail(&mut self, error: PlaybackError) {
        let Some(track) = self.state.track().cloned() else {
            return;
        };
        error!(generation = self.generation, url = track.url(), %error, "playback failed");
        self.release_episode();
        self.transition(PlaybackState::Failed(track, error));
    }

    fn publish_now_playing(&mut self) {
        let Some(episode) = self.episode.as_ref() else {
            return;
        };
        let Some(grant) = episode.grant.as_ref() else {
            return;
        };
        let mut now_playing = NowPlaying::for_track(&episode.track, self.config.artwork.clone());
        if let Some(title) = &episode.title {
            now_playing.subtitle = title.clone();
        }
        if let Err(e) = self.session.publish_now_playing(grant, &now_playing) {
            warn!(error = %e, "now-playing not published");
        }
    }

    /// Release handle, grant, now-playing and feed, in that order.
    /// Every step runs even if an earlier one fails.
    fn release_episode(&mut self) {
        let generation = self.generation;
        if let Some(mut episode) = self.episode.take() {
            if let Some(mut handle) = episode.handle.take() {
                best_effort("release stream handle", generation, || handle.release());
            }
            if let Some(grant) = episode.grant.take() {
                best_effort("release session grant", generation, || {
                    self.session.release(grant)
                });
            }
            best_effort("clear now playing", generation, || {
                self.session.clear_now_playing()
            });
        }
        best_effort("stop frequency feed", generation, || {
            self.feed.stop();
            Ok::<(), PlaybackError>(())
        });
        self.shared.set_details(None);
    }

    fn transition(&mut self, next: PlaybackState) {
        debug!(
            from = self.state.name(),
            to = next.name(),
            generation = self.generation,
            "transition"
        );
        self.state = next.clone();
        self.shared.state.publish(next);
    }
}

fn best_effort<E: Display>(
    step: &'static str,
    generation: u64,
    f: impl FnOnce() -> std::result::Result<(), E>,
) {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(step, generation, error = %e, "release step failed"),
        Err(_) => warn!(step, generation, "release step panicked"),
    }
}
