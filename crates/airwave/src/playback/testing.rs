//! Fakes for engine tests
//!
//! `Harness` wires a `PlaybackEngine` to a counting backend, a recording
//! session and a journaling feed. Probes share state with the fakes, so a
//! test can drive callbacks and inspect resource accounting while the
//! engine owns the fakes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use super::engine::PlaybackEngine;
use super::types::{FrequencySample, NowPlaying, RemoteCommand, StreamDetails};
use crate::backend::{BackendNotifier, StreamBackend, StreamHandle};
use crate::config::EngineConfig;
use crate::error::{BackendError, SessionError};
use crate::feed::{FrequencyFeed, SyntheticFeed};
use crate::session::{RemoteCommandSink, SessionCoordinator, SessionGrant};
use crate::track::Track;

/// Poll `f` until it holds or `timeout` passes
pub(crate) fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if f() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Ordered record of resource calls across all fakes
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, entry: &str) {
        lock(&self.0).push(entry.to_string());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    pub(crate) fn clear(&self) {
        lock(&self.0).clear();
    }
}

// --- Backend ---

#[derive(Default)]
struct BackendLog {
    opens: Vec<(String, BackendNotifier)>,
    releases: usize,
    live: usize,
    max_live: usize,
    refuse: Option<String>,
    panic_on_release: bool,
}

#[derive(Clone, Default)]
pub(crate) struct BackendProbe(Arc<Mutex<BackendLog>>);

impl BackendProbe {
    pub(crate) fn opens(&self) -> usize {
        lock(&self.0).opens.len()
    }

    pub(crate) fn url(&self, index: usize) -> String {
        lock(&self.0).opens[index].0.clone()
    }

    pub(crate) fn releases(&self) -> usize {
        lock(&self.0).releases
    }

    pub(crate) fn live(&self) -> usize {
        lock(&self.0).live
    }

    pub(crate) fn max_live(&self) -> usize {
        lock(&self.0).max_live
    }

    pub(crate) fn refuse_opens(&self, reason: &str) {
        lock(&self.0).refuse = Some(reason.to_string());
    }

    pub(crate) fn panic_on_release(&self) {
        lock(&self.0).panic_on_release = true;
    }

    fn notifier(&self, index: usize) -> BackendNotifier {
        lock(&self.0).opens[index].1.clone()
    }

    pub(crate) fn ready(&self, index: usize) {
        self.notifier(index).ready(StreamDetails {
            codec_name: "MP3".to_string(),
            channels: 2,
            sample_rate: 44100,
            bitrate: Some(128),
            station_name: None,
        });
    }

    pub(crate) fn fail(&self, index: usize, reason: &str) {
        self.notifier(index).failed(reason);
    }

    pub(crate) fn metadata(&self, index: usize, title: &str) {
        self.notifier(index).metadata(title);
    }
}

pub(crate) struct FakeBackend {
    probe: BackendProbe,
    journal: Journal,
}

impl StreamBackend for FakeBackend {
    type Handle = FakeHandle;

    fn open(&mut self, url: &str, notifier: BackendNotifier) -> Result<FakeHandle, BackendError> {
        let mut log = lock(&self.probe.0);
        log.opens.push((url.to_string(), notifier));
        if let Some(reason) = log.refuse.clone() {
            return Err(BackendError::Decode(reason));
        }
        log.live += 1;
        log.max_live = log.max_live.max(log.live);
        Ok(FakeHandle {
            probe: self.probe.clone(),
            journal: self.journal.clone(),
            released: false,
        })
    }
}

pub(crate) struct FakeHandle {
    probe: BackendProbe,
    journal: Journal,
    released: bool,
}

impl StreamHandle for FakeHandle {
    fn release(&mut self) -> Result<(), BackendError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.journal.record("handle.release");
        let panic = {
            let mut log = lock(&self.probe.0);
            log.releases += 1;
            log.live -= 1;
            log.panic_on_release
        };
        if panic {
            panic!("native release crashed");
        }
        Ok(())
    }
}

// --- Session ---

#[derive(Default)]
struct SessionLog {
    next_id: u64,
    current: Option<u64>,
    acquires: usize,
    releases: usize,
    outstanding: usize,
    max_outstanding: usize,
    published: Vec<NowPlaying>,
    remote: Option<RemoteCommandSink>,
    degrade_next: Option<String>,
    fail_releases: bool,
}

#[derive(Clone, Default)]
pub(crate) struct SessionProbe(Arc<Mutex<SessionLog>>);

impl SessionProbe {
    pub(crate) fn acquires(&self) -> usize {
        lock(&self.0).acquires
    }

    pub(crate) fn releases(&self) -> usize {
        lock(&self.0).releases
    }

    pub(crate) fn outstanding(&self) -> usize {
        lock(&self.0).outstanding
    }

    pub(crate) fn max_outstanding(&self) -> usize {
        lock(&self.0).max_outstanding
    }

    pub(crate) fn published(&self) -> Vec<NowPlaying> {
        lock(&self.0).published.clone()
    }

    pub(crate) fn degrade_next(&self, reason: &str) {
        lock(&self.0).degrade_next = Some(reason.to_string());
    }

    pub(crate) fn fail_releases(&self) {
        lock(&self.0).fail_releases = true;
    }

    /// Simulate a lock-screen button
    pub(crate) fn press(&self, command: RemoteCommand) -> bool {
        let remote = lock(&self.0).remote.clone();
        remote.is_some_and(|r| r.send(command))
    }
}

pub(crate) struct FakeSession {
    probe: SessionProbe,
    journal: Journal,
}

impl SessionCoordinator for FakeSession {
    fn acquire_for_playback(&mut self, _track: &Track, remote: RemoteCommandSink) -> SessionGrant {
        let mut log = lock(&self.probe.0);
        log.next_id += 1;
        log.acquires += 1;
        log.outstanding += 1;
        log.max_outstanding = log.max_outstanding.max(log.outstanding);
        log.current = Some(log.next_id);
        log.remote = Some(remote);

        let mut grant = SessionGrant::new(log.next_id);
        if let Some(reason) = log.degrade_next.take() {
            grant.degrade(reason);
        }
        grant
    }

    fn publish_now_playing(
        &mut self,
        grant: &SessionGrant,
        now_playing: &NowPlaying,
    ) -> Result<(), SessionError> {
        let mut log = lock(&self.probe.0);
        if log.current != Some(grant.id()) {
            return Err(SessionError::NoGrant);
        }
        log.published.push(now_playing.clone());
        Ok(())
    }

    fn clear_now_playing(&mut self) -> Result<(), SessionError> {
        self.journal.record("session.clear");
        Ok(())
    }

    fn release(&mut self, grant: SessionGrant) -> Result<(), SessionError> {
        self.journal.record("session.release");
        let mut log = lock(&self.probe.0);
        log.releases += 1;
        if log.current == Some(grant.id()) {
            log.current = None;
            log.outstanding -= 1;
            log.remote = None;
        }
        if log.fail_releases {
            return Err(SessionError::Platform("media session unavailable".to_string()));
        }
        Ok(())
    }
}

// --- Feed ---

pub(crate) struct JournalingFeed {
    inner: SyntheticFeed,
    journal: Journal,
}

impl FrequencyFeed for JournalingFeed {
    fn start(&mut self) {
        self.journal.record("feed.start");
        self.inner.start();
    }

    fn stop(&mut self) {
        self.journal.record("feed.stop");
        self.inner.stop();
    }

    fn sample(&mut self) -> Option<FrequencySample> {
        self.inner.sample()
    }
}

pub(crate) struct Harness {
    pub engine: PlaybackEngine,
    pub backend: BackendProbe,
    pub session: SessionProbe,
    pub journal: Journal,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub(crate) fn with_config(config: EngineConfig) -> Self {
        let journal = Journal::default();
        let backend = BackendProbe::default();
        let session = SessionProbe::default();

        let engine = PlaybackEngine::new(
            FakeBackend {
                probe: backend.clone(),
                journal: journal.clone(),
            },
            FakeSession {
                probe: session.clone(),
                journal: journal.clone(),
            },
            JournalingFeed {
                inner: SyntheticFeed::seeded(42),
                journal: journal.clone(),
            },
            config,
        )
        .expect("spawn engine");

        Self {
            engine,
            backend,
            session,
            journal,
        }
    }
}
