//! Native stream backend
//!
//! Each handle owns a worker thread that connects, probes, opens the
//! default output device and then watches the stream until it is released
//! or dies. The output device is created on the worker because cpal
//! streams are not `Send`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;
use rodio::{OutputStreamBuilder, Sink};
use tracing::{debug, info, warn};

use super::analyzer::{AnalyzingSource, SpectrumTap};
use super::decoder::SymphoniaSource;
use super::health::{HealthAlert, HealthMonitor};
use super::icy::{detect_format_hint, IcyReader};
use super::{BackendNotifier, StreamBackend, StreamHandle};
use crate::error::BackendError;

const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// Backend that plays over HTTP to the default output device
pub struct NativeBackend {
    tap: SpectrumTap,
}

impl NativeBackend {
    /// `tap` receives the spectrum of whatever is currently playing
    pub fn new(tap: SpectrumTap) -> Self {
        Self { tap }
    }
}

impl StreamBackend for NativeBackend {
    type Handle = NativeHandle;

    fn open(&mut self, url: &str, notifier: BackendNotifier) -> Result<NativeHandle, BackendError> {
        let epoch = self.tap.reset();

        let shared = Arc::new(Mutex::new(Shared::default()));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let worker = {
            let url = url.to_string();
            let shared = shared.clone();
            let stop_flag = stop_flag.clone();
            let tap = self.tap.clone();
            thread::Builder::new()
                .name("stream-handle".to_string())
                .spawn(move || run_stream(url, notifier, shared, stop_flag, tap, epoch))?
        };

        Ok(NativeHandle {
            shared,
            stop_flag,
            tap: self.tap.clone(),
            epoch,
            _worker: Some(worker),
        })
    }
}

#[derive(Default)]
struct Shared {
    released: bool,
    sink: Option<Arc<Sink>>,
}

/// One connection plus its output sink
pub struct NativeHandle {
    shared: Arc<Mutex<Shared>>,
    stop_flag: Arc<AtomicBool>,
    tap: SpectrumTap,
    /// Tap epoch this handle's analyzer writes under
    epoch: u64,
    _worker: Option<JoinHandle<()>>,
}

impl StreamHandle for NativeHandle {
    fn release(&mut self) -> Result<(), BackendError> {
        self.stop_flag.store(true, Ordering::SeqCst);

        let sink = {
            let mut shared = self
                .shared
                .lock()
                .map_err(|_| BackendError::Audio("handle state poisoned".to_string()))?;
            if shared.released {
                return Ok(());
            }
            shared.released = true;
            shared.sink.take()
        };

        // Clearing drops the queued decoder and reader at the mixer's next
        // pass instead of waiting for the worker to notice.
        if let Some(sink) = sink {
            sink.clear();
            sink.stop();
        }
        self.tap.retire(self.epoch);
        debug!(epoch = self.epoch, "stream handle released");
        Ok(())
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "release on drop failed");
        }
    }
}

fn run_stream(
    url: String,
    notifier: BackendNotifier,
    shared: Arc<Mutex<Shared>>,
    stop_flag: Arc<AtomicBool>,
    tap: SpectrumTap,
    epoch: u64,
) {
    let generation = notifier.generation();
    let (sink, titles, error_slot, _stream) =
        match open_output(&url, &notifier, &shared, &stop_flag, &tap, epoch) {
            Ok(Some(opened)) => opened,
            Ok(None) => {
                debug!(generation, "released before ready");
                return;
            }
            Err(e) => {
                if !is_released(&shared) {
                    warn!(generation, error = %e, "stream open failed");
                    notifier.failed(e.to_string());
                }
                return;
            }
        };

    let mut health = HealthMonitor::default();
    loop {
        thread::sleep(MONITOR_INTERVAL);
        if is_released(&shared) {
            break;
        }

        for title in titles.try_iter() {
            debug!(generation, %title, "stream title");
            notifier.metadata(title);
        }

        match health.observe(tap.sample_count()) {
            Some(HealthAlert::NoAudio) => {
                notifier.failed("no audio received from stream");
                break;
            }
            Some(HealthAlert::Stall(stalled)) => {
                warn!(generation, stalled_ms = stalled.as_millis() as u64, "stream stalled");
            }
            None => {}
        }

        if sink.empty() {
            let reason = error_slot
                .lock()
                .ok()
                .and_then(|slot| slot.clone())
                .map(|e| format!("Stream error: {}", e))
                .unwrap_or_else(|| "stream ended".to_string());
            if !is_released(&shared) {
                notifier.failed(reason);
            }
            break;
        }
    }

    sink.stop();
    stop_flag.store(true, Ordering::SeqCst);
    debug!(generation, "stream worker exiting");
}

/// The reader raises the stop flag on its own when dropped, so only
/// `released` tells a caller-initiated stop apart from a dead stream.
fn is_released(shared: &Mutex<Shared>) -> bool {
    shared.lock().map(|s| s.released).unwrap_or(true)
}

type Opened = (
    Arc<Sink>,
    Receiver<String>,
    Arc<Mutex<Option<String>>>,
    rodio::OutputStream,
);

/// Connect, probe and start output. `Ok(None)` when released mid-way.
fn open_output(
    url: &str,
    notifier: &BackendNotifier,
    shared: &Arc<Mutex<Shared>>,
    stop_flag: &Arc<AtomicBool>,
    tap: &SpectrumTap,
    epoch: u64,
) -> Result<Option<Opened>, BackendError> {
    let (reader, titles) = IcyReader::connect(url, stop_flag.clone())?;
    let headers = reader.headers.clone();
    let hint = detect_format_hint(url, headers.content_type.as_deref());
    debug!(?hint, content_type = ?headers.content_type, "connected");

    if is_released(shared) {
        return Ok(None);
    }

    let source = SymphoniaSource::open(reader, hint.as_deref())?;
    let mut details = source.details();
    details.bitrate = headers.bitrate;
    details.station_name = headers.station_name.clone();
    let error_slot = source.error_slot();

    let mut stream = OutputStreamBuilder::open_default_stream()
        .map_err(|e| BackendError::Audio(format!("Failed to open audio output: {}", e)))?;
    stream.log_on_drop(false);

    let sink = Arc::new(Sink::connect_new(stream.mixer()));
    sink.append(AnalyzingSource::new(source, tap.clone(), epoch));

    let mut guard = shared
        .lock()
        .map_err(|_| BackendError::Audio("handle state poisoned".to_string()))?;
    if guard.released {
        sink.stop();
        return Ok(None);
    }
    guard.sink = Some(sink.clone());
    info!(%details, "stream ready");
    notifier.ready(details);
    drop(guard);

    Ok(Some((sink, titles, error_slot, stream)))
}
