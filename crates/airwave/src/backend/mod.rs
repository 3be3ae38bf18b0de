//! Stream backends
//!
//! A `StreamBackend` turns a URL into a `StreamHandle`: one native
//! decode/output resource. Opening never blocks; completion, metadata and
//! failures travel back to the engine through a `BackendNotifier` tagged
//! with the generation of the request that created it.

use crossbeam_channel::Sender;

use crate::error::BackendError;
use crate::playback::engine::Mailbox;
use crate::playback::types::StreamDetails;

pub mod analyzer;
pub mod decoder;
pub mod health;
pub mod icy;
pub mod native;

pub use analyzer::{AnalyzingSource, SpectrumTap};
pub use native::{NativeBackend, NativeHandle};

/// Asynchronous outcome of an open, reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Audio is flowing to the output
    Ready(StreamDetails),
    /// In-band song metadata changed
    Metadata { title: String },
    /// The stream could not be opened, or died after opening
    Failed(String),
}

/// Callback channel from a backend into the engine's mailbox
#[derive(Clone)]
pub struct BackendNotifier {
    generation: u64,
    tx: Sender<Mailbox>,
}

impl BackendNotifier {
    pub(crate) fn new(generation: u64, tx: Sender<Mailbox>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the play request this notifier belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ready(&self, details: StreamDetails) -> bool {
        self.send(BackendEvent::Ready(details))
    }

    pub fn metadata(&self, title: impl Into<String>) -> bool {
        self.send(BackendEvent::Metadata {
            title: title.into(),
        })
    }

    pub fn failed(&self, reason: impl Into<String>) -> bool {
        self.send(BackendEvent::Failed(reason.into()))
    }

    /// Deliver an event; false once the engine has shut down
    pub fn send(&self, event: BackendEvent) -> bool {
        self.tx
            .send(Mailbox::Backend {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Factory for native stream handles, one implementation per platform
pub trait StreamBackend: Send + 'static {
    type Handle: StreamHandle;

    /// Start opening `url`. Must return without waiting for the network;
    /// the outcome is reported through `notifier`.
    fn open(&mut self, url: &str, notifier: BackendNotifier) -> Result<Self::Handle, BackendError>;
}

/// One native decode/output resource bound to a single URL
pub trait StreamHandle: Send + 'static {
    /// Stop output and free the decoder before returning.
    ///
    /// Idempotent, and safe while the open is still in flight; any later
    /// callback from that open must be suppressed.
    fn release(&mut self) -> Result<(), BackendError>;
}
