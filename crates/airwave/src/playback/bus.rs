//! Latest-value broadcast
//!
//! `Broadcast` fans values out to any number of `Subscription`s. Each
//! subscriber has its own bounded queue; when a queue is full the oldest
//! queued value is dropped so a slow consumer never blocks the producer.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

struct Slot<T> {
    tx: Sender<T>,
    /// Producer-side handle used to evict the oldest value on overflow
    evict: Receiver<T>,
    alive: Weak<()>,
}

struct Inner<T> {
    latest: Option<T>,
    subscribers: Vec<Slot<T>>,
}

/// Broadcast mechanism for engine snapshots
pub struct Broadcast<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    replay: bool,
}

impl<T: Clone> Broadcast<T> {
    /// A broadcast that hands its latest value to every new subscriber
    pub fn with_initial(value: T, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                latest: Some(value),
                subscribers: Vec::new(),
            }),
            capacity: capacity.max(1),
            replay: true,
        }
    }

    /// A broadcast whose subscribers only see values published after they joined
    pub fn transient(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                latest: None,
                subscribers: Vec::new(),
            }),
            capacity: capacity.max(1),
            replay: false,
        }
    }

    /// Subscribe; replaying broadcasts deliver the current value first
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = bounded(self.capacity);
        let alive = Arc::new(());
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ref latest) = inner.latest {
            let _ = tx.try_send(latest.clone());
        }
        inner.subscribers.push(Slot {
            tx,
            evict: rx.clone(),
            alive: Arc::downgrade(&alive),
        });
        Subscription { rx, _alive: alive }
    }

    /// Publish a value to all subscribers. Never blocks.
    pub fn publish(&self, value: T) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.subscribers.retain(|slot| {
            if slot.alive.strong_count() == 0 {
                return false;
            }
            match slot.tx.try_send(value.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(v)) => {
                    let _ = slot.evict.try_recv();
                    let _ = slot.tx.try_send(v);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
        if self.replay {
            inner.latest = Some(value);
        }
    }

    /// Most recently published value (replaying broadcasts only)
    pub fn latest(&self) -> Option<T> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.latest.clone()
    }

    /// Read the latest value without cloning it
    pub fn with_latest<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(inner.latest.as_ref())
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .subscribers
            .iter()
            .filter(|s| s.alive.strong_count() > 0)
            .count()
    }
}

/// Receiving end of a `Broadcast`.
///
/// Iterating blocks for the next value and ends once the broadcast is dropped.
pub struct Subscription<T> {
    rx: Receiver<T>,
    _alive: Arc<()>,
}

impl<T> Subscription<T> {
    /// Non-blocking poll for the next value
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next value
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(v) => Some(v),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain everything queued, returning the newest value
    pub fn latest(&self) -> Option<T> {
        let mut last = None;
        while let Ok(v) = self.rx.try_recv() {
            last = Some(v);
        }
        last
    }
}

impl<T> Iterator for Subscription<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.recv().ok()
    }
}
