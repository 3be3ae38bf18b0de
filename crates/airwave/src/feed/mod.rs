//! Frequency feeds
//!
//! A `FrequencyFeed` produces amplitude snapshots for a visualizer while a
//! stream plays. The engine drives it: `start()` on ready, `stop()` on
//! teardown, and one `sample()` per tick. After `stop()` a feed keeps
//! returning samples that fall towards the resting floor, then returns
//! `None` until started again.

use crate::config::feed::{BUCKETS, DECAY_FACTOR, FLOOR, MAX_DECAY_TICKS};
use crate::playback::types::FrequencySample;

pub mod spectrum;
pub mod synthetic;

pub use spectrum::SpectrumFeed;
pub use synthetic::SyntheticFeed;

pub trait FrequencyFeed: Send + 'static {
    fn start(&mut self);

    /// Begin the decay tail. No-op when already stopped.
    fn stop(&mut self);

    /// Next snapshot, or `None` once silent
    fn sample(&mut self) -> Option<FrequencySample>;
}

/// Below this distance from the floor a bucket counts as resting
const REST_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Silent,
    Running,
    Decaying { ticks: u32 },
}

/// Start/stop/decay bookkeeping shared by every feed.
///
/// The source only supplies raw values while running; clamping and the
/// decay tail are handled here.
#[derive(Debug, Clone)]
pub struct Envelope {
    phase: Phase,
    current: [f32; BUCKETS],
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    pub fn new() -> Self {
        Self {
            phase: Phase::Silent,
            current: [FLOOR; BUCKETS],
        }
    }

    pub fn start(&mut self) {
        self.phase = Phase::Running;
    }

    pub fn stop(&mut self) {
        if self.phase == Phase::Running {
            self.phase = Phase::Decaying { ticks: 0 };
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// True while samples are still being emitted
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Silent
    }

    /// Advance one tick. `fresh` is only called while running.
    pub fn tick(&mut self, fresh: impl FnOnce() -> [f32; BUCKETS]) -> Option<FrequencySample> {
        match self.phase {
            Phase::Silent => None,
            Phase::Running => {
                let sample = FrequencySample::new(fresh());
                self.current = *sample.buckets();
                Some(sample)
            }
            Phase::Decaying { ticks } => {
                let ticks = ticks + 1;
                for v in self.current.iter_mut() {
                    *v = FLOOR + (*v - FLOOR) * DECAY_FACTOR;
                }
                let settled = self.current.iter().all(|&v| v - FLOOR < REST_EPSILON);
                if settled || ticks >= MAX_DECAY_TICKS {
                    self.current = [FLOOR; BUCKETS];
                    self.phase = Phase::Silent;
                } else {
                    self.phase = Phase::Decaying { ticks };
                }
                Some(FrequencySample::new(self.current))
            }
        }
    }
}
