//! Synthetic frequency feed
//!
//! Plausible-looking bars for backends that cannot expose decoded audio.
//! Each bucket eases towards a random target; lower buckets run hotter,
//! like real music.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Envelope, FrequencyFeed};
use crate::config::feed::{BUCKETS, CEILING, FLOOR};
use crate::playback::types::FrequencySample;

/// Fraction of the distance to the target covered per tick
const EASING: f32 = 0.45;

pub struct SyntheticFeed {
    envelope: Envelope,
    rng: StdRng,
    levels: [f32; BUCKETS],
}

impl Default for SyntheticFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticFeed {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Deterministic feed for tests and demos
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            envelope: Envelope::new(),
            rng,
            levels: [FLOOR; BUCKETS],
        }
    }

    fn next_levels(&mut self) -> [f32; BUCKETS] {
        for (i, level) in self.levels.iter_mut().enumerate() {
            let tilt = 1.0 - 0.6 * i as f32 / (BUCKETS - 1) as f32;
            let peak = FLOOR + (CEILING - FLOOR) * tilt;
            let target = self.rng.random_range(FLOOR..=peak);
            *level += (target - *level) * EASING;
        }
        self.levels
    }
}

impl FrequencyFeed for SyntheticFeed {
    fn start(&mut self) {
        self.envelope.start();
    }

    fn stop(&mut self) {
        self.envelope.stop();
        self.levels = [FLOOR; BUCKETS];
    }

    fn sample(&mut self) -> Option<FrequencySample> {
        if !self.envelope.is_running() {
            return self.envelope.tick(|| [FLOOR; BUCKETS]);
        }
        let levels = self.next_levels();
        self.envelope.tick(|| levels)
    }
}
