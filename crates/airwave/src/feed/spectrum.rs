//! Frequency feed backed by real spectrum analysis

use super::{Envelope, FrequencyFeed};
use crate::backend::analyzer::SpectrumTap;
use crate::config::feed::{CEILING, FLOOR};
use crate::playback::types::FrequencySample;

/// Maps the analyzer's `0.0..=1.0` band magnitudes onto `[FLOOR, CEILING]`
pub struct SpectrumFeed {
    envelope: Envelope,
    tap: SpectrumTap,
}

impl SpectrumFeed {
    pub fn new(tap: SpectrumTap) -> Self {
        Self {
            envelope: Envelope::new(),
            tap,
        }
    }
}

impl FrequencyFeed for SpectrumFeed {
    fn start(&mut self) {
        self.envelope.start();
    }

    fn stop(&mut self) {
        self.envelope.stop();
    }

    fn sample(&mut self) -> Option<FrequencySample> {
        let tap = &self.tap;
        self.envelope.tick(|| {
            let mut bands = tap.snapshot();
            for v in bands.iter_mut() {
                *v = FLOOR + v.clamp(0.0, 1.0) * (CEILING - FLOOR);
            }
            bands
        })
    }
}
