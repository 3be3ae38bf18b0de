//! Spectrum analysis
//!
//! `AnalyzingSource` passes samples through untouched while folding them
//! into a mono FFT frame. Each full frame updates a shared `SpectrumTap`
//! that the frequency feed and the health monitor read from.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{ChannelCount, SampleRate, Source};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::audio::{FFT_SIZE, SMOOTHING};
use crate::config::feed::BUCKETS;

#[derive(Debug, Clone, Copy, Default)]
struct TapState {
    spectrum: [f32; BUCKETS],
    sample_count: u64,
    /// Bumped on every reset; writers stamped with an older epoch are ignored
    epoch: u64,
}

/// Shared spectrum snapshot written by the audio thread
#[derive(Debug, Clone, Default)]
pub struct SpectrumTap {
    state: Arc<Mutex<TapState>>,
}

impl SpectrumTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smoothed band magnitudes in 0.0..=1.0
    pub fn snapshot(&self) -> [f32; BUCKETS] {
        self.state
            .lock()
            .map(|s| s.spectrum)
            .unwrap_or([0.0; BUCKETS])
    }

    /// Samples analyzed since the last reset
    pub fn sample_count(&self) -> u64 {
        self.state.lock().map(|s| s.sample_count).unwrap_or(0)
    }

    /// Epoch a new writer should be stamped with
    pub fn epoch(&self) -> u64 {
        self.state.lock().map(|s| s.epoch).unwrap_or(0)
    }

    /// Clear the spectrum and counter and start a new epoch, which is
    /// returned. Sources stamped with an earlier epoch stop writing.
    pub fn reset(&self) -> u64 {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let epoch = s.epoch.wrapping_add(1);
        *s = TapState {
            epoch,
            ..TapState::default()
        };
        epoch
    }

    /// Reset only if `epoch` is still current
    pub fn retire(&self, epoch: u64) {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if s.epoch == epoch {
            *s = TapState {
                epoch: epoch.wrapping_add(1),
                ..TapState::default()
            };
        }
    }

    fn update(&self, epoch: u64, bands: &[f32; BUCKETS], sample_count: u64) -> bool {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if s.epoch != epoch {
            return false;
        }
        for (current, &fresh) in s.spectrum.iter_mut().zip(bands.iter()) {
            *current = *current * SMOOTHING + fresh.min(1.0) * (1.0 - SMOOTHING);
        }
        s.sample_count = sample_count;
        true
    }
}

/// Wrapper source that feeds a `SpectrumTap`
pub struct AnalyzingSource<S> {
    inner: S,
    tap: SpectrumTap,
    epoch: u64,
    frame: Vec<f32>,
    /// Running sum of the current interleaved frame, downmixed to mono
    pending: f32,
    pending_channels: u16,
    channels: u16,
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    sample_count: u64,
}

impl<S> AnalyzingSource<S>
where
    S: Source<Item = f32>,
{
    /// Wrap `source`, writing into `tap` for as long as `epoch` is current
    pub fn new(source: S, tap: SpectrumTap, epoch: u64) -> Self {
        let channels = source.channels().max(1);
        let sample_rate = source.sample_rate();
        let fft = FftPlanner::new().plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / FFT_SIZE as f32).cos()))
            .collect();
        Self {
            inner: source,
            tap,
            epoch,
            frame: Vec::with_capacity(FFT_SIZE),
            pending: 0.0,
            pending_channels: 0,
            channels,
            sample_rate,
            fft,
            window,
            sample_count: 0,
        }
    }

    fn analyze_frame(&mut self) {
        let mut buf: Vec<Complex<f32>> = self
            .frame
            .iter()
            .zip(self.window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut buf);

        let nyquist = FFT_SIZE / 2;
        let norm = 1.0 / FFT_SIZE as f32;
        let mut bands = [0.0f32; BUCKETS];

        // Quadratic spacing puts more bands in the low end
        for (band, value) in bands.iter_mut().enumerate() {
            let lo = (band as f32 / BUCKETS as f32).powi(2);
            let hi = ((band + 1) as f32 / BUCKETS as f32).powi(2);
            let start = (lo * nyquist as f32) as usize;
            let end = ((hi * nyquist as f32) as usize).max(start + 1).min(nyquist);

            let peak = buf[start..end]
                .iter()
                .map(|c| c.norm() * norm)
                .fold(0.0f32, f32::max);
            *value = (peak * 8.0).sqrt().min(1.0);
        }

        if !self.tap.update(self.epoch, &bands, self.sample_count) {
            tracing::trace!(epoch = self.epoch, "spectrum tap moved on; frame dropped");
        }
        self.frame.clear();
    }
}

impl<S> Iterator for AnalyzingSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.inner.next()?;
        self.sample_count += 1;

        self.pending += sample;
        self.pending_channels += 1;
        if self.pending_channels >= self.channels {
            self.frame.push(self.pending / self.channels as f32);
            self.pending = 0.0;
            self.pending_channels = 0;
            if self.frame.len() >= FFT_SIZE {
                self.analyze_frame();
            }
        }

        Some(sample)
    }
}

impl<S> Source for AnalyzingSource<S>
where
    S: Source<Item = f32>,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> ChannelCount {
        self.channels
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::buffer::SamplesBuffer;

    fn run(channels: u16, input: Vec<f32>) -> (Vec<f32>, SpectrumTap) {
        let tap = SpectrumTap::new();
        let source = SamplesBuffer::new(channels, 44100, input);
        let output = AnalyzingSource::new(source, tap.clone(), tap.epoch()).collect();
        (output, tap)
    }

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin() * amplitude)
            .collect()
    }

    #[test]
    fn passthrough_mono_and_stereo() {
        let mono: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        assert_eq!(run(1, mono.clone()).0, mono);

        let stereo: Vec<f32> = (0..200).map(|i| (i as f32 - 100.0) / 100.0).collect();
        assert_eq!(run(2, stereo.clone()).0, stereo);
    }

    #[test]
    fn empty_source_leaves_tap_untouched() {
        let (output, tap) = run(1, Vec::new());
        assert!(output.is_empty());
        assert_eq!(tap.sample_count(), 0);
        assert!(tap.snapshot().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn partial_frame_is_not_published() {
        let (_, tap) = run(1, sine(440.0, 0.8, FFT_SIZE - 1));
        assert_eq!(tap.sample_count(), 0);
    }

    #[test]
    fn full_frame_updates_sample_count() {
        let (_, tap) = run(1, sine(440.0, 0.8, FFT_SIZE * 3));
        assert_eq!(tap.sample_count(), (FFT_SIZE * 3) as u64);
    }

    #[test]
    fn stereo_frames_count_interleaved_samples() {
        let (_, tap) = run(2, sine(440.0, 0.8, FFT_SIZE * 2));
        assert_eq!(tap.sample_count(), (FFT_SIZE * 2) as u64);
    }

    #[test]
    fn silence_yields_flat_spectrum() {
        let (_, tap) = run(1, vec![0.0; FFT_SIZE * 4]);
        assert!(tap.snapshot().iter().all(|&v| v < 0.001));
    }

    #[test]
    fn bass_tone_lands_in_low_bands() {
        let (_, tap) = run(1, sine(200.0, 0.9, FFT_SIZE * 8));
        let spectrum = tap.snapshot();
        let low = spectrum[..4].iter().cloned().fold(0.0f32, f32::max);
        let high = spectrum[12..].iter().cloned().fold(0.0f32, f32::max);
        assert!(low > high, "low={low} high={high}");
    }

    #[test]
    fn spectrum_stays_in_unit_range() {
        let (_, tap) = run(1, sine(1000.0, 1.0, FFT_SIZE * 8));
        assert!(tap.snapshot().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn reset_clears_state() {
        let (_, tap) = run(1, sine(440.0, 0.9, FFT_SIZE * 2));
        assert!(tap.sample_count() > 0);
        let before = tap.epoch();
        assert_eq!(tap.reset(), before + 1);
        assert_eq!(tap.sample_count(), 0);
        assert!(tap.snapshot().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn source_from_previous_epoch_cannot_write_after_reset() {
        let tap = SpectrumTap::new();
        let epoch = tap.reset();
        let input = sine(440.0, 0.9, FFT_SIZE * 3);
        let mut old =
            AnalyzingSource::new(SamplesBuffer::new(1, 44100, input), tap.clone(), epoch);

        old.by_ref().take(FFT_SIZE * 2).for_each(drop);
        assert_eq!(tap.sample_count(), (FFT_SIZE * 2) as u64);

        tap.reset();
        old.by_ref().take(FFT_SIZE).for_each(drop);
        assert_eq!(tap.sample_count(), 0);
        assert!(tap.snapshot().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn retire_ignores_superseded_epoch() {
        let tap = SpectrumTap::new();
        let first = tap.reset();
        let second = tap.reset();

        let input = sine(440.0, 0.9, FFT_SIZE);
        AnalyzingSource::new(SamplesBuffer::new(1, 44100, input), tap.clone(), second)
            .for_each(drop);
        assert_eq!(tap.sample_count(), FFT_SIZE as u64);

        tap.retire(first);
        assert_eq!(tap.sample_count(), FFT_SIZE as u64);
        tap.retire(second);
        assert_eq!(tap.sample_count(), 0);
    }
}
