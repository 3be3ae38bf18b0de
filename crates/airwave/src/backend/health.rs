//! Stream health monitoring
//!
//! Watches the analyzed-sample counter of a ready stream. A stream that
//! never produces audio is dead; one that stops producing audio for a
//! while is only stalled, since a slow network may still catch up.

use std::time::{Duration, Instant};

use crate::config::timeouts::{NO_AUDIO_TIMEOUT_SECS, STREAM_STALL_TIMEOUT_SECS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Ready, first samples not yet seen
    Warming,
    Flowing,
    /// Samples stopped; recoverable
    Stalled,
    /// No audio ever arrived; terminal
    Dead,
}

/// Result of one `observe` call that the caller should act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAlert {
    NoAudio,
    Stall(Duration),
}

pub struct HealthMonitor {
    health: Health,
    last_count: u64,
    since: Instant,
    no_audio_timeout: Duration,
    stall_timeout: Duration,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::with_timeouts(
            Duration::from_secs(NO_AUDIO_TIMEOUT_SECS),
            Duration::from_secs(STREAM_STALL_TIMEOUT_SECS),
        )
    }
}

impl HealthMonitor {
    pub fn with_timeouts(no_audio: Duration, stall: Duration) -> Self {
        Self {
            health: Health::Warming,
            last_count: 0,
            since: Instant::now(),
            no_audio_timeout: no_audio,
            stall_timeout: stall,
        }
    }

    pub fn health(&self) -> Health {
        self.health
    }

    /// Feed the current sample count. Alerts are edge-triggered: a stall is
    /// reported once per stall period, `NoAudio` exactly once.
    pub fn observe(&mut self, sample_count: u64) -> Option<HealthAlert> {
        self.observe_at(sample_count, Instant::now())
    }

    fn observe_at(&mut self, sample_count: u64, now: Instant) -> Option<HealthAlert> {
        let advanced = sample_count > self.last_count;
        if advanced {
            self.last_count = sample_count;
        }
        let elapsed = now.saturating_duration_since(self.since);

        match self.health {
            Health::Dead => None,
            Health::Warming | Health::Flowing | Health::Stalled if advanced => {
                self.enter(Health::Flowing, now);
                None
            }
            Health::Warming if elapsed >= self.no_audio_timeout => {
                self.enter(Health::Dead, now);
                Some(HealthAlert::NoAudio)
            }
            Health::Flowing if elapsed >= self.stall_timeout => {
                self.enter(Health::Stalled, now);
                Some(HealthAlert::Stall(elapsed))
            }
            Health::Stalled if elapsed >= self.stall_timeout => {
                self.since = now;
                Some(HealthAlert::Stall(elapsed))
            }
            _ => None,
        }
    }

    fn enter(&mut self, health: Health, now: Instant) {
        self.health = health;
        self.since = now;
    }
}
