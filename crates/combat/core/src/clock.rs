//! Time sources.
//!
//! The simulation never reads wall-clock time directly. Everything goes through
//! [`Clock`], so tests can drive time by hand and the runtime can substitute a
//! tokio-backed clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

/// Provider of local and estimated authoritative timestamps, in seconds.
pub trait Clock: Send + Sync {
    /// Local simulation time.
    fn now(&self) -> f32;

    /// Estimated server time. Equal to [`Clock::now`] on the server.
    fn server_now(&self) -> f32 {
        self.now()
    }
}

/// Clock advanced explicitly by its owner.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU32,
}

impl ManualClock {
    pub fn new(start: f32) -> Self {
        Self {
            bits: AtomicU32::new(start.to_bits()),
        }
    }

    pub fn set(&self, now: f32) {
        self.bits.store(now.to_bits(), Ordering::Release);
    }

    /// Moves the clock forward and returns the new time.
    pub fn advance(&self, delta: f32) -> f32 {
        let next = self.now() + delta.max(0.0);
        self.set(next);
        next
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Ping-based estimate of round trip and server clock offset.
///
/// Fed by the `Ping`/`Pong` handshake. Only cosmetic consumers (UI timers,
/// ping compensation) read it; message ordering always uses prediction ids.
#[derive(Clone, Debug)]
pub struct ClockSync {
    samples: VecDeque<(f32, f32)>,
    capacity: usize,
}

impl ClockSync {
    pub const DEFAULT_SAMPLES: usize = 8;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_SAMPLES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Records a completed handshake.
    ///
    /// `sent_at` and `received_at` are local times, `server_time` is the time
    /// the server stamped on its reply.
    pub fn record(&mut self, sent_at: f32, server_time: f32, received_at: f32) {
        let round_trip = (received_at - sent_at).max(0.0);
        let offset = server_time + round_trip / 2.0 - received_at;
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((round_trip, offset));
    }

    /// Average round trip over the retained samples.
    pub fn round_trip(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|(rtt, _)| rtt).sum::<f32>() / self.samples.len() as f32
    }

    /// Average estimated `server - local` offset.
    pub fn offset(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|(_, offset)| offset).sum::<f32>() / self.samples.len() as f32
    }

    /// One-way latency clamped to `[0, max]`.
    pub fn ping_compensation(&self, max: f32) -> f32 {
        (self.round_trip() / 2.0).clamp(0.0, max.max(0.0))
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_forward() {
        let clock = ManualClock::new(1.0);
        assert_eq!(clock.advance(0.5), 1.5);
        assert_eq!(clock.advance(-3.0), 1.5);
        assert_eq!(clock.server_now(), 1.5);
    }

    #[test]
    fn clock_sync_estimates_offset_from_symmetric_round_trip() {
        let mut sync = ClockSync::new();
        // Server is 10s ahead, 100ms round trip.
        sync.record(0.0, 10.05, 0.1);
        assert!((sync.round_trip() - 0.1).abs() < 1e-5);
        assert!((sync.offset() - 10.0).abs() < 1e-4);
        assert!((sync.ping_compensation(0.2) - 0.05).abs() < 1e-5);
        assert!((sync.ping_compensation(0.01) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn clock_sync_keeps_bounded_history() {
        let mut sync = ClockSync::with_capacity(2);
        sync.record(0.0, 0.0, 1.0);
        sync.record(0.0, 0.0, 0.2);
        sync.record(0.0, 0.0, 0.2);
        assert_eq!(sync.sample_count(), 2);
        assert!((sync.round_trip() - 0.2).abs() < 1e-6);
    }
}
