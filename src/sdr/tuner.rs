//! Shared tuner control between the scanner sink and the IQ source.
//!
//! The sink decides where to tune next; the source owns the device. Both hold
//! a [`TunerHandle`] and communicate through atomics, so neither has to block
//! the other's `work` call.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Gain mode for the tuner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainMode {
    /// Automatic gain control
    Auto,
    /// Manual gain in dB
    Manual(f64),
}

impl GainMode {
    /// Gain in tenths of dB as expected by the RTL-SDR driver.
    #[must_use]
    pub fn tenths_db(self) -> Option<i32> {
        match self {
            GainMode::Auto => None,
            GainMode::Manual(db) => Some((db * 10.0).round() as i32),
        }
    }
}

/// Front-end settings applied when a source is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerSettings {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Initial centre frequency in Hz
    pub center_frequency: f64,
    /// Frequency correction in PPM
    pub ppm_correction: i32,
    /// Tuner gain mode
    pub gain_mode: GainMode,
    /// IF gain in dB (devices without an IF stage ignore it)
    pub if_gain: f64,
}

#[derive(Debug)]
struct TunerState {
    center_bits: AtomicU64,
    generation: AtomicU64,
    applied: AtomicU64,
    applied_at: AtomicU64,
    stopped: AtomicBool,
}

/// Cloneable handle to the shared tuner state.
#[derive(Debug, Clone)]
pub struct TunerHandle {
    state: Arc<TunerState>,
}

impl TunerHandle {
    #[must_use]
    pub fn new(center_frequency: f64) -> Self {
        Self {
            state: Arc::new(TunerState {
                center_bits: AtomicU64::new(center_frequency.to_bits()),
                generation: AtomicU64::new(0),
                applied: AtomicU64::new(0),
                applied_at: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Current requested centre frequency in Hz.
    #[must_use]
    pub fn center_frequency(&self) -> f64 {
        f64::from_bits(self.state.center_bits.load(Ordering::Acquire))
    }

    /// Incremented on every retune; sources compare it to the value they
    /// last applied.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::Acquire)
    }

    /// Request a new centre frequency.
    pub fn retune(&self, center_frequency: f64) {
        self.state
            .center_bits
            .store(center_frequency.to_bits(), Ordering::Release);
        self.state.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Called by the source when a retune takes effect: every sample from
    /// `sample_index` on (counted from the start of the stream) was taken at
    /// `generation`'s centre frequency.
    pub fn mark_applied(&self, generation: u64, sample_index: u64) {
        self.state.applied_at.store(sample_index, Ordering::Release);
        self.state.applied.store(generation, Ordering::Release);
    }

    /// Last applied generation and the index of its first sample.
    #[must_use]
    pub fn applied(&self) -> (u64, u64) {
        let generation = self.state.applied.load(Ordering::Acquire);
        (generation, self.state.applied_at.load(Ordering::Acquire))
    }

    /// Ask the source to finish.
    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retune_bumps_generation() {
        let tuner = TunerHandle::new(100e6);
        let other = tuner.clone();
        assert_eq!(other.generation(), 0);

        tuner.retune(100.5e6);
        assert_eq!(other.center_frequency(), 100.5e6);
        assert_eq!(other.generation(), 1);
    }

    #[test]
    fn test_applied_generation_and_sample_index() {
        let tuner = TunerHandle::new(100e6);
        let source = tuner.clone();
        assert_eq!(tuner.applied(), (0, 0));

        tuner.retune(100.5e6);
        assert_eq!(tuner.applied(), (0, 0));

        source.mark_applied(source.generation(), 4096);
        assert_eq!(tuner.applied(), (1, 4096));
    }

    #[test]
    fn test_stop_is_shared() {
        let tuner = TunerHandle::new(1.0);
        let other = tuner.clone();
        assert!(!other.is_stopped());
        tuner.stop();
        assert!(other.is_stopped());
    }

    #[test]
    fn test_gain_tenths() {
        assert_eq!(GainMode::Manual(30.0).tenths_db(), Some(300));
        assert_eq!(GainMode::Manual(49.6).tenths_db(), Some(496));
        assert_eq!(GainMode::Auto.tenths_db(), None);
    }
}
