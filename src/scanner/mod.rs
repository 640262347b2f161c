// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sweep state machine and signal detection.
//!
//! The [`Scanner`] consumes log-power vectors (one per FFT), averages a fixed
//! number of them per centre frequency, looks for bins that stand above the
//! local noise floor, and then steps to the next centre frequency. It has no
//! knowledge of the runtime: callers feed vectors and act on the returned
//! [`ScanEvent`]s (the flowgraph sink retunes the source on
//! [`ScanEvent::Retuned`]).

pub mod detect;

use crate::config::ScanConfig;
use detect::{band_average, fft_shift, hot_runs};

/// A carrier found during a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    /// Frequency of the strongest bin in Hz
    pub frequency: f64,
    /// Width of the run of bins above threshold in Hz
    pub width: f64,
    /// Narrow-band level at the peak (dB)
    pub peak_db: f32,
    /// Coarse-band level at the peak, the local noise floor (dB)
    pub noise_db: f32,
    /// `peak_db - noise_db`
    pub snr_db: f32,
    /// Centre frequency the signal was seen at
    pub center_frequency: f64,
    /// Sweep number, starting at 1
    pub sweep: u64,
}

/// Output of [`Scanner::process_vector`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// The source must move to a new centre frequency.
    Retuned { center_frequency: f64 },
    /// A new signal was detected.
    Signal(Signal),
    /// A sweep wrapped back to the start frequency.
    SweepComplete { sweep: u64, signals: Vec<Signal> },
    /// The requested number of sweeps is done; no more events follow.
    Finished { sweeps: u64 },
}

/// Residual weight of the previous step's spectrum in the smoothed one after
/// settling (-90 dB).
const SMOOTHING_RESIDUAL: f64 = 1e-9;

/// Vectors a single-pole IIR with coefficient `alpha` needs before the
/// previous input has decayed to [`SMOOTHING_RESIDUAL`].
fn smoothing_settle_vectors(alpha: f32) -> usize {
    let alpha = f64::from(alpha);
    if alpha >= 1.0 || alpha <= 0.0 {
        return 0;
    }
    (SMOOTHING_RESIDUAL.ln() / (1.0 - alpha).ln()).ceil() as usize
}

/// Scan parameters in the units the detector works in.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    pub start_frequency: f64,
    pub stop_frequency: f64,
    pub step: f64,
    pub sample_rate: f64,
    pub fft_size: usize,
    pub average_size: usize,
    /// Narrow averaging width in bins
    pub narrow_bins: usize,
    /// Coarse averaging width in bins
    pub coarse_bins: usize,
    pub threshold: f32,
    pub spread: f64,
    /// Vectors discarded after each retune, including the smoothing filter's
    /// decay time
    pub settle_vectors: usize,
    pub sweeps: Option<u64>,
}

impl ScanPlan {
    /// Derive the plan from a validated configuration.
    #[must_use]
    pub fn from_config(config: &ScanConfig) -> Self {
        let bins = |bandwidth: f64| {
            ((bandwidth * config.fft_width as f64 / config.sample_rate).round() as usize).max(1)
        };
        let pause = (config.pause_time * config.sample_rate / config.fft_width as f64).ceil();
        let settle = (pause as usize).max(1) + smoothing_settle_vectors(config.iir_alpha);

        Self {
            start_frequency: config.start_frequency,
            stop_frequency: config.stop_frequency,
            step: config.step(),
            sample_rate: config.sample_rate,
            fft_size: config.fft_width,
            average_size: config.average_size,
            narrow_bins: bins(config.narrow_bandwidth),
            coarse_bins: bins(config.coarse_bandwidth),
            threshold: config.threshold,
            spread: config.spread,
            settle_vectors: settle,
            sweeps: config.sweeps,
        }
    }

    /// Plan for a source that cannot retune, such as a recording.
    ///
    /// The scan stays at the start frequency and analyses the full band of
    /// the source, so every sweep is a single step.
    #[must_use]
    pub fn fixed_center(self) -> Self {
        Self {
            stop_frequency: self.start_frequency,
            step: self.sample_rate,
            ..self
        }
    }

    /// Frequency resolution in Hz.
    #[must_use]
    pub fn bin_width(&self) -> f64 {
        self.sample_rate / self.fft_size as f64
    }

    /// Frequency of bin `j` of a shifted spectrum tuned to `center`.
    #[must_use]
    pub fn bin_frequency(&self, center: f64, j: usize) -> f64 {
        center + (j as f64 - (self.fft_size / 2) as f64) * self.bin_width()
    }

    /// Bins whose offset from the centre lies in `[-step/2, step/2)`.
    #[must_use]
    pub fn analysis_range(&self) -> std::ops::Range<usize> {
        let half_step = self.step / 2.0;
        let offset = |j: usize| (j as f64 - (self.fft_size / 2) as f64) * self.bin_width();
        let lo = (0..self.fft_size)
            .find(|&j| offset(j) >= -half_step)
            .unwrap_or(self.fft_size);
        let hi = (lo..self.fft_size)
            .find(|&j| offset(j) >= half_step)
            .unwrap_or(self.fft_size);
        lo..hi
    }

    /// Number of centre frequencies visited per sweep.
    #[must_use]
    pub fn steps_per_sweep(&self) -> u64 {
        ((self.stop_frequency - self.start_frequency) / self.step + 1e-9).floor() as u64 + 1
    }
}

/// Averaging, detection and stepping state for one scan.
#[derive(Debug)]
pub struct Scanner {
    plan: ScanPlan,
    buffer: Vec<f32>,
    shifted: Vec<f32>,
    count: usize,
    settle_remaining: usize,
    step_index: u64,
    sweep: u64,
    sweep_signals: Vec<Signal>,
    last_reported: Option<usize>,
    finished: bool,
}

impl Scanner {
    /// Start a scan at the plan's start frequency.
    ///
    /// The source is expected to be tuned there already; the first
    /// `settle_vectors` vectors are discarded like after any retune.
    #[must_use]
    pub fn new(plan: ScanPlan) -> Self {
        let n = plan.fft_size;
        let settle = plan.settle_vectors;
        Self {
            plan,
            buffer: vec![0.0; n],
            shifted: Vec::with_capacity(n),
            count: 0,
            settle_remaining: settle,
            step_index: 0,
            sweep: 1,
            sweep_signals: Vec::new(),
            last_reported: None,
            finished: false,
        }
    }

    #[must_use]
    pub fn plan(&self) -> &ScanPlan {
        &self.plan
    }

    /// Centre frequency the current vectors are attributed to.
    #[must_use]
    pub fn center_frequency(&self) -> f64 {
        self.plan.start_frequency + self.step_index as f64 * self.plan.step
    }

    /// Sweep currently in progress, starting at 1.
    #[must_use]
    pub fn sweep(&self) -> u64 {
        self.sweep
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one log-power vector (unshifted FFT order).
    pub fn process_vector(&mut self, vector: &[f32]) -> Vec<ScanEvent> {
        debug_assert_eq!(vector.len(), self.plan.fft_size);

        if self.finished {
            return Vec::new();
        }
        if self.settle_remaining > 0 {
            self.settle_remaining -= 1;
            return Vec::new();
        }

        for (acc, &x) in self.buffer.iter_mut().zip(vector) {
            *acc += x;
        }
        self.count += 1;
        if self.count < self.plan.average_size {
            return Vec::new();
        }

        let scale = 1.0 / self.count as f32;
        for acc in &mut self.buffer {
            *acc *= scale;
        }

        let mut events = self.analyse();

        self.buffer.fill(0.0);
        self.count = 0;
        self.advance(&mut events);
        events
    }

    fn analyse(&mut self) -> Vec<ScanEvent> {
        fft_shift(&self.buffer, &mut self.shifted);
        let narrow = band_average(&self.shifted, self.plan.narrow_bins);
        let coarse = band_average(&self.shifted, self.plan.coarse_bins);
        let center = self.center_frequency();
        let bin_width = self.plan.bin_width();

        let runs = hot_runs(
            &narrow,
            &coarse,
            &self.shifted,
            self.plan.threshold,
            self.plan.analysis_range(),
        );
        log::debug!("{:.3} MHz: {} candidate run(s)", center / 1e6, runs.len());

        let mut events = Vec::new();
        for run in runs {
            let signal = Signal {
                frequency: self.plan.bin_frequency(center, run.peak),
                width: run.len as f64 * bin_width,
                peak_db: narrow[run.peak],
                noise_db: coarse[run.peak],
                snr_db: narrow[run.peak] - coarse[run.peak],
                center_frequency: center,
                sweep: self.sweep,
            };

            if let Some(idx) = self.last_reported {
                let last = self.sweep_signals[idx];
                if (signal.frequency - last.frequency).abs() <= self.plan.spread {
                    if signal.snr_db > last.snr_db {
                        self.sweep_signals[idx] = signal;
                    }
                    continue;
                }
            }

            self.sweep_signals.push(signal);
            self.last_reported = Some(self.sweep_signals.len() - 1);
            events.push(ScanEvent::Signal(signal));
        }
        events
    }

    fn advance(&mut self, events: &mut Vec<ScanEvent>) {
        let next = self.plan.start_frequency + (self.step_index + 1) as f64 * self.plan.step;
        // Tolerate rounding when stop is an exact multiple of step
        if next > self.plan.stop_frequency + self.plan.step * 1e-9 {
            let completed = self.sweep;
            events.push(ScanEvent::SweepComplete {
                sweep: completed,
                signals: std::mem::take(&mut self.sweep_signals),
            });
            self.last_reported = None;
            self.step_index = 0;

            if self.plan.sweeps.is_some_and(|n| completed >= n) {
                self.finished = true;
                events.push(ScanEvent::Finished { sweeps: completed });
                return;
            }
            self.sweep += 1;
        } else {
            self.step_index += 1;
        }

        self.settle_remaining = self.plan.settle_vectors;
        events.push(ScanEvent::Retuned {
            center_frequency: self.center_frequency(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ScanPlan {
        ScanPlan {
            start_frequency: 100e6,
            stop_frequency: 101e6,
            step: 500e3,
            sample_rate: 2e6,
            fft_size: 1000,
            average_size: 2,
            narrow_bins: 12,
            coarse_bins: 100,
            threshold: 3.0,
            spread: 50e3,
            settle_vectors: 1,
            sweeps: Some(1),
        }
    }

    /// Unshifted log-power vector with a flat floor and bumps at the given
    /// offsets (in bins) from the centre.
    fn spectrum(n: usize, bumps: &[(isize, f32)]) -> Vec<f32> {
        let mut shifted = vec![-80.0f32; n];
        for &(offset, level) in bumps {
            let centre = (n / 2) as isize + offset;
            for d in -2..=2 {
                shifted[(centre + d) as usize] = level - 6.0 * d.abs() as f32;
            }
        }
        // Undo the shift: shifted = input[split..] ++ input[..split]
        let split = n - n / 2;
        let mut unshifted = vec![0.0; n];
        for (j, &x) in shifted.iter().enumerate() {
            unshifted[(j + split) % n] = x;
        }
        unshifted
    }

    fn feed(scanner: &mut Scanner, vector: &[f32], times: usize) -> Vec<ScanEvent> {
        (0..times).flat_map(|_| scanner.process_vector(vector)).collect()
    }

    #[test]
    fn test_plan_from_config() {
        let config = ScanConfig::default();
        let plan = ScanPlan::from_config(&config);
        assert_eq!(plan.narrow_bins, 13);
        assert_eq!(plan.coarse_bins, 100);
        assert_eq!(plan.bin_width(), 2000.0);
        // 0.1 s at 2 MS/s is 200 vectors of 1000 samples
        assert_eq!(plan.settle_vectors, 200);
        assert_eq!(plan.step, 500e3);
    }

    #[test]
    fn test_settle_is_at_least_one_vector() {
        let config = ScanConfig {
            pause_time: 0.0,
            ..Default::default()
        };
        assert_eq!(ScanPlan::from_config(&config).settle_vectors, 1);
    }

    #[test]
    fn test_settle_covers_smoothing_decay() {
        let smoothed = ScanConfig {
            pause_time: 0.0,
            iir_alpha: 0.05,
            ..Default::default()
        };
        let settle = ScanPlan::from_config(&smoothed).settle_vectors;
        // 0.95^k <= 1e-9 needs 405 vectors
        assert_eq!(settle, 1 + 405);
        assert!(0.95f64.powi(settle as i32 - 1) <= 1e-9);

        let unsmoothed = ScanConfig {
            pause_time: 0.0,
            iir_alpha: 1.0,
            ..Default::default()
        };
        assert_eq!(ScanPlan::from_config(&unsmoothed).settle_vectors, 1);
    }

    #[test]
    fn test_fixed_center_covers_full_band() {
        let plan = plan().fixed_center();
        assert_eq!(plan.stop_frequency, 100e6);
        assert_eq!(plan.steps_per_sweep(), 1);
        assert_eq!(plan.analysis_range(), 0..1000);

        let mut scanner = Scanner::new(plan);
        // 400 kHz off centre, outside any half-step of the stepped plan
        let vector = spectrum(1000, &[(200, -20.0)]);
        let events = feed(&mut scanner, &vector, 3);
        let frequencies: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Signal(s) => Some(s.frequency),
                _ => None,
            })
            .collect();
        assert_eq!(frequencies.len(), 1);
        assert!((frequencies[0] - 100.4e6).abs() <= 2000.0);
        assert!(scanner.is_finished());
    }

    #[test]
    fn test_analysis_range_partitions_step() {
        let plan = plan();
        let range = plan.analysis_range();
        // ±250 kHz at 2 kHz bins around bin 500
        assert_eq!(range, 375..625);
        assert_eq!(plan.bin_frequency(100e6, range.start), 100e6 - 250e3);
        assert_eq!(plan.steps_per_sweep(), 3);
    }

    #[test]
    fn test_settle_then_average_then_retune() {
        let mut scanner = Scanner::new(plan());
        let flat = spectrum(1000, &[]);

        // One settle vector, then two averaged vectors
        assert!(scanner.process_vector(&flat).is_empty());
        assert!(scanner.process_vector(&flat).is_empty());
        let events = scanner.process_vector(&flat);
        assert_eq!(
            events,
            vec![ScanEvent::Retuned {
                center_frequency: 100.5e6
            }]
        );
        assert_eq!(scanner.center_frequency(), 100.5e6);
    }

    #[test]
    fn test_detects_signal_at_offset() {
        let mut scanner = Scanner::new(plan());
        let vector = spectrum(1000, &[(-100, -20.0)]);
        let events = feed(&mut scanner, &vector, 3);

        let signals: Vec<&Signal> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Signal(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(signals.len(), 1);
        let signal = signals[0];
        assert!((signal.frequency - (100e6 - 200e3)).abs() <= 2000.0);
        assert!(signal.snr_db > 3.0);
        assert!(signal.peak_db > signal.noise_db);
        assert_eq!(signal.center_frequency, 100e6);
        assert_eq!(signal.sweep, 1);
    }

    #[test]
    fn test_ignores_signal_outside_half_step() {
        let mut scanner = Scanner::new(plan());
        // 300 kHz off centre, owned by the next step
        let vector = spectrum(1000, &[(150, -20.0)]);
        let events = feed(&mut scanner, &vector, 3);
        assert!(!events.iter().any(|e| matches!(e, ScanEvent::Signal(_))));
    }

    #[test]
    fn test_spread_merges_close_signals() {
        let mut scanner = Scanner::new(plan());
        // 40 kHz apart, second one stronger
        let vector = spectrum(1000, &[(-10, -30.0), (10, -20.0)]);
        let events = feed(&mut scanner, &vector, 3);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ScanEvent::Signal(_)))
                .count(),
            1
        );

        // Finish the sweep: the summary keeps the stronger one
        let flat = spectrum(1000, &[]);
        let events = feed(&mut scanner, &flat, 6);
        let summary = events
            .iter()
            .find_map(|e| match e {
                ScanEvent::SweepComplete { signals, .. } => Some(signals.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(summary.len(), 1);
        assert!((summary[0].frequency - (100e6 + 20e3)).abs() <= 2000.0);
    }

    #[test]
    fn test_signals_beyond_spread_are_separate() {
        let mut scanner = Scanner::new(plan());
        let vector = spectrum(1000, &[(-60, -20.0), (60, -20.0)]);
        let events = feed(&mut scanner, &vector, 3);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ScanEvent::Signal(_)))
                .count(),
            2
        );
    }

    #[test]
    fn test_sweep_wraps_and_finishes() {
        let mut plan = plan();
        plan.sweeps = Some(2);
        let mut scanner = Scanner::new(plan);
        let flat = spectrum(1000, &[]);

        let mut centres = Vec::new();
        let mut completed = Vec::new();
        let mut finished = None;
        for _ in 0..100 {
            for event in scanner.process_vector(&flat) {
                match event {
                    ScanEvent::Retuned { center_frequency } => centres.push(center_frequency),
                    ScanEvent::SweepComplete { sweep, .. } => completed.push(sweep),
                    ScanEvent::Finished { sweeps } => finished = Some(sweeps),
                    ScanEvent::Signal(_) => {}
                }
            }
        }

        assert_eq!(centres, vec![100.5e6, 101e6, 100e6, 100.5e6, 101e6]);
        assert_eq!(completed, vec![1, 2]);
        assert_eq!(finished, Some(2));
        assert!(scanner.is_finished());
        assert!(scanner.process_vector(&flat).is_empty());
    }

    #[test]
    fn test_single_frequency_scan() {
        let mut plan = plan();
        plan.stop_frequency = plan.start_frequency;
        plan.sweeps = None;
        let mut scanner = Scanner::new(plan);
        let flat = spectrum(1000, &[]);

        let events = feed(&mut scanner, &flat, 3);
        assert!(matches!(events[0], ScanEvent::SweepComplete { sweep: 1, .. }));
        assert_eq!(
            events[1],
            ScanEvent::Retuned {
                center_frequency: 100e6
            }
        );
        assert_eq!(scanner.sweep(), 2);
    }
}
