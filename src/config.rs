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

//! Scan configuration management.
//!
//! The configuration is persisted in TOML format through `confy` and can be
//! overridden from the command line. [`ScanConfig::validate`] must pass before
//! a flowgraph is built from it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Application name used for the persisted configuration.
pub const APP_NAME: &str = "sdr-scan";

/// Configuration file stem.
pub const CONFIG_NAME: &str = "config";

/// Everything needed to run a scan.
///
/// Frequencies and bandwidths are in Hz, times in seconds, gains in dB.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScanConfig {
    /// First centre frequency of the sweep
    #[serde(default = "default_start_frequency")]
    pub start_frequency: f64,

    /// Last centre frequency of the sweep (inclusive)
    #[serde(default = "default_stop_frequency")]
    pub stop_frequency: f64,

    /// Device sample rate, also the analysed bandwidth per step
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// FFT width in bins (vector length of the whole chain)
    #[serde(default = "default_fft_width")]
    pub fft_width: usize,

    /// Averaging width for the signal estimate
    #[serde(default = "default_narrow_bandwidth")]
    pub narrow_bandwidth: f64,

    /// Averaging width for the noise floor estimate
    #[serde(default = "default_coarse_bandwidth")]
    pub coarse_bandwidth: f64,

    /// Centre frequency increment between analyses. Defaults to a quarter of
    /// the sample rate when absent.
    #[serde(default)]
    pub step: Option<f64>,

    /// Number of spectra averaged per step
    #[serde(default = "default_average_size")]
    pub average_size: usize,

    /// Minimum separation between two reported signals
    #[serde(default = "default_spread")]
    pub spread: f64,

    /// Level above the noise floor that marks a signal (dB)
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Settling time after each retune
    #[serde(default = "default_pause_time")]
    pub pause_time: f64,

    /// Tuner gain (manual mode)
    #[serde(default = "default_gain")]
    pub gain: f64,

    /// IF gain, only honoured by devices that expose an IF stage
    #[serde(default = "default_if_gain")]
    pub if_gain: f64,

    /// Frequency correction in PPM
    #[serde(default)]
    pub ppm_correction: i32,

    /// Smoothing coefficient of the per-bin IIR filter, 1.0 disables smoothing
    #[serde(default = "default_iir_alpha")]
    pub iir_alpha: f32,

    /// Number of complete sweeps before stopping, scan forever when absent
    #[serde(default)]
    pub sweeps: Option<u64>,

    /// CSV file that detected signals are appended to
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// RTL-SDR device index
    #[serde(default)]
    pub device_index: u32,
}

fn default_start_frequency() -> f64 {
    87_500_000.0
}

fn default_stop_frequency() -> f64 {
    108_000_000.0
}

fn default_sample_rate() -> f64 {
    2_000_000.0
}

fn default_fft_width() -> usize {
    1000
}

fn default_narrow_bandwidth() -> f64 {
    25_000.0
}

fn default_coarse_bandwidth() -> f64 {
    200_000.0
}

fn default_average_size() -> usize {
    100
}

fn default_spread() -> f64 {
    50_000.0
}

fn default_threshold() -> f32 {
    3.0
}

fn default_pause_time() -> f64 {
    0.1
}

fn default_gain() -> f64 {
    30.0
}

fn default_if_gain() -> f64 {
    25.0
}

fn default_iir_alpha() -> f32 {
    1.0
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_frequency: default_start_frequency(),
            stop_frequency: default_stop_frequency(),
            sample_rate: default_sample_rate(),
            fft_width: default_fft_width(),
            narrow_bandwidth: default_narrow_bandwidth(),
            coarse_bandwidth: default_coarse_bandwidth(),
            step: None,
            average_size: default_average_size(),
            spread: default_spread(),
            threshold: default_threshold(),
            pause_time: default_pause_time(),
            gain: default_gain(),
            if_gain: default_if_gain(),
            ppm_correction: 0,
            iir_alpha: default_iir_alpha(),
            sweeps: None,
            output: None,
            device_index: 0,
        }
    }
}

impl ScanConfig {
    /// Load configuration from disk, falling back to defaults for missing keys
    pub fn load() -> Result<Self, ScanError> {
        Ok(confy::load(APP_NAME, CONFIG_NAME)?)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), ScanError> {
        Ok(confy::store(APP_NAME, CONFIG_NAME, self)?)
    }

    /// Get the config file path for display to user
    pub fn config_path() -> Result<PathBuf, ScanError> {
        Ok(confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?)
    }

    /// Effective centre frequency increment.
    #[must_use]
    pub fn step(&self) -> f64 {
        self.step.unwrap_or(self.sample_rate / 4.0)
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ScanError> {
        if !(self.start_frequency > 0.0) {
            return Err(ScanError::invalid("start_frequency", "must be positive"));
        }
        if self.stop_frequency < self.start_frequency {
            return Err(ScanError::invalid(
                "stop_frequency",
                format!(
                    "({}) must not be below start_frequency ({})",
                    self.stop_frequency, self.start_frequency
                ),
            ));
        }
        if !(self.sample_rate > 0.0) {
            return Err(ScanError::invalid("sample_rate", "must be positive"));
        }
        if self.fft_width < 2 {
            return Err(ScanError::invalid("fft_width", "must be at least 2"));
        }
        if !(self.step() > 0.0) {
            return Err(ScanError::invalid("step", "must be positive"));
        }
        if self.average_size == 0 {
            return Err(ScanError::invalid("average_size", "must be at least 1"));
        }
        if !(self.narrow_bandwidth > 0.0) {
            return Err(ScanError::invalid("narrow_bandwidth", "must be positive"));
        }
        if self.coarse_bandwidth <= self.narrow_bandwidth {
            return Err(ScanError::invalid(
                "coarse_bandwidth",
                "must be wider than narrow_bandwidth",
            ));
        }
        if !(self.iir_alpha > 0.0 && self.iir_alpha <= 1.0) {
            return Err(ScanError::invalid("iir_alpha", "must be in (0, 1]"));
        }
        if self.pause_time < 0.0 || !self.pause_time.is_finite() {
            return Err(ScanError::invalid("pause_time", "must not be negative"));
        }
        if self.spread < 0.0 || !self.spread.is_finite() {
            return Err(ScanError::invalid("spread", "must not be negative"));
        }
        if self.sweeps == Some(0) {
            return Err(ScanError::invalid("sweeps", "must be at least 1 when given"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ScanConfig::default();
        assert_eq!(config.fft_width, 1000);
        assert_eq!(config.sample_rate, 2_000_000.0);
        assert_eq!(config.step(), 500_000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config: ScanConfig = toml_like("start_frequency = 100000000.0");
        assert_eq!(config.start_frequency, 100_000_000.0);
        assert_eq!(config.average_size, 100);
        assert!((config.iir_alpha - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rejects_inverted_range() {
        let config = ScanConfig {
            start_frequency: 200e6,
            stop_frequency: 100e6,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stop_frequency"));
    }

    #[test]
    fn test_rejects_narrow_wider_than_coarse() {
        let config = ScanConfig {
            narrow_bandwidth: 300e3,
            coarse_bandwidth: 200e3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_alpha_and_sizes() {
        for config in [
            ScanConfig { iir_alpha: 0.0, ..Default::default() },
            ScanConfig { iir_alpha: 1.5, ..Default::default() },
            ScanConfig { fft_width: 1, ..Default::default() },
            ScanConfig { average_size: 0, ..Default::default() },
            ScanConfig { step: Some(-1.0), ..Default::default() },
            ScanConfig { sweeps: Some(0), ..Default::default() },
            ScanConfig { pause_time: -0.5, ..Default::default() },
        ] {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn test_single_frequency_is_valid() {
        let config = ScanConfig {
            start_frequency: 100e6,
            stop_frequency: 100e6,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    // confy stores TOML; the serde defaults are what matter here, so a
    // single key/value pair is parsed through serde's value deserializer.
    fn toml_like(line: &str) -> ScanConfig {
        use serde::de::value::{MapDeserializer, Error};
        let (key, value) = line.split_once(" = ").unwrap();
        let value: f64 = value.parse().unwrap();
        let map = MapDeserializer::<_, Error>::new(std::iter::once((key, value)));
        ScanConfig::deserialize(map).unwrap()
    }
}
