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

//! Command line interface.
//!
//! Scan parameters given on the command line override the stored
//! configuration; anything left out keeps its configured value.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::sdr::simulated_source::Carrier;
use crate::sdr::top_block::SourceKind;

/// Parse a frequency in Hz, accepting `k`, `M` and `G` suffixes
/// (e.g. `87.5M`).
pub fn parse_frequency(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let (number, scale) = if let Some(stripped) = s.strip_suffix('G') {
        (stripped, 1e9)
    } else if let Some(stripped) = s.strip_suffix('M') {
        (stripped, 1e6)
    } else if let Some(stripped) = s.strip_suffix('k') {
        (stripped, 1e3)
    } else {
        (s, 1.0)
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("Invalid frequency '{s}'"))?;
    Ok(value * scale)
}

/// Where samples are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Rtlsdr,
    File,
    Sim,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Sweep a frequency range and report active signals", long_about = None)]
pub struct Cli {
    /// Start frequency in Hz (accepts k/M/G suffix)
    #[arg(short = 'x', long, value_parser = parse_frequency)]
    pub start_frequency: Option<f64>,

    /// Stop frequency in Hz (accepts k/M/G suffix)
    #[arg(short = 'y', long, value_parser = parse_frequency)]
    pub stop_frequency: Option<f64>,

    /// Sample rate in Hz
    #[arg(short = 'r', long, value_parser = parse_frequency)]
    pub sample_rate: Option<f64>,

    /// FFT width in bins
    #[arg(short = 'w', long)]
    pub fft_width: Option<usize>,

    /// Narrow averaging bandwidth in Hz
    #[arg(short = 'z', long, value_parser = parse_frequency)]
    pub narrow_bandwidth: Option<f64>,

    /// Coarse averaging bandwidth in Hz
    #[arg(short = 'b', long, value_parser = parse_frequency)]
    pub coarse_bandwidth: Option<f64>,

    /// Step between centre frequencies in Hz (default: sample rate / 4)
    #[arg(short = 's', long, value_parser = parse_frequency)]
    pub step: Option<f64>,

    /// Number of FFTs averaged per step
    #[arg(short = 'a', long)]
    pub average_size: Option<usize>,

    /// Minimum separation between reported signals in Hz
    #[arg(short = 'p', long, value_parser = parse_frequency)]
    pub spread: Option<f64>,

    /// Detection threshold above the noise floor in dB
    #[arg(short = 't', long, allow_hyphen_values = true)]
    pub threshold: Option<f32>,

    /// Settling time after each retune in seconds
    #[arg(short = 'P', long)]
    pub pause_time: Option<f64>,

    /// Tuner gain in dB
    #[arg(short = 'g', long)]
    pub gain: Option<f64>,

    /// IF gain in dB
    #[arg(long)]
    pub if_gain: Option<f64>,

    /// Frequency correction in PPM
    #[arg(long, allow_hyphen_values = true)]
    pub ppm_correction: Option<i32>,

    /// Per-bin smoothing coefficient in (0, 1], 1 disables smoothing
    #[arg(long)]
    pub iir_alpha: Option<f32>,

    /// Stop after this many sweeps
    #[arg(long)]
    pub sweeps: Option<u64>,

    /// Append detected signals to this CSV file
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// RTL-SDR device index
    #[arg(long)]
    pub device_index: Option<u32>,

    /// Sample source
    #[arg(long, value_enum, default_value = "rtlsdr")]
    pub source: SourceArg,

    /// Recording to read when --source=file (.wav or raw cf32)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Simulated carrier as FREQ[:AMPLITUDE], may be repeated
    #[arg(long = "carrier")]
    pub carriers: Vec<Carrier>,

    /// RMS noise amplitude of the simulated source
    #[arg(long, default_value_t = 0.01)]
    pub noise_amplitude: f32,

    /// Random seed of the simulated source
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Ignore the stored configuration
    #[arg(long, default_value_t = false)]
    pub no_config: bool,

    /// Store the effective configuration before scanning
    #[arg(long, default_value_t = false)]
    pub save_config: bool,

    /// List RTL-SDR devices and exit
    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Override `config` with every option given on the command line.
    pub fn apply(&self, config: &mut ScanConfig) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut config.start_frequency, &self.start_frequency);
        set(&mut config.stop_frequency, &self.stop_frequency);
        set(&mut config.sample_rate, &self.sample_rate);
        set(&mut config.fft_width, &self.fft_width);
        set(&mut config.narrow_bandwidth, &self.narrow_bandwidth);
        set(&mut config.coarse_bandwidth, &self.coarse_bandwidth);
        set(&mut config.average_size, &self.average_size);
        set(&mut config.spread, &self.spread);
        set(&mut config.threshold, &self.threshold);
        set(&mut config.pause_time, &self.pause_time);
        set(&mut config.gain, &self.gain);
        set(&mut config.if_gain, &self.if_gain);
        set(&mut config.ppm_correction, &self.ppm_correction);
        set(&mut config.iir_alpha, &self.iir_alpha);
        set(&mut config.device_index, &self.device_index);
        if self.step.is_some() {
            config.step = self.step;
        }
        if self.sweeps.is_some() {
            config.sweeps = self.sweeps;
        }
        if self.output.is_some() {
            config.output.clone_from(&self.output);
        }
    }

    /// The sample source selected on the command line.
    pub fn source_kind(&self, config: &ScanConfig) -> Result<SourceKind, ScanError> {
        match self.source {
            SourceArg::Rtlsdr => Ok(SourceKind::RtlSdr {
                device_index: config.device_index,
            }),
            SourceArg::File => {
                let path = self
                    .file
                    .clone()
                    .ok_or_else(|| ScanError::invalid("file", "is required with --source=file"))?;
                Ok(SourceKind::File { path })
            }
            SourceArg::Sim => Ok(SourceKind::Simulated {
                carriers: self.carriers.clone(),
                noise_amplitude: self.noise_amplitude,
                seed: self.seed,
            }),
        }
    }
}
