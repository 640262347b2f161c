//! Flowgraph construction for a scan.
//!
//! ```text
//! Source → WindowedFft(N) → ComplexToMagSquared → SinglePoleIir → NLog10 → ScannerSink
//! ```
//!
//! Every stage after the source works on whole vectors of `fft_width`
//! samples.

use std::fmt::Write as _;
use std::path::PathBuf;

use futuresdr::anyhow::{Context, Result};
use futuresdr::blocks::FileSource;
use futuresdr::runtime::{Block, Flowgraph};
use num_complex::Complex;
use tokio::sync::mpsc;

use crate::config::ScanConfig;
use crate::scanner::{ScanEvent, ScanPlan};
use crate::sdr::chain::ChainParameters;
use crate::sdr::complex_to_mag::ComplexToMagSquared;
use crate::sdr::nlog10::NLog10Block;
use crate::sdr::rtlsdr_source::{RtlSdrConfig, RtlSdrSource};
use crate::sdr::scanner_sink::ScannerSink;
use crate::sdr::simulated_source::{Carrier, CarrierGenerator, SimulatedSource};
use crate::sdr::single_pole_iir::SinglePoleIirBlock;
use crate::sdr::tuner::{GainMode, TunerHandle, TunerSettings};
use crate::sdr::wav_source::WavSource;
use crate::sdr::windowed_fft::WindowedFftBlock;

/// Where the IQ samples come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// RTL-SDR receiver (requires the `hardware` feature)
    RtlSdr {
        /// Device index (0-based)
        device_index: u32,
    },
    /// Recording on disk: stereo `.wav`, anything else is read as raw cf32
    File {
        /// Path to the recording
        path: PathBuf,
    },
    /// Synthetic carriers in Gaussian noise
    Simulated {
        /// Carriers at absolute RF frequencies
        carriers: Vec<Carrier>,
        /// RMS of the complex noise
        noise_amplitude: f32,
        /// RNG seed
        seed: u64,
    },
}

/// Front-end settings for the start of a scan.
#[must_use]
pub fn tuner_settings(config: &ScanConfig) -> TunerSettings {
    TunerSettings {
        sample_rate: config.sample_rate,
        center_frequency: config.start_frequency,
        ppm_correction: config.ppm_correction,
        gain_mode: GainMode::Manual(config.gain),
        if_gain: config.if_gain,
    }
}

/// Sweep plan for `config` as far as `source` can follow it.
///
/// Recordings cannot retune, so a file scan stays at the start frequency
/// (taken as the recording's centre) and covers the recorded band once per
/// sweep.
#[must_use]
pub fn scan_plan(config: &ScanConfig, source: &SourceKind) -> ScanPlan {
    let plan = ScanPlan::from_config(config);
    match source {
        SourceKind::File { .. } => plan.fixed_center(),
        SourceKind::RtlSdr { .. } | SourceKind::Simulated { .. } => plan,
    }
}

/// Builder for the scan flowgraph.
#[derive(Debug)]
pub struct TopBlock;

impl TopBlock {
    /// Build the flowgraph for `config` reading from `source`.
    ///
    /// The sink retunes through `tuner` and delivers its events on `tx`.
    ///
    /// # Errors
    /// Returns error if the source cannot be opened or the blocks cannot be
    /// connected
    pub fn build(
        config: &ScanConfig,
        source: &SourceKind,
        tuner: TunerHandle,
        tx: mpsc::Sender<ScanEvent>,
    ) -> Result<Flowgraph> {
        let params = ChainParameters::from_config(config);
        let plan = scan_plan(config, source);
        let len = params.len();

        let mut fg = Flowgraph::new();

        let src = fg.add_block(Self::source_block(config, source, tuner.clone())?);
        let fft = fg.add_block(WindowedFftBlock::new(params.window.clone()));
        let mag = fg.add_block(ComplexToMagSquared::new());
        let iir = fg.add_block(SinglePoleIirBlock::new(params.iir_alpha, len));
        let log = fg.add_block(NLog10Block::new(params.log_n, params.log_k));
        let sink = fg.add_block(ScannerSink::new(plan, tuner, tx));

        fg.connect_stream(src, "out", fft, "in")?;
        fg.connect_stream(fft, "out", mag, "in")?;
        fg.connect_stream(mag, "out", iir, "in")?;
        fg.connect_stream(iir, "out", log, "in")?;
        fg.connect_stream(log, "out", sink, "in")?;

        log::info!("Flowgraph built successfully");
        log::info!(
            "  Source → WindowedFft({len}) → ComplexToMagSquared → SinglePoleIir({}) → NLog10(10, {:.3}) → ScannerSink",
            params.iir_alpha,
            params.log_k
        );
        Ok(fg)
    }

    fn source_block(config: &ScanConfig, source: &SourceKind, tuner: TunerHandle) -> Result<Block> {
        match source {
            SourceKind::RtlSdr { device_index } => {
                let rtl = RtlSdrConfig {
                    device_index: *device_index,
                    settings: tuner_settings(config),
                };
                RtlSdrSource::new(rtl, tuner).context("Failed to create RTL-SDR source")
            }
            SourceKind::File { path } => {
                if !path.exists() {
                    return Err(futuresdr::anyhow::anyhow!(
                        "IQ file not found: {}",
                        path.display()
                    ));
                }
                let extension = path
                    .extension()
                    .and_then(|s| s.to_str())
                    .unwrap_or("")
                    .to_lowercase();

                log::info!(
                    "File sources cannot retune, analysing {:.3} MHz ± {:.1} kHz",
                    config.start_frequency / 1e6,
                    config.sample_rate / 2e3
                );
                if extension == "wav" {
                    log::info!("File format: stereo WAV");
                    Ok(WavSource::new(path, config.sample_rate, tuner)?)
                } else {
                    if !matches!(extension.as_str(), "cf32" | "iq" | "cfile") {
                        log::warn!("Unknown file extension '.{extension}', assuming raw IQ format");
                    }
                    log::info!("File format: Complex Float32 (.cf32)");
                    Ok(FileSource::<Complex<f32>>::new(
                        path.to_str().context("Invalid file path")?,
                        false,
                    ))
                }
            }
            SourceKind::Simulated {
                carriers,
                noise_amplitude,
                seed,
            } => {
                let generator = CarrierGenerator::new(
                    carriers.clone(),
                    config.sample_rate,
                    *noise_amplitude,
                    *seed,
                )?;
                Ok(SimulatedSource::new(generator, tuner))
            }
        }
    }
}

/// Run parameters, one per line.
#[must_use]
pub fn format_run_params(config: &ScanConfig) -> String {
    let mut out = String::new();
    let mut line = |label: &str, value: String| {
        let _ = writeln!(out, "{label}: \t{value}");
    };
    line("Start Freq", format!("{:.6}", config.start_frequency));
    line("Stop Freq", format!("{:.6}", config.stop_frequency));
    line("Sample Rate", format!("{:.6}", config.sample_rate));
    line("FFT Width", format!("{:.6}", config.fft_width as f64));
    line("Narrow BW", format!("{:.6}", config.narrow_bandwidth));
    line("Course BW", format!("{:.6}", config.coarse_bandwidth));
    line("Step Size", format!("{:.6}", config.step()));
    line("FFT Average Size", config.average_size.to_string());
    line("Spread delta", format!("{:.6}", config.spread));
    line("Threshold", format!("{:.6}", config.threshold));
    line("Pause Time", format!("{:.6}", config.pause_time));
    out
}

/// Print the run parameters to stdout.
pub fn print_run_params(config: &ScanConfig) {
    print!("{}", format_run_params(config));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{Scanner, Signal};
    use crate::sdr::chain::SpectrumChain;
    use crate::sdr::wav_source::{write_iq_wav, WavIqReader};

    fn recording_config() -> ScanConfig {
        ScanConfig {
            start_frequency: 100e6,
            stop_frequency: 101e6,
            step: Some(500e3),
            average_size: 4,
            threshold: 10.0,
            pause_time: 0.0,
            sweeps: Some(1),
            ..Default::default()
        }
    }

    /// 2 MS/s recording centred on 100 MHz with one carrier at +100 kHz.
    fn recording(name: &str, vectors: usize) -> PathBuf {
        let config = recording_config();
        let carrier = Carrier {
            frequency: 100.1e6,
            amplitude: 0.5,
        };
        let mut generator =
            CarrierGenerator::new(vec![carrier], config.sample_rate, 0.01, 3).unwrap();
        let mut samples = vec![Complex::new(0.0, 0.0); vectors * config.fft_width];
        generator.fill(config.start_frequency, &mut samples);

        let path = std::env::temp_dir().join(format!("sdr_scan_{}_{name}.wav", std::process::id()));
        write_iq_wav(&path, config.sample_rate as u32, &samples).unwrap();
        path
    }

    #[test]
    fn test_format_run_params() {
        let text = format_run_params(&ScanConfig::default());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "Start Freq: \t87500000.000000");
        assert_eq!(lines[1], "Stop Freq: \t108000000.000000");
        assert_eq!(lines[3], "FFT Width: \t1000.000000");
        assert_eq!(lines[5], "Course BW: \t200000.000000");
        assert_eq!(lines[6], "Step Size: \t500000.000000");
        assert_eq!(lines[7], "FFT Average Size: \t100");
        assert_eq!(lines[9], "Threshold: \t3.000000");
        assert_eq!(lines[10], "Pause Time: \t0.100000");
    }

    #[test]
    fn test_tuner_settings_use_manual_gain() {
        let config = ScanConfig {
            gain: 42.0,
            ppm_correction: -3,
            ..Default::default()
        };
        let settings = tuner_settings(&config);
        assert_eq!(settings.gain_mode, GainMode::Manual(42.0));
        assert_eq!(settings.gain_mode.tenths_db(), Some(420));
        assert_eq!(settings.center_frequency, config.start_frequency);
        assert_eq!(settings.ppm_correction, -3);
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let (tx, _rx) = mpsc::channel(4);
        let source = SourceKind::File {
            path: PathBuf::from("/nonexistent/recording.cf32"),
        };
        let result = TopBlock::build(
            &ScanConfig::default(),
            &source,
            TunerHandle::new(100e6),
            tx,
        );
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("not found"), "{err}");
    }

    #[test]
    fn test_simulated_flowgraph_builds() {
        let (tx, _rx) = mpsc::channel(4);
        let source = SourceKind::Simulated {
            carriers: vec![Carrier {
                frequency: 100e6,
                amplitude: 1.0,
            }],
            noise_amplitude: 0.01,
            seed: 1,
        };
        assert!(TopBlock::build(&ScanConfig::default(), &source, TunerHandle::new(87.5e6), tx).is_ok());
    }

    #[test]
    fn test_file_plan_stays_at_start() {
        let config = recording_config();
        let file = SourceKind::File {
            path: PathBuf::from("capture.wav"),
        };
        let plan = scan_plan(&config, &file);
        assert_eq!(plan.stop_frequency, 100e6);
        assert_eq!(plan.steps_per_sweep(), 1);
        assert_eq!(plan.analysis_range(), 0..config.fft_width);

        let sim = SourceKind::Simulated {
            carriers: Vec::new(),
            noise_amplitude: 0.01,
            seed: 1,
        };
        assert_eq!(scan_plan(&config, &sim).steps_per_sweep(), 3);
    }

    #[test]
    fn test_recording_reports_carrier_once() {
        let config = recording_config();
        let path = recording("once", 20);
        let source = SourceKind::File { path: path.clone() };

        let mut reader = WavIqReader::open(&path).unwrap();
        let mut chain = SpectrumChain::new(ChainParameters::from_config(&config));
        let mut scanner = Scanner::new(scan_plan(&config, &source));
        let mut samples = vec![Complex::new(0.0, 0.0); config.fft_width];
        let mut levels = vec![0.0; config.fft_width];
        let mut signals: Vec<Signal> = Vec::new();

        while !scanner.is_finished() && reader.read_into(&mut samples).unwrap() == samples.len() {
            chain.process(&samples, &mut levels);
            for event in scanner.process_vector(&levels) {
                if let ScanEvent::Signal(signal) = event {
                    signals.push(signal);
                }
            }
        }
        let _ = std::fs::remove_file(&path);

        assert!(scanner.is_finished());
        assert_eq!(signals.len(), 1, "{signals:?}");
        assert!((signals[0].frequency - 100.1e6).abs() <= 4000.0);
        assert_eq!(signals[0].center_frequency, 100e6);
    }

    #[test]
    fn test_recording_rate_must_match_config() {
        let path = recording("rate", 1);
        let config = ScanConfig {
            sample_rate: 48_000.0,
            ..recording_config()
        };
        let (tx, _rx) = mpsc::channel(4);
        let source = SourceKind::File { path: path.clone() };
        let result = TopBlock::build(&config, &source, TunerHandle::new(100e6), tx);
        let _ = std::fs::remove_file(&path);

        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("sample rate"), "{err}");
    }
}
