//! SDR (Software Defined Radio) module for the scan flowgraph.
//!
//! This module provides FutureSDR-based signal processing capabilities including:
//! - IQ ingestion from RTL-SDR hardware, recordings or a simulated band
//! - Windowed FFT, power, smoothing and log scaling stages
//! - The scanner sink that steps the tuner across the band

pub mod chain;
pub mod complex_to_mag;
pub mod nlog10;
pub mod rtlsdr_source;
pub mod scanner_sink;
pub mod simulated_source;
pub mod single_pole_iir;
pub mod top_block;
pub mod tuner;
pub mod wav_source;
pub mod window;
pub mod windowed_fft;

pub use chain::{ChainParameters, SpectrumChain};
pub use rtlsdr_source::{list_devices, DeviceInfo};
pub use simulated_source::Carrier;
pub use top_block::{format_run_params, print_run_params, SourceKind, TopBlock};
pub use tuner::{GainMode, TunerHandle, TunerSettings};
pub use window::blackman_window;
