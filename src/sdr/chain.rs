//! The flowgraph's DSP stages composed without the runtime.
//!
//! [`SpectrumChain`] runs window → FFT → |·|² → IIR → log on one vector at a
//! time. The blocks in the flowgraph wrap the very same processors, so this is
//! what offline analysis and the tests use to reproduce the sink's input.

use num_complex::Complex;

use crate::config::ScanConfig;
use crate::sdr::complex_to_mag::mag_squared;
use crate::sdr::nlog10::NLog10;
use crate::sdr::single_pole_iir::SinglePoleIir;
use crate::sdr::window::{blackman_window, log_offset, window_power};
use crate::sdr::windowed_fft::WindowedFft;

/// Parameters shared by the flowgraph and [`SpectrumChain`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChainParameters {
    /// Window coefficients, one per bin
    pub window: Vec<f32>,
    /// Log stage multiplier
    pub log_n: f32,
    /// Log stage offset
    pub log_k: f32,
    /// IIR smoothing coefficient
    pub iir_alpha: f32,
}

impl ChainParameters {
    #[must_use]
    pub fn new(fft_width: usize, iir_alpha: f32) -> Self {
        let window = blackman_window(fft_width);
        let log_k = log_offset(fft_width, window_power(&window));
        Self {
            window,
            log_n: 10.0,
            log_k,
            iir_alpha,
        }
    }

    #[must_use]
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.fft_width, config.iir_alpha)
    }

    /// Vector length of the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Window, FFT, power, smoothing and log scaling over one vector.
#[derive(Debug)]
pub struct SpectrumChain {
    fft: WindowedFft,
    iir: SinglePoleIir,
    log: NLog10,
    bins: Vec<Complex<f32>>,
    power: Vec<f32>,
}

impl SpectrumChain {
    #[must_use]
    pub fn new(params: ChainParameters) -> Self {
        let n = params.len();
        Self {
            iir: SinglePoleIir::new(params.iir_alpha, n),
            log: NLog10::new(params.log_n, params.log_k),
            fft: WindowedFft::new(params.window),
            bins: vec![Complex::new(0.0, 0.0); n],
            power: vec![0.0; n],
        }
    }

    /// Vector length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fft.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fft.is_empty()
    }

    /// Turn one vector of samples into one log-power vector (unshifted).
    pub fn process(&mut self, samples: &[Complex<f32>], output: &mut [f32]) {
        self.fft.transform(samples, &mut self.bins);
        mag_squared(&self.bins, &mut self.power);
        self.iir.process(&self.power, output);
        self.power.copy_from_slice(output);
        self.log.process(&self.power, output);
    }
}
