//! Synthetic IQ source for FutureSDR.
//!
//! Generates Gaussian noise plus carriers at absolute RF frequencies. Carriers
//! are mixed down relative to the tuner's current centre frequency, so a scan
//! over the simulated band behaves like a scan over a real one: carriers move
//! across the spectrum as the scanner retunes and vanish outside the sample
//! rate.

use std::f64::consts::TAU;
use std::str::FromStr;

use futuresdr::anyhow::Result;
use futuresdr::async_trait::async_trait;
use futuresdr::runtime::Block;
use futuresdr::runtime::BlockMeta;
use futuresdr::runtime::BlockMetaBuilder;
use futuresdr::runtime::Kernel;
use futuresdr::runtime::MessageIo;
use futuresdr::runtime::MessageIoBuilder;
use futuresdr::runtime::StreamIo;
use futuresdr::runtime::StreamIoBuilder;
use futuresdr::runtime::WorkIo;
use num_complex::Complex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::ScanError;
use crate::sdr::tuner::TunerHandle;

/// A continuous-wave carrier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Carrier {
    /// RF frequency in Hz
    pub frequency: f64,
    /// Linear amplitude (1.0 is full scale)
    pub amplitude: f32,
}

impl FromStr for Carrier {
    type Err = ScanError;

    /// Parse `FREQ` or `FREQ:AMPLITUDE`, e.g. `100.3e6:0.5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (freq, amp) = match s.split_once(':') {
            Some((freq, amp)) => (freq, Some(amp)),
            None => (s, None),
        };
        let frequency = freq
            .trim()
            .parse::<f64>()
            .map_err(|e| ScanError::invalid("carrier", format!("bad frequency '{freq}': {e}")))?;
        let amplitude = match amp {
            Some(a) => a
                .trim()
                .parse::<f32>()
                .map_err(|e| ScanError::invalid("carrier", format!("bad amplitude '{a}': {e}")))?,
            None => 1.0,
        };
        Ok(Self {
            frequency,
            amplitude,
        })
    }
}

/// Sample generator behind [`SimulatedSource`].
#[derive(Debug)]
pub struct CarrierGenerator {
    carriers: Vec<Carrier>,
    sample_rate: f64,
    noise: Normal<f32>,
    rng: StdRng,
    sample_index: u64,
    generation: u64,
}

impl CarrierGenerator {
    /// `noise_amplitude` is the RMS of the complex noise.
    pub fn new(
        carriers: Vec<Carrier>,
        sample_rate: f64,
        noise_amplitude: f32,
        seed: u64,
    ) -> Result<Self, ScanError> {
        if !noise_amplitude.is_finite() || noise_amplitude < 0.0 {
            return Err(ScanError::invalid(
                "noise_amplitude",
                format!("must be a finite non-negative number, got {noise_amplitude}"),
            ));
        }
        let noise = Normal::new(0.0, noise_amplitude / std::f32::consts::SQRT_2)
            .map_err(|e| ScanError::invalid("noise_amplitude", e.to_string()))?;
        Ok(Self {
            carriers,
            sample_rate,
            noise,
            rng: StdRng::seed_from_u64(seed),
            sample_index: 0,
            generation: 0,
        })
    }

    /// Fill `out` with baseband samples as seen by a receiver tuned to
    /// `center_frequency`.
    pub fn fill(&mut self, center_frequency: f64, out: &mut [Complex<f32>]) {
        let nyquist = self.sample_rate / 2.0;
        let visible: Vec<(f64, f32)> = self
            .carriers
            .iter()
            .map(|c| (c.frequency - center_frequency, c.amplitude))
            .filter(|(offset, _)| offset.abs() < nyquist)
            .collect();

        for sample in out.iter_mut() {
            let t = self.sample_index as f64 / self.sample_rate;
            let mut acc = Complex::new(self.noise.sample(&mut self.rng), self.noise.sample(&mut self.rng));
            for &(offset, amplitude) in &visible {
                let phase = TAU * (offset * t).fract();
                acc += Complex::from_polar(amplitude, phase as f32);
            }
            *sample = acc;
            self.sample_index += 1;
        }
    }

    /// Fill `out` at the tuner's current centre, acknowledging a pending
    /// retune at the first sample generated for it.
    pub fn fill_tuned(&mut self, tuner: &TunerHandle, out: &mut [Complex<f32>]) {
        let generation = tuner.generation();
        if generation != self.generation {
            tuner.mark_applied(generation, self.sample_index);
            self.generation = generation;
        }
        self.fill(tuner.center_frequency(), out);
    }
}

/// Simulated IQ source block.
#[derive(Debug)]
pub struct SimulatedSource {
    generator: CarrierGenerator,
    tuner: TunerHandle,
}

impl SimulatedSource {
    /// Create a new simulated source following `tuner`.
    pub fn new(generator: CarrierGenerator, tuner: TunerHandle) -> Block {
        log::info!(
            "SimulatedSource: {} carrier(s) at {:.1} kS/s",
            generator.carriers.len(),
            generator.sample_rate / 1e3
        );
        for carrier in &generator.carriers {
            log::debug!(
                "  carrier {:.6} MHz, amplitude {}",
                carrier.frequency / 1e6,
                carrier.amplitude
            );
        }

        Block::new(
            BlockMetaBuilder::new("SimulatedSource").build(),
            StreamIoBuilder::new()
                .add_output::<Complex<f32>>("out")
                .build(),
            MessageIoBuilder::new().build(),
            Self { generator, tuner },
        )
    }
}

#[async_trait]
impl Kernel for SimulatedSource {
    async fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo<Self>,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        if self.tuner.is_stopped() {
            log::info!("SimulatedSource stopped");
            io.finished = true;
            return Ok(());
        }

        let output = sio.output(0).slice::<Complex<f32>>();
        let n = output.len();
        self.generator.fill_tuned(&self.tuner, output);
        sio.output(0).produce(n);

        io.call_again = true;
        Ok(())
    }
}
