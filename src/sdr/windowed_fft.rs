//! Windowed FFT block for FutureSDR.
//!
//! Groups the complex sample stream into vectors of the FFT width, applies the
//! window and computes a forward FFT. Output bins are neither shifted nor
//! normalised; the log stage and the scanner take care of both.

use std::sync::Arc;

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
use rustfft::{Fft, FftPlanner};

/// Window + forward FFT over fixed-size vectors.
pub struct WindowedFft {
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for WindowedFft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedFft")
            .field("len", &self.window.len())
            .finish_non_exhaustive()
    }
}

impl WindowedFft {
    /// Plan a forward FFT whose length is the window length.
    #[must_use]
    pub fn new(window: Vec<f32>) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(window.len());
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            window,
            fft,
            scratch,
        }
    }

    /// Vector length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Transform one vector. Both slices must be exactly [`Self::len`] long.
    pub fn transform(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
        debug_assert_eq!(input.len(), self.len());
        debug_assert_eq!(output.len(), self.len());

        for ((out, &sample), &w) in output.iter_mut().zip(input).zip(&self.window) {
            *out = sample * w;
        }
        self.fft.process_with_scratch(output, &mut self.scratch);
    }
}

/// FutureSDR wrapper around [`WindowedFft`].
///
/// Consumes and produces whole vectors only, so every downstream block sees
/// bin 0 at a multiple of the FFT width.
#[derive(Debug)]
pub struct WindowedFftBlock {
    fft: WindowedFft,
}

impl WindowedFftBlock {
    /// Create a new windowed FFT block; the FFT width is the window length.
    pub fn new(window: Vec<f32>) -> Block {
        log::info!("WindowedFft: {} bins", window.len());
        Block::new(
            BlockMetaBuilder::new("WindowedFft").build(),
            StreamIoBuilder::new()
                .add_input::<Complex<f32>>("in")
                .add_output::<Complex<f32>>("out")
                .build(),
            MessageIoBuilder::new().build(),
            Self {
                fft: WindowedFft::new(window),
            },
        )
    }
}

#[async_trait]
impl Kernel for WindowedFftBlock {
    async fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo<Self>,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let len = self.fft.len();
        let input = sio.input(0).slice::<Complex<f32>>();
        let output = sio.output(0).slice::<Complex<f32>>();

        let n_vectors = (input.len() / len).min(output.len() / len);

        for (src, dst) in input
            .chunks_exact(len)
            .zip(output.chunks_exact_mut(len))
            .take(n_vectors)
        {
            self.fft.transform(src, dst);
        }

        sio.input(0).consume(n_vectors * len);
        sio.output(0).produce(n_vectors * len);

        if sio.input(0).finished() && input.len() - n_vectors * len < len {
            // Trailing partial vector can never complete
            io.finished = true;
        } else if n_vectors > 0 {
            io.call_again = true;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdr::window::blackman_window;
    use std::f32::consts::PI;

    #[test]
    fn test_rectangular_dc() {
        let mut fft = WindowedFft::new(vec![1.0; 8]);
        let input = vec![Complex::new(1.0, 0.0); 8];
        let mut output = vec![Complex::new(0.0, 0.0); 8];
        fft.transform(&input, &mut output);

        assert!((output[0].re - 8.0).abs() < 1e-4);
        for bin in &output[1..] {
            assert!(bin.norm() < 1e-4);
        }
    }

    #[test]
    fn test_tone_lands_in_expected_bin() {
        let n = 64;
        let mut fft = WindowedFft::new(blackman_window(n));

        // Negative frequency tone: bin n - 5 of the unshifted output
        let input: Vec<Complex<f32>> = (0..n)
            .map(|i| Complex::from_polar(1.0, -2.0 * PI * 5.0 * i as f32 / n as f32))
            .collect();
        let mut output = vec![Complex::new(0.0, 0.0); n];
        fft.transform(&input, &mut output);

        let (peak, _) = output
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .unwrap();
        assert_eq!(peak, n - 5);
    }

    #[test]
    fn test_block_debug_shows_width() {
        let block = WindowedFftBlock {
            fft: WindowedFft::new(vec![1.0; 16]),
        };
        let text = format!("{block:?}");
        assert!(text.starts_with("WindowedFftBlock"), "{text}");
        assert!(text.contains("16"), "{text}");
    }
}
