//! Per-bin single-pole IIR smoothing of power spectra.
//!
//! `y[k] = α·x[k] + (1-α)·y_prev[k]` for every bin `k`. With `α = 1.0` the
//! filter is a pass-through.

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

/// Vector single-pole IIR filter.
#[derive(Debug, Clone)]
pub struct SinglePoleIir {
    alpha: f32,
    state: Vec<f32>,
    primed: bool,
}

impl SinglePoleIir {
    /// Create a filter over vectors of `len` bins.
    ///
    /// `alpha` is clamped into `(0, 1]`.
    #[must_use]
    pub fn new(alpha: f32, len: usize) -> Self {
        Self {
            alpha: alpha.clamp(1e-6, 1.0),
            state: vec![0.0; len],
            primed: false,
        }
    }

    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Vector length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Filter one vector. The first vector seeds the state unchanged.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.len());

        if self.primed {
            let beta = 1.0 - self.alpha;
            for (state, &x) in self.state.iter_mut().zip(input) {
                *state = self.alpha * x + beta * *state;
            }
        } else {
            self.state.copy_from_slice(input);
            self.primed = true;
        }
        output.copy_from_slice(&self.state);
    }
}

/// FutureSDR wrapper around [`SinglePoleIir`].
#[derive(Debug)]
pub struct SinglePoleIirBlock {
    iir: SinglePoleIir,
}

impl SinglePoleIirBlock {
    /// Create a new vector IIR block.
    pub fn new(alpha: f32, len: usize) -> Block {
        log::info!("SinglePoleIir: alpha {alpha}, {len} bins");
        Block::new(
            BlockMetaBuilder::new("SinglePoleIir").build(),
            StreamIoBuilder::new()
                .add_input::<f32>("in")
                .add_output::<f32>("out")
                .build(),
            MessageIoBuilder::new().build(),
            Self {
                iir: SinglePoleIir::new(alpha, len),
            },
        )
    }
}

#[async_trait]
impl Kernel for SinglePoleIirBlock {
    async fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo<Self>,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let len = self.iir.len();
        let input = sio.input(0).slice::<f32>();
        let output = sio.output(0).slice::<f32>();

        let n_vectors = (input.len() / len).min(output.len() / len);

        for (src, dst) in input
            .chunks_exact(len)
            .zip(output.chunks_exact_mut(len))
            .take(n_vectors)
        {
            self.iir.process(src, dst);
        }

        sio.input(0).consume(n_vectors * len);
        sio.output(0).produce(n_vectors * len);

        if sio.input(0).finished() && input.len() - n_vectors * len < len {
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

    #[test]
    fn test_unit_alpha_is_passthrough() {
        let mut iir = SinglePoleIir::new(1.0, 3);
        let mut out = [0.0; 3];
        iir.process(&[1.0, 2.0, 3.0], &mut out);
        iir.process(&[4.0, 5.0, 6.0], &mut out);
        assert_eq!(out, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_smoothing_per_bin() {
        let mut iir = SinglePoleIir::new(0.5, 2);
        let mut out = [0.0; 2];
        iir.process(&[0.0, 10.0], &mut out);
        assert_eq!(out, [0.0, 10.0]);
        iir.process(&[8.0, 0.0], &mut out);
        assert_eq!(out, [4.0, 5.0]);
        iir.process(&[8.0, 0.0], &mut out);
        assert_eq!(out, [6.0, 2.5]);
    }

    #[test]
    fn test_alpha_clamped() {
        assert_eq!(SinglePoleIir::new(2.0, 1).alpha(), 1.0);
        assert!(SinglePoleIir::new(0.0, 1).alpha() > 0.0);
    }
}
