//! Logarithmic scaling block (`n·log10(x) + k`) for FutureSDR.

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

/// Smallest value fed to `log10`, keeps empty bins finite.
const FLOOR: f32 = 1e-20;

/// `n·log10(x) + k` with a floor on non-positive input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NLog10 {
    pub n: f32,
    pub k: f32,
}

impl NLog10 {
    #[must_use]
    pub fn new(n: f32, k: f32) -> Self {
        Self { n, k }
    }

    #[must_use]
    pub fn apply(&self, x: f32) -> f32 {
        self.n * x.max(FLOOR).log10() + self.k
    }

    /// Scale `input` into `output`, returning the number of samples written.
    pub fn process(&self, input: &[f32], output: &mut [f32]) -> usize {
        let n = input.len().min(output.len());
        for (out, &x) in output[..n].iter_mut().zip(&input[..n]) {
            *out = self.apply(x);
        }
        n
    }
}

/// FutureSDR wrapper around [`NLog10`].
#[derive(Debug)]
pub struct NLog10Block {
    scale: NLog10,
}

impl NLog10Block {
    /// Create a new log scaling block.
    pub fn new(n: f32, k: f32) -> Block {
        log::info!("NLog10: {n}·log10(x) + {k:.3}");
        Block::new(
            BlockMetaBuilder::new("NLog10").build(),
            StreamIoBuilder::new()
                .add_input::<f32>("in")
                .add_output::<f32>("out")
                .build(),
            MessageIoBuilder::new().build(),
            Self {
                scale: NLog10::new(n, k),
            },
        )
    }
}

#[async_trait]
impl Kernel for NLog10Block {
    async fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo<Self>,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let input = sio.input(0).slice::<f32>();
        let output = sio.output(0).slice::<f32>();

        let n = self.scale.process(input, output);

        sio.input(0).consume(n);
        sio.output(0).produce(n);

        if sio.input(0).finished() && n == input.len() {
            io.finished = true;
        } else if n > 0 {
            io.call_again = true;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_to_db() {
        let scale = NLog10::new(10.0, 0.0);
        assert!((scale.apply(100.0) - 20.0).abs() < 1e-5);
        assert!((scale.apply(0.01) + 20.0).abs() < 1e-5);
    }

    #[test]
    fn test_offset_and_floor() {
        let scale = NLog10::new(10.0, -5.0);
        let mut out = [0.0; 3];
        assert_eq!(scale.process(&[1.0, 0.0, -4.0], &mut out), 3);
        assert!((out[0] + 5.0).abs() < 1e-6);
        assert!((out[1] + 205.0).abs() < 1e-3);
        assert_eq!(out[1], out[2]);
    }
}
