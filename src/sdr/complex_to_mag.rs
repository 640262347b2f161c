//! Complex to magnitude-squared conversion block for FutureSDR.
//!
//! Turns FFT bins into linear power ahead of the IIR and log stages.

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

/// Write `re² + im²` of each input sample to `output`.
///
/// Processes `min(input.len(), output.len())` samples and returns that count.
pub fn mag_squared(input: &[Complex<f32>], output: &mut [f32]) -> usize {
    let n = input.len().min(output.len());
    for (out, sample) in output[..n].iter_mut().zip(&input[..n]) {
        *out = sample.norm_sqr();
    }
    n
}

/// Complex to magnitude-squared block.
#[derive(Debug)]
pub struct ComplexToMagSquared;

impl ComplexToMagSquared {
    /// Create a new complex-to-power block.
    pub fn new() -> Block {
        Block::new(
            BlockMetaBuilder::new("ComplexToMagSquared").build(),
            StreamIoBuilder::new()
                .add_input::<Complex<f32>>("in")
                .add_output::<f32>("out")
                .build(),
            MessageIoBuilder::new().build(),
            Self,
        )
    }
}

#[async_trait]
impl Kernel for ComplexToMagSquared {
    async fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo<Self>,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let input = sio.input(0).slice::<Complex<f32>>();
        let output = sio.output(0).slice::<f32>();

        let n = mag_squared(input, output);

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
