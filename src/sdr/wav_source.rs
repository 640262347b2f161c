//! WAV recording source block for FutureSDR.
//!
//! Plays back an IQ recording stored as a stereo WAV file (left = I,
//! right = Q). 8/16-bit integer and 32-bit float recordings are accepted.
//! Recordings have a fixed centre frequency and sample rate. The scan plan is
//! pinned to that centre and the header rate must match the configured one;
//! the source only honours the tuner's stop flag.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

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
use hound::{SampleFormat, WavReader};
use num_complex::Complex;

use crate::error::ScanError;
use crate::sdr::tuner::TunerHandle;

/// Interleaved I/Q reader over a stereo WAV file.
pub struct WavIqReader {
    reader: WavReader<BufReader<File>>,
    scale: f32,
    float: bool,
}

impl std::fmt::Debug for WavIqReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavIqReader")
            .field("sample_rate", &self.sample_rate())
            .field("scale", &self.scale)
            .field("float", &self.float)
            .finish()
    }
}

impl WavIqReader {
    /// Open and validate a recording.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let reader = WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        if spec.channels != 2 {
            return Err(ScanError::Source(format!(
                "WAV file must be stereo (2 channels), found {} channels",
                spec.channels
            )));
        }

        let (scale, float) = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, bits @ (8 | 16)) => (1.0 / (1u32 << (bits - 1)) as f32, false),
            (SampleFormat::Float, 32) => (1.0, true),
            (format, bits) => {
                return Err(ScanError::Source(format!(
                    "unsupported WAV sample format: {bits}-bit {format:?}"
                )))
            }
        };

        log::info!(
            "Opened WAV recording: {} Hz, {}-bit, {:.2} seconds",
            spec.sample_rate,
            spec.bits_per_sample,
            f64::from(reader.duration()) / f64::from(spec.sample_rate)
        );

        Ok(Self {
            reader,
            scale,
            float,
        })
    }

    /// Sample rate stored in the header.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.reader.spec().sample_rate
    }

    /// Fail unless the header rate equals `sample_rate`; bin frequencies are
    /// derived from the configured rate.
    pub fn expect_sample_rate(&self, sample_rate: f64) -> Result<(), ScanError> {
        let actual = f64::from(self.sample_rate());
        if (actual - sample_rate).abs() > 0.5 {
            return Err(ScanError::Source(format!(
                "recording sample rate {actual} Hz does not match configured sample rate {sample_rate} Hz"
            )));
        }
        Ok(())
    }

    /// Read up to `out.len()` complex samples; returns 0 at end of file.
    pub fn read_into(&mut self, out: &mut [Complex<f32>]) -> Result<usize, ScanError> {
        let mut n = 0;
        if self.float {
            let mut samples = self.reader.samples::<f32>();
            while n < out.len() {
                match (samples.next(), samples.next()) {
                    (Some(i), Some(q)) => out[n] = Complex::new(i?, q?),
                    _ => break,
                }
                n += 1;
            }
        } else {
            let mut samples = self.reader.samples::<i16>();
            while n < out.len() {
                match (samples.next(), samples.next()) {
                    (Some(i), Some(q)) => {
                        out[n] = Complex::new(f32::from(i?) * self.scale, f32::from(q?) * self.scale);
                    }
                    _ => break,
                }
                n += 1;
            }
        }
        Ok(n)
    }
}

/// WAV file source block.
#[derive(Debug)]
pub struct WavSource {
    reader: WavIqReader,
    tuner: TunerHandle,
}

impl WavSource {
    /// Create a new WAV source block for a recording taken at `sample_rate`.
    pub fn new(
        path: impl AsRef<Path>,
        sample_rate: f64,
        tuner: TunerHandle,
    ) -> Result<Block, ScanError> {
        let reader = WavIqReader::open(path)?;
        reader.expect_sample_rate(sample_rate)?;
        Ok(Block::new(
            BlockMetaBuilder::new("WavSource").build(),
            StreamIoBuilder::new()
                .add_output::<Complex<f32>>("out")
                .build(),
            MessageIoBuilder::new().build(),
            Self { reader, tuner },
        ))
    }
}

#[async_trait]
impl Kernel for WavSource {
    async fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo<Self>,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        if self.tuner.is_stopped() {
            io.finished = true;
            return Ok(());
        }

        let output = sio.output(0).slice::<Complex<f32>>();
        let n = self.reader.read_into(output)?;

        if n == 0 && !output.is_empty() {
            log::info!("WAV recording finished");
            io.finished = true;
        } else {
            sio.output(0).produce(n);
            io.call_again = true;
        }

        Ok(())
    }
}

/// Write `samples` as a 32-bit float stereo recording.
#[cfg(test)]
pub(crate) fn write_iq_wav(
    path: &Path,
    sample_rate: u32,
    samples: &[Complex<f32>],
) -> Result<(), ScanError> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in samples {
        writer.write_sample(sample.re)?;
        writer.write_sample(sample.im)?;
    }
    writer.finalize()?;
    Ok(())
}
