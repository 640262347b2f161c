//! Scanner sink block for FutureSDR.
//!
//! Receives log-power vectors, feeds them to a [`Scanner`], retunes the source
//! through the shared [`TunerHandle`] and forwards every [`ScanEvent`] to the
//! application over an async channel.
//!
//! After a retune the sink drops vectors until it reaches the first sample
//! the source took at the new frequency; the scanner's settle count starts
//! from there.

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
use tokio::sync::mpsc;

use crate::scanner::{ScanEvent, ScanPlan, Scanner};
use crate::sdr::tuner::TunerHandle;

/// Holds back vectors taken before the source applied the last retune.
#[derive(Debug, Default)]
struct RetuneGate {
    pending: Option<u64>,
}

impl RetuneGate {
    /// Ask the source to move to `center_frequency`; a no-op when it is
    /// already there.
    fn retune(&mut self, tuner: &TunerHandle, center_frequency: f64) {
        if (tuner.center_frequency() - center_frequency).abs() < 1e-3 {
            return;
        }
        tuner.retune(center_frequency);
        self.pending = Some(tuner.generation());
    }

    /// Whether the vector starting at `first_sample` was taken at the
    /// requested frequency.
    fn accepts(&mut self, tuner: &TunerHandle, first_sample: u64) -> bool {
        let Some(generation) = self.pending else {
            return true;
        };
        let (applied, applied_at) = tuner.applied();
        if applied >= generation && first_sample >= applied_at {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

/// Scanner sink block.
#[derive(Debug)]
pub struct ScannerSink {
    scanner: Scanner,
    tuner: TunerHandle,
    gate: RetuneGate,
    tx: mpsc::Sender<ScanEvent>,
    vectors: u64,
    dropped: u64,
}

impl ScannerSink {
    /// Create a new scanner sink.
    ///
    /// # Arguments
    /// * `plan` - Sweep and detection parameters
    /// * `tuner` - Handle shared with the source
    /// * `tx` - Channel the scan events are delivered on
    pub fn new(plan: ScanPlan, tuner: TunerHandle, tx: mpsc::Sender<ScanEvent>) -> Block {
        log::info!(
            "ScannerSink: {:.3}-{:.3} MHz, step {:.1} kHz, {} steps per sweep",
            plan.start_frequency / 1e6,
            plan.stop_frequency / 1e6,
            plan.step / 1e3,
            plan.steps_per_sweep()
        );
        Block::new(
            BlockMetaBuilder::new("ScannerSink").build(),
            StreamIoBuilder::new().add_input::<f32>("in").build(),
            MessageIoBuilder::new().build(),
            Self {
                scanner: Scanner::new(plan),
                tuner,
                gate: RetuneGate::default(),
                tx,
                vectors: 0,
                dropped: 0,
            },
        )
    }
}

#[async_trait]
impl Kernel for ScannerSink {
    async fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo<Self>,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let len = self.scanner.plan().fft_size;
        let input = sio.input(0).slice::<f32>();
        let n_vectors = input.len() / len;

        let mut events = Vec::new();
        for (i, vector) in input.chunks_exact(len).take(n_vectors).enumerate() {
            let first_sample = (self.vectors + i as u64) * len as u64;
            if !self.gate.accepts(&self.tuner, first_sample) {
                self.dropped += 1;
                continue;
            }
            for event in self.scanner.process_vector(vector) {
                if let ScanEvent::Retuned { center_frequency } = event {
                    self.gate.retune(&self.tuner, center_frequency);
                }
                events.push(event);
            }
            if self.scanner.is_finished() {
                break;
            }
        }
        sio.input(0).consume(n_vectors * len);

        self.vectors += n_vectors as u64;
        if n_vectors > 0 && self.vectors % 10_000 < n_vectors as u64 {
            log::debug!(
                "ScannerSink: {} vectors ({} before retunes), sweep {}, at {:.3} MHz",
                self.vectors,
                self.dropped,
                self.scanner.sweep(),
                self.scanner.center_frequency() / 1e6
            );
        }

        for event in events {
            if self.tx.send(event).await.is_err() {
                log::warn!("Scan event receiver closed, stopping scan");
                self.tuner.stop();
                io.finished = true;
                return Ok(());
            }
        }

        if self.scanner.is_finished() {
            log::info!("Scan complete after {} sweep(s)", self.scanner.sweep());
            self.tuner.stop();
            io.finished = true;
        } else if sio.input(0).finished() && input.len() - n_vectors * len < len {
            log::info!("Input stream ended, stopping scan");
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
    fn test_gate_waits_for_first_retuned_sample() {
        let tuner = TunerHandle::new(100e6);
        let mut gate = RetuneGate::default();
        assert!(gate.accepts(&tuner, 0));

        gate.retune(&tuner, 100.5e6);
        assert_eq!(tuner.center_frequency(), 100.5e6);
        // Source has not applied it yet
        assert!(!gate.accepts(&tuner, 5000));

        // Applied at sample 8000: vectors starting earlier are stale
        tuner.mark_applied(tuner.generation(), 8000);
        assert!(!gate.accepts(&tuner, 7000));
        assert!(gate.accepts(&tuner, 8000));
        assert!(gate.accepts(&tuner, 9000));
    }

    #[test]
    fn test_gate_ignores_retune_to_same_frequency() {
        let tuner = TunerHandle::new(100e6);
        let mut gate = RetuneGate::default();
        gate.retune(&tuner, 100e6);
        assert_eq!(tuner.generation(), 0);
        assert!(gate.accepts(&tuner, 1000));
    }
}
