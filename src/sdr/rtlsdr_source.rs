//! RTL-SDR hardware source for the scanner.
//!
//! This module provides RTL-SDR device enumeration and a FutureSDR source block
//! that follows the shared [`TunerHandle`]: retune requests from the scanner
//! sink are applied by the read thread between USB transfers. A transfer that
//! was in flight during a retune is dropped, and the block tells the tuner at
//! which output sample the new frequency starts.
//! Enable the `hardware` feature to compile with RTL-SDR support.

#[cfg(feature = "hardware")]
use futuresdr::anyhow::Result;
#[cfg(feature = "hardware")]
use num_complex::Complex;

use crate::sdr::tuner::{TunerHandle, TunerSettings};

/// Information about an RTL-SDR device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device index (0-based)
    pub index: u32,
    /// Device name (manufacturer + product)
    pub name: String,
    /// Device serial number
    pub serial: String,
}

/// Enumerate available RTL-SDR devices.
#[cfg(feature = "hardware")]
pub fn list_devices() -> Vec<DeviceInfo> {
    let count = rtlsdr::get_device_count();
    let mut devices = Vec::new();

    for i in 0..count {
        let name = rtlsdr::get_device_name(i);
        if let Ok(usb_strings) = rtlsdr::get_device_usb_strings(i) {
            devices.push(DeviceInfo {
                index: i as u32,
                name,
                serial: usb_strings.serial,
            });
        }
    }

    devices
}

/// Enumerate available RTL-SDR devices (stub when hardware feature is disabled).
#[cfg(not(feature = "hardware"))]
pub fn list_devices() -> Vec<DeviceInfo> {
    log::warn!("RTL-SDR hardware support not compiled (enable 'hardware' feature)");
    Vec::new()
}

/// RTL-SDR source configuration.
#[derive(Debug, Clone)]
pub struct RtlSdrConfig {
    /// Device index to open
    pub device_index: u32,
    /// Front-end settings
    pub settings: TunerSettings,
}

/// Bytes per USB transfer, a multiple of the 512 byte packet size.
#[cfg(feature = "hardware")]
const READ_SIZE: usize = 256 * 1024;

/// Ring buffer capacity in samples.
#[cfg(feature = "hardware")]
const RING_CAPACITY: usize = 512 * 1024;

/// RTL-SDR FutureSDR source block.
///
/// A background thread owns the device, applies retunes and pushes converted
/// samples into a ring buffer that `work` drains.
#[cfg(feature = "hardware")]
pub struct RtlSdrSource {
    consumer: ringbuf::Consumer<Complex<f32>, std::sync::Arc<ringbuf::HeapRb<Complex<f32>>>>,
    _thread_handle: std::thread::JoinHandle<()>,
    error: std::sync::Arc<std::sync::atomic::AtomicBool>,
    /// Retune generation last set on the device by the read thread
    retuned: std::sync::Arc<std::sync::atomic::AtomicU64>,
    /// Retune generation whose stale samples were already dropped
    flushed: u64,
    /// Samples produced so far
    produced: u64,
    tuner: TunerHandle,
}

#[cfg(feature = "hardware")]
impl std::fmt::Debug for RtlSdrSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtlSdrSource")
            .field("buffered", &self.consumer.len())
            .field("flushed", &self.flushed)
            .field("produced", &self.produced)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "hardware")]
fn apply_settings(device: &mut rtlsdr::RTLSDRDevice, settings: &TunerSettings) -> Result<()> {
    use futuresdr::anyhow::anyhow;

    let center = u32::try_from(settings.center_frequency as u64).map_err(|e| {
        anyhow!("Center frequency {} Hz is too large for RTL-SDR: {e}", settings.center_frequency)
    })?;
    device
        .set_center_freq(center)
        .map_err(|e| anyhow!("Failed to set center frequency: {e}"))?;
    device
        .set_sample_rate(settings.sample_rate as u32)
        .map_err(|e| anyhow!("Failed to set sample rate: {e}"))?;

    match settings.gain_mode.tenths_db() {
        None => device
            .set_tuner_gain_mode(false)
            .map_err(|e| anyhow!("Failed to set gain mode: {e}"))?,
        Some(tenths) => {
            device
                .set_tuner_gain_mode(true)
                .map_err(|e| anyhow!("Failed to set gain mode: {e}"))?;
            device
                .set_tuner_gain(tenths)
                .map_err(|e| anyhow!("Failed to set gain: {e}"))?;
        }
    }

    if settings.ppm_correction != 0 {
        device
            .set_freq_correction(settings.ppm_correction)
            .map_err(|e| anyhow!("Failed to set PPM correction: {e}"))?;
    }
    if settings.if_gain != 0.0 {
        log::info!("RTL-SDR has no IF gain stage, ignoring IF gain {} dB", settings.if_gain);
    }

    device
        .reset_buffer()
        .map_err(|e| anyhow!("Failed to reset buffer: {e}"))?;
    Ok(())
}

#[cfg(feature = "hardware")]
impl RtlSdrSource {
    /// Create a new RTL-SDR source block.
    ///
    /// # Errors
    /// Returns error if device cannot be opened or configured
    pub fn new(config: RtlSdrConfig, tuner: TunerHandle) -> Result<futuresdr::runtime::Block> {
        use futuresdr::anyhow::anyhow;
        use futuresdr::runtime::{Block, BlockMetaBuilder, MessageIoBuilder, StreamIoBuilder};
        use ringbuf::HeapRb;
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
        use std::sync::Arc;

        log::info!("Opening RTL-SDR device {}...", config.device_index);

        let (mut producer, consumer) = HeapRb::<Complex<f32>>::new(RING_CAPACITY).split();
        let error_flag = Arc::new(AtomicBool::new(false));
        let retuned = Arc::new(AtomicU64::new(tuner.generation()));

        // Initialisation result comes back from the read thread
        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<()>>();

        let thread_error = error_flag.clone();
        let thread_retuned = retuned.clone();
        let thread_tuner = tuner.clone();
        let thread_handle = std::thread::spawn(move || {
            let mut device = match rtlsdr::open(config.device_index as i32) {
                Ok(dev) => dev,
                Err(e) => {
                    let _ = init_tx.send(Err(anyhow!(
                        "Failed to open RTL-SDR device {}: {e}",
                        config.device_index
                    )));
                    return;
                }
            };

            if let Err(e) = apply_settings(&mut device, &config.settings) {
                let _ = init_tx.send(Err(e));
                return;
            }

            log::info!("RTL-SDR configured:");
            log::info!("  Center frequency: {:.3} MHz", config.settings.center_frequency / 1e6);
            log::info!("  Sample rate: {:.3} MHz", config.settings.sample_rate / 1e6);
            log::info!("  Gain: {:?}", config.settings.gain_mode);
            log::info!("  PPM correction: {}", config.settings.ppm_correction);
            let _ = init_tx.send(Ok(()));

            let mut samples = Vec::with_capacity(READ_SIZE / 2);
            let mut read_count = 0u64;
            let mut dropped = 0u64;

            while !thread_tuner.is_stopped() {
                let generation = thread_tuner.generation();
                if generation != thread_retuned.load(Ordering::Acquire) {
                    let center = thread_tuner.center_frequency() as u32;
                    if let Err(e) = device.set_center_freq(center) {
                        log::error!("RTL-SDR retune to {center} Hz failed: {e}");
                        thread_error.store(true, Ordering::Relaxed);
                        break;
                    }
                    let _ = device.reset_buffer();
                    thread_retuned.store(generation, Ordering::Release);
                    log::debug!("RTL-SDR retuned to {:.3} MHz", f64::from(center) / 1e6);
                }

                match device.read_sync(READ_SIZE) {
                    Ok(buf) => {
                        read_count += 1;

                        // A retune arrived mid-transfer; the buffer may span both frequencies
                        if thread_tuner.generation() != generation {
                            continue;
                        }

                        // Interleaved uint8 I/Q centred on 127.5
                        samples.clear();
                        samples.extend(buf.chunks_exact(2).map(|iq| {
                            Complex::new(
                                (f32::from(iq[0]) - 127.5) / 127.5,
                                (f32::from(iq[1]) - 127.5) / 127.5,
                            )
                        }));

                        let pushed = producer.push_slice(&samples);
                        dropped += (samples.len() - pushed) as u64;

                        if read_count % 1000 == 0 {
                            log::debug!("RTL-SDR read #{read_count}: {dropped} samples dropped so far");
                        }
                    }
                    Err(e) => {
                        log::error!("RTL-SDR read error after {read_count} successful reads: {e}");
                        thread_error.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }

            log::info!("RTL-SDR read loop exited after {read_count} reads, closing device");
        });

        match init_rx.recv_timeout(std::time::Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow!("RTL-SDR initialization timed out")),
        }

        let flushed = retuned.load(Ordering::Acquire);
        Ok(Block::new(
            BlockMetaBuilder::new("RtlSdrSource").build(),
            StreamIoBuilder::new()
                .add_output::<Complex<f32>>("out")
                .build(),
            MessageIoBuilder::new().build(),
            Self {
                consumer,
                _thread_handle: thread_handle,
                error: error_flag,
                retuned,
                flushed,
                produced: 0,
                tuner,
            },
        ))
    }
}

#[cfg(feature = "hardware")]
#[futuresdr::async_trait::async_trait]
impl futuresdr::runtime::Kernel for RtlSdrSource {
    async fn work(
        &mut self,
        io: &mut futuresdr::runtime::WorkIo,
        sio: &mut futuresdr::runtime::StreamIo,
        _mio: &mut futuresdr::runtime::MessageIo<Self>,
        _meta: &mut futuresdr::runtime::BlockMeta,
    ) -> Result<()> {
        use std::sync::atomic::Ordering;

        if self.error.load(Ordering::Relaxed) {
            return Err(futuresdr::anyhow::anyhow!("RTL-SDR read error occurred"));
        }
        if self.tuner.is_stopped() {
            io.finished = true;
            return Ok(());
        }

        // Samples queued before the last retune belong to the old frequency
        let retuned = self.retuned.load(Ordering::Acquire);
        if retuned != self.flushed {
            let stale = self.consumer.len();
            for _ in 0..stale {
                let _ = self.consumer.pop();
            }
            self.flushed = retuned;
            self.tuner.mark_applied(retuned, self.produced);
            log::debug!("RTL-SDR retune applied at sample {}, {stale} stale samples dropped", self.produced);
        }

        let output = sio.output(0).slice::<Complex<f32>>();
        let n = self.consumer.pop_slice(output);

        io.call_again = true;
        if n > 0 {
            sio.output(0).produce(n);
            self.produced += n as u64;
        } else {
            tokio::task::yield_now().await;
        }

        Ok(())
    }
}

/// Stub implementation when hardware feature is disabled.
#[cfg(not(feature = "hardware"))]
#[derive(Debug)]
pub struct RtlSdrSource;

#[cfg(not(feature = "hardware"))]
impl RtlSdrSource {
    /// Create a new RTL-SDR source block (stub when hardware feature is disabled).
    pub fn new(
        _config: RtlSdrConfig,
        _tuner: TunerHandle,
    ) -> futuresdr::anyhow::Result<futuresdr::runtime::Block> {
        Err(futuresdr::anyhow::anyhow!(
            "RTL-SDR hardware support not compiled (enable 'hardware' feature)"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_stub_reports_missing_feature() {
        let config = RtlSdrConfig {
            device_index: 0,
            settings: TunerSettings {
                sample_rate: 2e6,
                center_frequency: 100e6,
                ppm_correction: 0,
                gain_mode: crate::sdr::tuner::GainMode::Manual(30.0),
                if_gain: 25.0,
            },
        };
        let err = RtlSdrSource::new(config, TunerHandle::new(100e6)).unwrap_err();
        assert!(err.to_string().contains("hardware"));
        assert!(list_devices().is_empty());
    }
}
