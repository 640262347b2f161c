// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reporting of detected signals.
//!
//! Every signal is printed as one `[+]` line on stdout. When an output path
//! is configured the signal is also appended to a CSV file, so repeated runs
//! build up a single log.

use std::fs::{File, OpenOptions};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::ScanError;
use crate::scanner::{ScanEvent, Signal};

/// One CSV row.
#[derive(Debug, Serialize)]
pub struct SignalRecord {
    pub timestamp: String,
    pub frequency_hz: f64,
    pub width_hz: f64,
    pub peak_db: f32,
    pub noise_db: f32,
    pub snr_db: f32,
    pub sweep: u64,
}

impl SignalRecord {
    #[must_use]
    pub fn new(signal: &Signal) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            frequency_hz: signal.frequency,
            width_hz: signal.width,
            peak_db: signal.peak_db,
            noise_db: signal.noise_db,
            snr_db: signal.snr_db,
            sweep: signal.sweep,
        }
    }
}

/// Human readable line for one signal.
#[must_use]
pub fn format_signal(signal: &Signal) -> String {
    format!(
        "[+] {:.3} MHz  width {:.1} kHz  peak {:.1} dB  noise {:.1} dB  snr {:.1} dB",
        signal.frequency / 1e6,
        signal.width / 1e3,
        signal.peak_db,
        signal.noise_db,
        signal.snr_db
    )
}

/// Stdout and optional CSV output for scan events.
#[derive(Debug)]
pub struct SignalReport {
    writer: Option<csv::Writer<File>>,
    reported: u64,
}

impl SignalReport {
    /// Open the report, appending to `path` if given.
    ///
    /// The CSV header is written only when the file is new or empty.
    pub fn open(path: Option<&Path>) -> Result<Self, ScanError> {
        let writer = match path {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                let empty = file.metadata()?.len() == 0;
                log::info!("Appending detected signals to {}", path.display());
                Some(
                    csv::WriterBuilder::new()
                        .has_headers(empty)
                        .from_writer(file),
                )
            }
            None => None,
        };
        Ok(Self {
            writer,
            reported: 0,
        })
    }

    /// Number of signals reported so far.
    #[must_use]
    pub fn reported(&self) -> u64 {
        self.reported
    }

    /// Report whatever `event` carries.
    pub fn handle(&mut self, event: &ScanEvent) -> Result<(), ScanError> {
        match event {
            ScanEvent::Signal(signal) => self.signal(signal)?,
            ScanEvent::Retuned { center_frequency } => {
                log::debug!("Tuned to {:.3} MHz", center_frequency / 1e6);
            }
            ScanEvent::SweepComplete { sweep, signals } => {
                log::info!("Sweep {sweep} complete: {} signal(s)", signals.len());
                self.flush()?;
            }
            ScanEvent::Finished { sweeps } => {
                log::info!("Scan finished after {sweeps} sweep(s)");
                self.flush()?;
            }
        }
        Ok(())
    }

    fn signal(&mut self, signal: &Signal) -> Result<(), ScanError> {
        println!("{}", format_signal(signal));
        self.reported += 1;
        if let Some(writer) = self.writer.as_mut() {
            writer.serialize(SignalRecord::new(signal))?;
        }
        Ok(())
    }

    /// Push buffered rows to disk.
    pub fn flush(&mut self) -> Result<(), ScanError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for SignalReport {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("Failed to flush signal report: {e}");
        }
    }
}
