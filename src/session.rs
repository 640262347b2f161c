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

//! A running scan.
//!
//! [`ScanSession`] owns the flowgraph thread and the receiving end of the
//! event channel. The flowgraph runs on its own thread because
//! `Runtime::run` blocks until every block has finished.

use std::thread::JoinHandle;
use std::time::Duration;

use futuresdr::runtime::Runtime;
use tokio::sync::mpsc;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::scanner::ScanEvent;
use crate::sdr::top_block::{SourceKind, TopBlock};
use crate::sdr::tuner::TunerHandle;

/// Events buffered between the sink and the application.
const EVENT_BUFFER: usize = 256;

/// How long source initialisation may take (RTL-SDR open included).
const INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to a scan running in the background.
#[derive(Debug)]
pub struct ScanSession {
    tuner: TunerHandle,
    events: mpsc::Receiver<ScanEvent>,
    fg_handle: Option<JoinHandle<()>>,
}

impl ScanSession {
    /// Validate `config`, build the flowgraph and start it.
    ///
    /// Returns once the source has been opened, so device and file errors
    /// surface here rather than as a silent empty scan.
    pub fn start(config: &ScanConfig, source: SourceKind) -> Result<Self, ScanError> {
        config.validate()?;

        let tuner = TunerHandle::new(config.start_frequency);
        let (tx, rx) = mpsc::channel::<ScanEvent>(EVENT_BUFFER);
        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        let fg_config = config.clone();
        let fg_tuner = tuner.clone();
        let handle = std::thread::spawn(move || {
            let fg = match TopBlock::build(&fg_config, &source, fg_tuner.clone(), tx) {
                Ok(fg) => {
                    let _ = init_tx.send(Ok(()));
                    fg
                }
                Err(e) => {
                    let _ = init_tx.send(Err(format!("{e:#}")));
                    return;
                }
            };

            log::info!("Starting flowgraph execution...");
            match Runtime::new().run(fg) {
                Ok(_) => log::info!("Flowgraph completed"),
                Err(e) => log::error!("Scan flowgraph error: {e}"),
            }
            fg_tuner.stop();
        });

        match init_rx.recv_timeout(INIT_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(ScanError::Source(e));
            }
            Err(_) => {
                tuner.stop();
                return Err(ScanError::Source("flowgraph initialization timed out".into()));
            }
        }

        Ok(Self {
            tuner,
            events: rx,
            fg_handle: Some(handle),
        })
    }

    /// Shared tuner state, e.g. to read the current centre frequency.
    #[must_use]
    pub fn tuner(&self) -> &TunerHandle {
        &self.tuner
    }

    /// Next event from the sink; `None` once the flowgraph has shut down.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Ask the flowgraph to wind down. Events already queued can still be
    /// received.
    pub fn stop(&self) {
        log::info!("Stopping scan");
        self.tuner.stop();
    }

    /// Stop the scan and wait for the flowgraph thread.
    pub fn join(mut self) -> Result<(), ScanError> {
        self.tuner.stop();
        // Unblock a sink waiting on a full channel
        self.events.close();
        while self.events.try_recv().is_ok() {}

        match self.fg_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ScanError::Source("flowgraph thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.tuner.stop();
    }
}
