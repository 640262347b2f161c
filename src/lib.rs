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

//! Frequency scanner built on FutureSDR.
//!
//! A scan steps a receiver across a frequency range. At each centre
//! frequency the flowgraph computes windowed, averaged log-power spectra and
//! reports carriers that stand above the local noise floor.
//!
//! ```text
//! Source → WindowedFft → ComplexToMagSquared → SinglePoleIir → NLog10 → ScannerSink
//! ```
//!
//! The detection and stepping logic lives in [`scanner`] and is independent
//! of the runtime; [`sdr`] holds the blocks and the flowgraph builder and
//! [`session::ScanSession`] runs a scan in the background.

pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod scanner;
pub mod sdr;
pub mod session;

pub use config::ScanConfig;
pub use error::ScanError;
pub use scanner::{ScanEvent, Signal};
pub use session::ScanSession;
