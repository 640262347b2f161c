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

//! Error types for scan configuration, sources and reporting.

use thiserror::Error;

/// Errors raised outside the flowgraph runtime.
///
/// Blocks running inside the runtime report through `futuresdr::anyhow`
/// instead, since that is what the `Kernel` trait expects.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Human readable description of the constraint.
        reason: String,
    },

    /// The requested IQ source could not be opened.
    #[error("failed to open source: {0}")]
    Source(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("configuration store error: {0}")]
    ConfigStore(#[from] confy::ConfyError),
}

impl ScanError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
