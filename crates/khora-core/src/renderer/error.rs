// Copyright 2025 eraflo
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

//! Defines the error types reported by hardware backends.

use crate::renderer::api::util::RhiPipeline;
use std::fmt;

/// An error reported by an [`RhiDevice`](crate::renderer::traits::RhiDevice).
///
/// The execution pipeline treats every variant as unrecoverable: the frame in
/// flight cannot be completed once the device refused a command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RhiError {
    /// The device was removed or reset.
    DeviceLost,
    /// The device rejected a batched submission.
    SubmissionFailed(String),
    /// A hardware context could not be sealed into a platform command list.
    SealFailed {
        /// The pipeline of the context being sealed.
        pipeline: RhiPipeline,
        /// Detailed error messages from the backend.
        details: String,
    },
    /// An error originating from the specific graphics backend implementation.
    Backend(String),
}

impl fmt::Display for RhiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RhiError::DeviceLost => write!(f, "The graphics device was lost."),
            RhiError::SubmissionFailed(msg) => {
                write!(f, "Command list submission failed: {msg}")
            }
            RhiError::SealFailed { pipeline, details } => {
                write!(f, "Failed to seal {pipeline} context: {details}")
            }
            RhiError::Backend(msg) => write!(f, "Backend-specific error: {msg}"),
        }
    }
}

impl std::error::Error for RhiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rhi_error_display() {
        assert_eq!(
            RhiError::DeviceLost.to_string(),
            "The graphics device was lost."
        );
        assert_eq!(
            RhiError::SubmissionFailed("queue full".to_string()).to_string(),
            "Command list submission failed: queue full"
        );
        let err = RhiError::SealFailed {
            pipeline: RhiPipeline::AsyncCompute,
            details: "out of memory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to seal AsyncCompute context: out of memory"
        );
        assert_eq!(
            RhiError::Backend("oops".to_string()).to_string(),
            "Backend-specific error: oops"
        );
    }
}
