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

//! Generic rendering enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Specifies the data type of indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// Indices are 16-bit unsigned integers.
    Uint16,
    /// Indices are 32-bit unsigned integers.
    Uint32,
}

/// A hardware queue family that a command list records work for.
///
/// Every hardware context is bound to exactly one pipeline. Commands recorded
/// while several pipelines are active are only legal for the few operations
/// that are broadcast to all of them (pipeline switches, fences, callbacks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RhiPipeline {
    /// The main graphics queue. Immediate recording always starts here.
    Graphics,
    /// The asynchronous compute queue.
    AsyncCompute,
}

impl RhiPipeline {
    /// Every pipeline, in submission order inside a translate job.
    pub const ALL: [RhiPipeline; 2] = [RhiPipeline::Graphics, RhiPipeline::AsyncCompute];

    /// The number of distinct pipelines.
    pub const COUNT: usize = Self::ALL.len();

    /// Returns the dense index of this pipeline, suitable for array storage.
    pub const fn index(self) -> usize {
        match self {
            RhiPipeline::Graphics => 0,
            RhiPipeline::AsyncCompute => 1,
        }
    }
}

impl fmt::Display for RhiPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RhiPipeline::Graphics => write!(f, "Graphics"),
            RhiPipeline::AsyncCompute => write!(f, "AsyncCompute"),
        }
    }
}

/// The usage state a texture is transitioned between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// The contents are undefined and may be discarded.
    Undefined,
    /// The resource is the source of a copy.
    CopySrc,
    /// The resource is the destination of a copy.
    CopyDst,
    /// The resource is sampled or read by shaders.
    ShaderRead,
    /// The resource is bound as a color or depth target.
    RenderTarget,
    /// The resource is read and written by compute shaders.
    UnorderedAccess,
    /// The resource is handed to the presentation engine.
    Present,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_indices_are_dense() {
        for (expected, pipeline) in RhiPipeline::ALL.iter().enumerate() {
            assert_eq!(pipeline.index(), expected);
        }
        assert_eq!(RhiPipeline::COUNT, 2);
    }

    #[test]
    fn pipeline_display() {
        assert_eq!(RhiPipeline::Graphics.to_string(), "Graphics");
        assert_eq!(RhiPipeline::AsyncCompute.to_string(), "AsyncCompute");
    }
}
