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

//! Flags representing a set of hardware pipelines.

use super::enums::RhiPipeline;

/// A set of [`RhiPipeline`]s.
///
/// A command buffer tracks the pipelines its commands are currently routed to,
/// and the union of every pipeline it ever touched. Multiple pipelines can be
/// combined using bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipelineMask {
    bits: u8,
}

impl PipelineMask {
    /// No pipelines.
    pub const NONE: Self = Self { bits: 0 };
    /// The graphics pipeline.
    pub const GRAPHICS: Self = Self { bits: 1 << 0 };
    /// The asynchronous compute pipeline.
    pub const ASYNC_COMPUTE: Self = Self { bits: 1 << 1 };
    /// Every pipeline.
    pub const ALL: Self = Self {
        bits: Self::GRAPHICS.bits | Self::ASYNC_COMPUTE.bits,
    };

    /// Creates a new set of pipeline flags from raw bits.
    ///
    /// Bits that do not name a pipeline are discarded.
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            bits: bits & Self::ALL.bits,
        }
    }

    /// Creates flags from a single pipeline.
    pub const fn from_pipeline(pipeline: RhiPipeline) -> Self {
        match pipeline {
            RhiPipeline::Graphics => Self::GRAPHICS,
            RhiPipeline::AsyncCompute => Self::ASYNC_COMPUTE,
        }
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Combines two sets of flags.
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Checks if these flags contain a specific pipeline.
    pub const fn contains(&self, pipeline: RhiPipeline) -> bool {
        let bits = Self::from_pipeline(pipeline).bits;
        (self.bits & bits) == bits
    }

    /// Checks if these flags are empty (no pipelines).
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Returns the pipeline if exactly one is set.
    pub fn single(&self) -> Option<RhiPipeline> {
        let mut pipelines = self.iter();
        match (pipelines.next(), pipelines.next()) {
            (Some(pipeline), None) => Some(pipeline),
            _ => None,
        }
    }

    /// Iterates over the contained pipelines in [`RhiPipeline::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = RhiPipeline> {
        let mask = *self;
        RhiPipeline::ALL
            .into_iter()
            .filter(move |pipeline| mask.contains(*pipeline))
    }
}

impl From<RhiPipeline> for PipelineMask {
    fn from(pipeline: RhiPipeline) -> Self {
        Self::from_pipeline(pipeline)
    }
}

impl std::ops::BitOr for PipelineMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for PipelineMask {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pipeline_detection() {
        assert_eq!(PipelineMask::GRAPHICS.single(), Some(RhiPipeline::Graphics));
        assert_eq!(
            PipelineMask::ASYNC_COMPUTE.single(),
            Some(RhiPipeline::AsyncCompute)
        );
        assert_eq!(PipelineMask::ALL.single(), None);
        assert_eq!(PipelineMask::NONE.single(), None);
    }

    #[test]
    fn union_and_contains() {
        let mut mask = PipelineMask::NONE;
        assert!(mask.is_empty());
        mask |= RhiPipeline::AsyncCompute.into();
        assert!(mask.contains(RhiPipeline::AsyncCompute));
        assert!(!mask.contains(RhiPipeline::Graphics));
        assert_eq!(mask | PipelineMask::GRAPHICS, PipelineMask::ALL);
    }

    #[test]
    fn from_bits_discards_unknown_bits() {
        assert_eq!(PipelineMask::from_bits(0xff), PipelineMask::ALL);
    }

    #[test]
    fn iter_follows_pipeline_order() {
        let pipelines: Vec<_> = PipelineMask::ALL.iter().collect();
        assert_eq!(
            pipelines,
            vec![RhiPipeline::Graphics, RhiPipeline::AsyncCompute]
        );
    }
}
