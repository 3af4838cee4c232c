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

//! Flags controlling what a submission does.

/// A set of options passed to [`Executor::submit`](super::Executor::submit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubmitFlags {
    bits: u8,
}

impl SubmitFlags {
    /// Only dispatch the buffers. Translation results accumulate until a later
    /// submission hands them to the device.
    pub const NONE: Self = Self { bits: 0 };
    /// Hand the translated command lists to the device.
    pub const SUBMIT_TO_GPU: Self = Self { bits: 1 << 0 };
    /// Block until the submission completed.
    pub const FLUSH_AND_WAIT: Self = Self { bits: 1 << 1 };
    /// Run the deferred resource deletion sweep.
    pub const DELETE_RESOURCES: Self = Self { bits: 1 << 2 };
    /// Run the end-of-frame hook and advance the frame counter.
    pub const END_FRAME: Self = Self { bits: 1 << 3 };
    /// Every flag.
    pub const ALL: Self = Self {
        bits: Self::SUBMIT_TO_GPU.bits
            | Self::FLUSH_AND_WAIT.bits
            | Self::DELETE_RESOURCES.bits
            | Self::END_FRAME.bits,
    };

    /// Creates flags from raw bits, discarding unknown ones.
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            bits: bits & Self::ALL.bits,
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

    /// Checks if every flag of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    /// Checks if any flag of `other` is set.
    pub const fn intersects(&self, other: Self) -> bool {
        (self.bits & other.bits) != 0
    }

    /// Checks if no flag is set.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl std::ops::BitOr for SubmitFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for SubmitFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}
