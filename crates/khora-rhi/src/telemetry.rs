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

//! Events published by the submit stage.

use khora_core::renderer::DrawStats;

/// A notification emitted on the executor's telemetry bus.
///
/// Publishing is fire-and-forget. Events are dropped when nobody drains the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RhiEvent {
    /// A batch of platform command lists was handed to the device.
    Submitted {
        /// The number of command lists in the batch.
        command_lists: usize,
        /// The number of translate jobs that produced them.
        translate_jobs: usize,
    },
    /// The end-of-frame hook ran.
    FrameEnded {
        /// The number of the frame that ended.
        frame: u64,
        /// Statistics of every command translated during the frame.
        stats: DrawStats,
    },
}
