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

//! Draw statistics accumulated while command buffers are translated.

use crate::renderer::api::command::GpuCommand;

/// Counters gathered while replaying commands.
///
/// Accumulated per command buffer, then per translate job, then per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    /// The number of draw calls replayed.
    pub draws: u32,
    /// The number of triangles submitted by those draws.
    pub primitives: u64,
    /// The number of compute dispatches replayed.
    pub dispatches: u32,
    /// The total number of commands replayed.
    pub commands: u32,
}

impl DrawStats {
    /// Accounts for one replayed command.
    pub fn record(&mut self, command: &GpuCommand) {
        self.commands += 1;
        if command.is_draw() {
            self.draws += 1;
            self.primitives += command.primitive_count();
        } else if command.is_dispatch() {
            self.dispatches += 1;
        }
    }

    /// Adds `other` into `self`.
    pub fn accumulate(&mut self, other: &DrawStats) {
        self.draws += other.draws;
        self.primitives += other.primitives;
        self.dispatches += other.dispatches;
        self.commands += other.commands;
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        *self == DrawStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_accumulate() {
        let mut buffer_stats = DrawStats::default();
        buffer_stats.record(&GpuCommand::Draw {
            vertices: 0..3,
            instances: 0..1,
        });
        buffer_stats.record(&GpuCommand::Dispatch { x: 1, y: 1, z: 1 });
        buffer_stats.record(&GpuCommand::EndMarker);

        let mut frame_stats = DrawStats::default();
        assert!(frame_stats.is_empty());
        frame_stats.accumulate(&buffer_stats);
        frame_stats.accumulate(&buffer_stats);

        assert_eq!(
            frame_stats,
            DrawStats {
                draws: 2,
                primitives: 2,
                dispatches: 2,
                commands: 6,
            }
        );
    }
}
