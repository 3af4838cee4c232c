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

use crate::renderer::api::command::GpuCommand;
use crate::renderer::api::util::RhiPipeline;
use std::any::Any;
use std::fmt::Debug;

/// A hardware recording target bound to a single pipeline.
///
/// A context is owned by exactly one translate job at a time. Ownership moves
/// between jobs (for example from the job that opened a parallel render pass to
/// the job that closes it) by moving the box, so at most one worker thread ever
/// replays into a given context.
pub trait CommandContext: Send + Debug {
    /// Returns the pipeline this context records for.
    fn pipeline(&self) -> RhiPipeline;

    /// Replays a single command into the hardware command stream.
    fn replay(&mut self, command: &GpuCommand);

    /// Returns the name of the parallel render pass this context was acquired
    /// for, if any.
    fn parallel_pass(&self) -> Option<&str> {
        None
    }

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
