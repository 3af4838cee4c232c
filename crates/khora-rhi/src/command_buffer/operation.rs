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

use super::parallel_pass::ParallelPassInfo;
use super::replay::ReplayContext;
use crate::signal::CompletionSignal;
use khora_core::renderer::{GpuCommand, PipelineMask, RhiPipeline};
use std::fmt;
use std::sync::Arc;

/// A deferred closure replayed against the contexts of a command buffer.
pub type ReplayCallback = Box<dyn for<'a> FnOnce(&mut ReplayContext<'a>) + Send>;

/// A single recorded entry of a [`CommandBuffer`](super::CommandBuffer).
pub enum Operation {
    /// A concrete GPU command.
    Command(GpuCommand),
    /// Routes subsequent commands to a set of pipelines.
    ActivatePipelines(PipelineMask),
    /// Opens a named debug scope on every active pipeline.
    BeginScope(String),
    /// Closes the innermost debug scope.
    EndScope,
    /// Opens a parallel render pass on the graphics pipeline.
    BeginParallelPass(Arc<ParallelPassInfo>),
    /// Closes the parallel render pass opened by the buffer's prefix.
    EndParallelPass,
    /// Fires a signal when translation reaches this point.
    Fence(CompletionSignal),
    /// Runs arbitrary code against the replay contexts.
    Callback(ReplayCallback),
}

impl Operation {
    pub(crate) fn replay(self, replay: &mut ReplayContext<'_>) {
        match self {
            Operation::Command(command) => replay.replay(&command),
            Operation::ActivatePipelines(pipelines) => replay.activate(pipelines),
            Operation::BeginScope(name) => replay.replay(&GpuCommand::BeginMarker(name)),
            Operation::EndScope => replay.replay(&GpuCommand::EndMarker),
            Operation::BeginParallelPass(info) => replay.replay_on(
                RhiPipeline::Graphics,
                &GpuCommand::BeginParallelRenderPass {
                    name: info.name().to_string(),
                },
            ),
            Operation::EndParallelPass => {
                replay.replay_on(RhiPipeline::Graphics, &GpuCommand::EndParallelRenderPass)
            }
            Operation::Fence(signal) => signal.complete(),
            Operation::Callback(callback) => callback(replay),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Command(command) => f.debug_tuple("Command").field(command).finish(),
            Operation::ActivatePipelines(pipelines) => {
                f.debug_tuple("ActivatePipelines").field(pipelines).finish()
            }
            Operation::BeginScope(name) => f.debug_tuple("BeginScope").field(name).finish(),
            Operation::EndScope => write!(f, "EndScope"),
            Operation::BeginParallelPass(info) => {
                f.debug_tuple("BeginParallelPass").field(&info.name()).finish()
            }
            Operation::EndParallelPass => write!(f, "EndParallelPass"),
            Operation::Fence(signal) => f.debug_tuple("Fence").field(signal).finish(),
            Operation::Callback(_) => write!(f, "Callback"),
        }
    }
}
