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

use khora_core::renderer::traits::CommandContext;
use khora_core::renderer::{GpuCommand, RhiPipeline};
use std::any::Any;
use std::time::Duration;

/// A [`CommandContext`] that appends every replayed command to a list.
#[derive(Debug)]
pub struct RecordingContext {
    pub(crate) pipeline: RhiPipeline,
    pub(crate) parallel_pass: Option<String>,
    pub(crate) commands: Vec<GpuCommand>,
    pub(crate) latency: Option<Duration>,
}

impl RecordingContext {
    pub(crate) fn new(
        pipeline: RhiPipeline,
        parallel_pass: Option<String>,
        latency: Option<Duration>,
    ) -> Self {
        Self {
            pipeline,
            parallel_pass,
            commands: Vec::new(),
            latency,
        }
    }

    /// Returns the commands replayed so far.
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }
}

impl CommandContext for RecordingContext {
    fn pipeline(&self) -> RhiPipeline {
        self.pipeline
    }

    fn replay(&mut self, command: &GpuCommand) {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        log::trace!("[{}] {:?}", self.pipeline, command);
        self.commands.push(command.clone());
    }

    fn parallel_pass(&self) -> Option<&str> {
        self.parallel_pass.as_deref()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
