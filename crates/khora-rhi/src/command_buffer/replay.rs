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

//! The target a command buffer is replayed into.

use super::parallel_pass::ParallelPassInfo;
use super::CommandBuffer;
use khora_core::renderer::{
    CommandContext, DrawStats, GpuCommand, PipelineArray, PipelineMask, RhiDevice, RhiPipeline,
};
use std::sync::Arc;

/// One optional hardware context per pipeline.
pub(crate) type ContextSet = PipelineArray<Option<Box<dyn CommandContext>>>;

/// The hardware contexts a command buffer replays its operations into.
///
/// Contexts are acquired from the device the first time a pipeline becomes
/// active and stay open until the translate job that owns them is finalized.
pub struct ReplayContext<'a> {
    device: &'a dyn RhiDevice,
    contexts: ContextSet,
    active: PipelineMask,
    parallel_pass: Option<Arc<ParallelPassInfo>>,
    stats: DrawStats,
}

impl<'a> ReplayContext<'a> {
    /// Creates a replay target without open contexts.
    pub fn new(device: &'a dyn RhiDevice) -> Self {
        Self::with_contexts(device, ContextSet::default(), None)
    }

    pub(crate) fn with_contexts(
        device: &'a dyn RhiDevice,
        contexts: ContextSet,
        parallel_pass: Option<Arc<ParallelPassInfo>>,
    ) -> Self {
        Self {
            device,
            contexts,
            active: PipelineMask::NONE,
            parallel_pass,
            stats: DrawStats::default(),
        }
    }

    /// Returns the device contexts are acquired from.
    pub fn device(&self) -> &'a dyn RhiDevice {
        self.device
    }

    /// Returns the pipelines commands are currently routed to.
    pub fn active_pipelines(&self) -> PipelineMask {
        self.active
    }

    /// Returns the statistics gathered so far.
    pub fn stats(&self) -> &DrawStats {
        &self.stats
    }

    /// Routes subsequent commands to `pipelines`, acquiring missing contexts.
    ///
    /// # Panics
    ///
    /// Panics if a sub buffer of a parallel render pass activates a pipeline
    /// other than graphics.
    pub fn activate(&mut self, pipelines: PipelineMask) {
        for pipeline in pipelines.iter() {
            if self.contexts[pipeline].is_some() {
                continue;
            }
            let context = match &self.parallel_pass {
                Some(pass) => {
                    assert!(
                        pipeline == RhiPipeline::Graphics,
                        "sub buffers of parallel pass '{}' may only use the graphics pipeline",
                        pass.name()
                    );
                    self.device.acquire_parallel_context(pass.name())
                }
                None => self.device.acquire_context(pipeline),
            };
            log::trace!("Acquired {pipeline} context for replay.");
            self.contexts[pipeline] = Some(context);
        }
        self.active = pipelines;
    }

    /// Returns the open context of `pipeline`, if any.
    pub fn context(&mut self, pipeline: RhiPipeline) -> Option<&mut (dyn CommandContext + 'static)> {
        self.contexts[pipeline].as_deref_mut()
    }

    /// Replays a command into the active context.
    ///
    /// Debug markers are broadcast to every active pipeline. Any other command
    /// needs exactly one active pipeline.
    ///
    /// # Panics
    ///
    /// Panics if the command cannot be routed.
    pub fn replay(&mut self, command: &GpuCommand) {
        if matches!(command, GpuCommand::BeginMarker(_) | GpuCommand::EndMarker) {
            for pipeline in self.active.iter() {
                self.replay_on(pipeline, command);
            }
        } else {
            let Some(pipeline) = self.active.single() else {
                panic!(
                    "{command:?} needs exactly one active pipeline, found {:?}",
                    self.active
                );
            };
            self.replay_on(pipeline, command);
        }
        self.stats.record(command);
    }

    pub(crate) fn replay_on(&mut self, pipeline: RhiPipeline, command: &GpuCommand) {
        match self.contexts[pipeline].as_mut() {
            Some(context) => context.replay(command),
            None => panic!("{command:?} replayed on {pipeline} before the pipeline was activated"),
        }
    }

    /// Records a nested command buffer and executes it immediately.
    ///
    /// The nested buffer starts with the pipelines active here and replays
    /// into the same contexts, so it observes their state exactly as left off.
    pub fn record_recursive(&mut self, label: &str, record: impl FnOnce(&mut CommandBuffer)) {
        let mut buffer = CommandBuffer::recursive(label, self.active);
        record(&mut buffer);
        buffer.finish_recording();
        buffer.execute(self);
    }

    pub(crate) fn into_parts(self) -> (ContextSet, DrawStats) {
        (self.contexts, self.stats)
    }
}
