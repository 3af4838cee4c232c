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

//! Replays command buffers into hardware contexts and seals them.
//!
//! A [`TranslateJob`] batches adjacent command buffers into one continuous
//! hardware recording. Its translate tasks run strictly in order on the job's
//! pipe. Parallel jobs own a pipe and may run on any worker, while serial jobs
//! share the executor's submission pipe.

use super::ExecutorShared;
use crate::command_buffer::{CommandBuffer, ContextSet, ReplayContext};
use crate::scheduler::{PipeSelector, TranslateTarget};
use crate::signal::CompletionSignal;
use crate::task_pipe::TaskPipe;
use khora_core::renderer::{DrawStats, PipelineArray, PlatformCommandList};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct JobState {
    contexts: ContextSet,
    finalized: PipelineArray<Option<PlatformCommandList>>,
    stats: DrawStats,
}

/// A batch of command buffers translated into the same hardware contexts.
pub(crate) struct TranslateJob {
    index: usize,
    parallel: bool,
    using_sub_lists: bool,
    target: TranslateTarget,
    pipe: Option<TaskPipe>,
    state: Mutex<JobState>,
}

impl TranslateJob {
    pub(crate) fn new(
        index: usize,
        parallel: bool,
        using_sub_lists: bool,
        shared: &ExecutorShared,
    ) -> Self {
        let target = shared.policy.translate_target(parallel);
        let pipe = match target.pipe {
            PipeSelector::Job => Some(TaskPipe::new("translate", shared.scheduler.clone())),
            PipeSelector::Submission => None,
        };
        Self {
            index,
            parallel,
            using_sub_lists,
            target,
            pipe,
            state: Mutex::new(JobState::default()),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub(crate) fn using_sub_lists(&self) -> bool {
        self.using_sub_lists
    }

    fn pipe<'a>(&'a self, shared: &'a ExecutorShared) -> &'a TaskPipe {
        self.pipe.as_ref().unwrap_or(&shared.submission_pipe)
    }

    /// Chains the translation of `buffer` after the job's previous work.
    ///
    /// With `forward` set, the contexts used by a buffer that opens a parallel
    /// pass move into the pass instead of staying with the job.
    pub(crate) fn enqueue_translate(
        self: &Arc<Self>,
        shared: &Arc<ExecutorShared>,
        prerequisites: Vec<CompletionSignal>,
        buffer: CommandBuffer,
        forward: bool,
    ) {
        let job = self.clone();
        let exec = shared.clone();
        self.pipe(shared)
            .enqueue(self.target.category, prerequisites, move || {
                job.translate(&exec, buffer, forward)
            });
    }

    fn translate(&self, shared: &ExecutorShared, mut buffer: CommandBuffer, forward: bool) {
        let mut contexts = std::mem::take(&mut self.state.lock().unwrap().contexts);
        if let Some(pass) = buffer.parallel_pass_end() {
            let handed = pass.take_contexts();
            if handed.iter().any(|(_, context)| context.is_some()) {
                debug_assert!(
                    contexts.iter().all(|(_, context)| context.is_none()),
                    "translate job {} already holds contexts when closing pass '{}'",
                    self.index,
                    pass.name()
                );
                contexts = handed;
            }
        }

        let mut replay =
            ReplayContext::with_contexts(&*shared.device, contexts, buffer.sub_pass().cloned());
        buffer.execute(&mut replay);
        let (contexts, stats) = replay.into_parts();

        log::trace!(
            "Translated '{}' into job {}: {} command(s), {} draw(s).",
            buffer.label(),
            self.index,
            stats.commands,
            stats.draws
        );

        let mut state = self.state.lock().unwrap();
        state.stats.accumulate(&stats);
        match buffer.parallel_pass_begin() {
            Some(pass) if forward => {
                log::trace!("Forwarding contexts of job {} to pass '{}'.", self.index, pass.name());
                pass.store_contexts(contexts);
            }
            _ => state.contexts = contexts,
        }
    }

    /// Enqueues the task that seals the job's contexts.
    ///
    /// Returns the signal of the job's closed pipe for parallel jobs. Jobs on
    /// the submission pipe return `None`: the submit task is chained after
    /// them on the same pipe.
    pub(crate) fn finalize(self: &Arc<Self>, shared: &Arc<ExecutorShared>) -> Option<CompletionSignal> {
        let job = self.clone();
        let exec = shared.clone();
        self.pipe(shared)
            .enqueue(self.target.category, Vec::new(), move || job.seal(&exec));

        self.pipe.as_ref().and_then(TaskPipe::close)
    }

    fn seal(&self, shared: &ExecutorShared) {
        let mut state = self.state.lock().unwrap();
        let JobState {
            contexts,
            finalized,
            ..
        } = &mut *state;

        for (pipeline, slot) in contexts.iter_mut() {
            let Some(context) = slot.take() else {
                continue;
            };
            let sealed = if self.using_sub_lists {
                shared.device.seal_parallel_context(context)
            } else {
                shared.device.seal_context(context)
            };
            match sealed {
                Ok(list) => finalized[pipeline] = Some(list),
                Err(err) => shared.fatal("seal", &err),
            }
        }
        log::trace!("Translate job {} finalized.", self.index);
    }

    /// Takes the sealed command lists, graphics first, and the job's statistics.
    pub(crate) fn take_finalized(&self) -> (Vec<PlatformCommandList>, DrawStats) {
        let mut state = self.state.lock().unwrap();
        let lists = state
            .finalized
            .iter_mut()
            .filter_map(|(_, list)| list.take())
            .collect();
        (lists, std::mem::take(&mut state.stats))
    }
}

impl std::fmt::Debug for TranslateJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslateJob")
            .field("index", &self.index)
            .field("parallel", &self.parallel)
            .field("using_sub_lists", &self.using_sub_lists)
            .field("target", &self.target)
            .finish()
    }
}
