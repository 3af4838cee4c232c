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

//! Routes dispatched command buffers into translate jobs.
//!
//! Dispatch tasks run one at a time, in submission order, on the executor's
//! dispatch pipe. Each one hands its buffer to the open [`SubmitState`], which
//! decides whether the current translate job can take the buffer or must be
//! finalized first, and which earlier work the translation has to wait for.

use super::flags::SubmitFlags;
use super::translate::TranslateJob;
use super::ExecutorShared;
use crate::command_buffer::CommandBuffer;
use crate::config::ExecutorConfig;
use crate::scheduler::SchedulingPolicy;
use crate::signal::CompletionSignal;
use khora_core::renderer::ResourceHandle;
use std::sync::Arc;

/// The properties of a translate job or buffer that decide batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchShape {
    pub parallel: bool,
    pub sub_lists: bool,
    pub commands: u32,
}

/// Returns `true` if a buffer of shape `buffer` must not join a job of shape `job`.
///
/// A job splits when its parallelism differs from the buffer's (with
/// `combine` only when a serial buffer follows a parallel job), when the
/// command budget would be exceeded, or when it alternates between root and
/// sub buffers. A negative budget splits after every buffer and zero never
/// splits on size.
pub(crate) fn should_split(max_commands: i32, combine: bool, job: BatchShape, buffer: BatchShape) -> bool {
    let split_parallel = if combine {
        job.parallel && !buffer.parallel
    } else {
        job.parallel != buffer.parallel
    };

    let split_threshold = match max_commands {
        max if max < 0 => true,
        0 => false,
        max => u64::from(job.commands) + u64::from(buffer.commands) > max as u64,
    };

    let split_parent_child = job.sub_lists != buffer.sub_lists;

    split_parallel || split_threshold || split_parent_child
}

struct JobPlan {
    job: Arc<TranslateJob>,
    command_count: u32,
    should_finalize: bool,
}

impl JobPlan {
    fn shape(&self) -> BatchShape {
        BatchShape {
            parallel: self.job.is_parallel(),
            sub_lists: self.job.using_sub_lists(),
            commands: self.command_count,
        }
    }
}

/// Everything pending a single device submission.
pub(crate) struct SubmitState {
    pub(super) jobs: Vec<Arc<TranslateJob>>,
    current: Option<JobPlan>,
    translate_events: Vec<CompletionSignal>,
    child_events: Vec<CompletionSignal>,
    begin_event: Option<CompletionSignal>,
    pub(super) completion: CompletionSignal,
    pub(super) flags: SubmitFlags,
    pub(super) resources_to_delete: Vec<ResourceHandle>,
    max_commands: i32,
    combine: bool,
    allow_parallel_translate: bool,
}

impl SubmitState {
    pub(crate) fn new(
        completion: CompletionSignal,
        config: &ExecutorConfig,
        policy: &SchedulingPolicy,
    ) -> Self {
        // Without parallel translation there is nothing to gain from splitting.
        let allow_parallel_translate = policy.allows_parallel_translate();
        let (max_commands, combine) = if allow_parallel_translate {
            (
                config.effective_max_commands(),
                config.combine_single_and_parallel,
            )
        } else {
            (0, true)
        };

        Self {
            jobs: Vec::new(),
            current: None,
            translate_events: Vec::new(),
            child_events: Vec::new(),
            begin_event: None,
            completion,
            flags: SubmitFlags::NONE,
            resources_to_delete: Vec::new(),
            max_commands,
            combine,
            allow_parallel_translate,
        }
    }

    /// Routes `buffer` into a translate job and enqueues its translation.
    pub(crate) fn dispatch(&mut self, shared: &Arc<ExecutorShared>, mut buffer: CommandBuffer) {
        let config = &shared.config;
        let shape = BatchShape {
            parallel: self.allow_parallel_translate && buffer.allow_parallel_translate(),
            sub_lists: buffer.is_sub_command_list(),
            commands: buffer.command_count(),
        };
        let (job, should_finalize) = self.conditional_split(shared, shape, &buffer);

        let mut prerequisites = Vec::new();
        if !shape.parallel {
            prerequisites = std::mem::take(&mut self.translate_events);
        }

        if buffer.parallel_pass_end().is_some() {
            if config.child_wait {
                prerequisites = self.translate_events.clone();
                prerequisites.extend(self.begin_event.take());
                prerequisites.append(&mut self.child_events);
            }
            self.child_events.clear();
            self.begin_event = None;
        } else if shape.sub_lists && config.parent_wait {
            prerequisites = self.translate_events.clone();
            prerequisites.extend(self.begin_event.clone());
        }

        {
            let mut signals = shared.signals.lock().unwrap();
            prerequisites.extend(signals.last_mutate.clone());
            if let Some(fence) = buffer.last_lock_fence() {
                signals.last_mutate = Some(fence.clone());
            }
            prerequisites.extend(signals.last_submit.clone());
        }
        prerequisites.append(&mut buffer.take_dispatch_prerequisites());

        let forward = buffer.parallel_pass_begin().is_some() && !should_finalize;
        log::trace!(
            "Dispatching '{}' to translate job {} ({} prerequisite(s)).",
            buffer.label(),
            job.index(),
            prerequisites.len()
        );
        job.enqueue_translate(shared, prerequisites, buffer, forward);
    }

    /// Opens a translate job for `buffer`, finalizing the current one if it
    /// cannot take the buffer. Returns the job and whether it finalizes.
    fn conditional_split(
        &mut self,
        shared: &Arc<ExecutorShared>,
        shape: BatchShape,
        buffer: &CommandBuffer,
    ) -> (Arc<TranslateJob>, bool) {
        let child_wait = shared.config.child_wait;
        let parent_wait = shared.config.parent_wait;

        if let Some(plan) = &self.current {
            if should_split(self.max_commands, self.combine, plan.shape(), shape) {
                let add_child_wait = plan.job.using_sub_lists() && child_wait;
                let add_parent_wait =
                    !plan.job.using_sub_lists() && shape.sub_lists && parent_wait;
                log::trace!("Splitting translate job {}.", plan.job.index());

                let event = self.finalize_current(shared);
                if add_child_wait {
                    self.child_events.extend(event);
                } else if add_parent_wait {
                    self.begin_event = event;
                }
            }
        }

        let index = self.jobs.len();
        let plan = self.current.get_or_insert_with(|| {
            let job = Arc::new(TranslateJob::new(
                index,
                shape.parallel,
                shape.sub_lists,
                shared,
            ));
            log::trace!("Opened translate job {job:?}.");
            JobPlan {
                job,
                command_count: 0,
                should_finalize: true,
            }
        });
        if plan.job.index() == index {
            self.jobs.push(plan.job.clone());
        }

        plan.should_finalize = !(child_wait && buffer.parallel_pass_begin().is_some());
        plan.command_count = plan.command_count.saturating_add(shape.commands);
        (plan.job.clone(), plan.should_finalize)
    }

    /// Finalizes the open translate job, if any.
    pub(crate) fn finalize_current(
        &mut self,
        shared: &Arc<ExecutorShared>,
    ) -> Option<CompletionSignal> {
        let plan = self.current.take()?;
        let event = plan.job.finalize(shared);
        self.translate_events.extend(event.clone());
        event
    }

    /// Hands over the events the submit task has to wait for.
    pub(crate) fn take_translate_events(&mut self) -> Vec<CompletionSignal> {
        std::mem::take(&mut self.translate_events)
    }
}
