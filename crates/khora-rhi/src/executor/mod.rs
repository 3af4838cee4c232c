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

//! The root of the command-list pipeline.
//!
//! An [`Executor`] owns every piece of shared pipeline state: the immediate
//! command buffer, the dispatch and submission pipes, the signals later work
//! waits on, and the frame counter. Several executors can live side by side.
//!
//! A submission flows through three stages:
//!
//! 1. **Dispatch** waits for each buffer to finish recording and routes it into
//!    a translate job, strictly in submission order.
//! 2. **Translate** replays the buffers of a job into hardware contexts and
//!    seals them into platform command lists.
//! 3. **Submit** hands every sealed list to the device in one call, then runs
//!    resource deletion and the end-of-frame hook.

mod dispatch;
mod flags;
mod submit;
mod translate;

pub use self::flags::SubmitFlags;

use self::dispatch::SubmitState;
use crate::command_buffer::{CommandBuffer, PendingCommandBuffer};
use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::scheduler::{Scheduler, SchedulingPolicy};
use crate::signal::CompletionSignal;
use crate::task_pipe::TaskPipe;
use crate::telemetry::RhiEvent;
use khora_core::event::EventBus;
use khora_core::renderer::{DrawStats, ResourceHandle, RhiDevice, RhiError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The lifecycle state of an [`Executor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// Nothing is pending.
    Idle,
    /// Buffers were submitted and are gathered for the next device submission.
    Accumulating,
    /// A device submission is in flight.
    Flushing,
}

#[derive(Default)]
struct GlobalSignals {
    /// Fires once the previous device submission ran.
    last_submit: Option<CompletionSignal>,
    /// Fires once the last lock fence was translated.
    last_mutate: Option<CompletionSignal>,
}

/// State shared between the executor and its pipeline tasks.
pub(crate) struct ExecutorShared {
    scheduler: Scheduler,
    policy: SchedulingPolicy,
    config: ExecutorConfig,
    device: Arc<dyn RhiDevice>,
    dispatch_pipe: TaskPipe,
    submission_pipe: TaskPipe,
    signals: Mutex<GlobalSignals>,
    frame_number: AtomicU64,
    in_flight: AtomicUsize,
    deletion_queue: Mutex<Vec<ResourceHandle>>,
    frame_stats: Mutex<DrawStats>,
    events: EventBus<RhiEvent>,
}

impl ExecutorShared {
    /// Reports an unrecoverable device failure and terminates the process.
    ///
    /// No consistent GPU state survives a failed seal or submission, and
    /// every signal waiting on the device would stay pending forever.
    #[track_caller]
    fn fatal(&self, stage: &str, err: &RhiError) -> ! {
        let frame = self.frame_number.load(Ordering::Acquire);
        let location = std::panic::Location::caller();
        log::error!("Device failure during {stage} in frame {frame} at {location}: {err}");
        log::logger().flush();
        std::process::abort();
    }
}

/// Accepts recorded command buffers and drives them to the device.
///
/// The executor is used from a single producer thread. Command buffers are
/// recorded on any thread and handed over through [`Executor::submit`].
pub struct Executor {
    shared: Arc<ExecutorShared>,
    immediate: CommandBuffer,
    submit_state: Option<Arc<Mutex<SubmitState>>>,
    completion: Option<CompletionSignal>,
    outstanding: Vec<CompletionSignal>,
    next_dispatch_prerequisites: Vec<CompletionSignal>,
}

impl Executor {
    /// Creates an executor driving `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the worker threads cannot be
    /// spawned.
    pub fn new(device: Arc<dyn RhiDevice>, config: ExecutorConfig) -> Result<Self, ExecutorError> {
        config.validate()?;
        let policy = SchedulingPolicy::from_config(&config);
        let scheduler = Scheduler::new(if policy.is_parallel() {
            config.worker_threads
        } else {
            0
        })?;

        log::info!(
            "Executor created (parallel: {}, parallel translate: {}, bypass: {}).",
            policy.is_parallel(),
            policy.allows_parallel_translate(),
            policy.bypass
        );

        let shared = Arc::new(ExecutorShared {
            dispatch_pipe: TaskPipe::new("dispatch", scheduler.clone()),
            submission_pipe: TaskPipe::new("submission", scheduler.clone()),
            scheduler,
            policy,
            events: EventBus::bounded(config.telemetry_capacity),
            config,
            device,
            signals: Mutex::new(GlobalSignals::default()),
            frame_number: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            deletion_queue: Mutex::new(Vec::new()),
            frame_stats: Mutex::new(DrawStats::default()),
        });

        Ok(Self {
            shared,
            immediate: CommandBuffer::immediate(),
            submit_state: None,
            completion: None,
            outstanding: Vec::new(),
            next_dispatch_prerequisites: Vec::new(),
        })
    }

    /// Returns the executor's own command buffer.
    ///
    /// Its contents are submitted ahead of the buffers passed to every
    /// [`Executor::submit`] call.
    pub fn immediate(&mut self) -> &mut CommandBuffer {
        &mut self.immediate
    }

    /// Returns the configuration the executor was created with.
    pub fn config(&self) -> &ExecutorConfig {
        &self.shared.config
    }

    /// Returns the scheduling policy derived from the configuration.
    pub fn policy(&self) -> SchedulingPolicy {
        self.shared.policy
    }

    /// Returns the scheduler running the pipeline tasks.
    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    /// Returns the device the executor submits to.
    pub fn device(&self) -> &Arc<dyn RhiDevice> {
        &self.shared.device
    }

    /// Returns the bus the submit stage publishes its events on.
    pub fn telemetry(&self) -> &EventBus<RhiEvent> {
        &self.shared.events
    }

    /// Returns the number of frames ended so far.
    pub fn frame_number(&self) -> u64 {
        self.shared.frame_number.load(Ordering::Acquire)
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> ExecutorState {
        if self.submit_state.is_some() {
            ExecutorState::Accumulating
        } else if self.shared.in_flight.load(Ordering::Acquire) > 0 {
            ExecutorState::Flushing
        } else {
            ExecutorState::Idle
        }
    }

    /// Makes the next dispatch task wait for `signal`.
    pub fn add_next_dispatch_prerequisite(&mut self, signal: CompletionSignal) {
        self.next_dispatch_prerequisites.push(signal);
    }

    /// Queues a released resource for deletion by a later submission with
    /// [`SubmitFlags::DELETE_RESOURCES`].
    pub fn defer_delete(&self, resource: impl Into<ResourceHandle>) {
        self.shared.deletion_queue.lock().unwrap().push(resource.into());
    }

    fn has_pending_work(&self) -> bool {
        !self.immediate.is_empty()
            || self.submit_state.is_some()
            || !self.next_dispatch_prerequisites.is_empty()
    }

    /// Submits the immediate buffer followed by `additional`.
    ///
    /// Buffers are dispatched, translated and submitted in the order given,
    /// whether or not they finished recording yet. Attached buffers go ahead of
    /// the buffer they are attached to.
    ///
    /// Returns the signal fired once the submission, and every submission
    /// before it, reached the device.
    pub fn submit(
        &mut self,
        additional: impl IntoIterator<Item = PendingCommandBuffer>,
        mut flags: SubmitFlags,
    ) -> CompletionSignal {
        let shared = self.shared.clone();
        let policy = shared.policy;
        if policy.bypass {
            flags |= SubmitFlags::SUBMIT_TO_GPU;
        }

        let additional: Vec<PendingCommandBuffer> = additional.into_iter().collect();
        if additional.is_empty()
            && !self.has_pending_work()
            && !flags.intersects(SubmitFlags::DELETE_RESOURCES | SubmitFlags::END_FRAME)
        {
            let completion = self
                .completion
                .clone()
                .unwrap_or_else(CompletionSignal::completed);
            if flags.contains(SubmitFlags::FLUSH_AND_WAIT) {
                shared.scheduler.wait(&completion);
                self.wait_for_tasks();
            }
            log::trace!("Nothing to submit.");
            return completion;
        }

        let mut buffers = Vec::new();
        let immediate = std::mem::replace(&mut self.immediate, CommandBuffer::immediate());
        if !immediate.is_empty() {
            consume(&mut buffers, immediate.into());
        }
        for pending in additional {
            consume(&mut buffers, pending);
        }

        let state = self.open_submit_state();
        if flags.contains(SubmitFlags::SUBMIT_TO_GPU) {
            let mut state = state.lock().unwrap();
            state.flags = flags;
            // A flushing submission gathers deletions itself.
            if flags.contains(SubmitFlags::DELETE_RESOURCES)
                && !flags.contains(SubmitFlags::FLUSH_AND_WAIT)
            {
                state
                    .resources_to_delete
                    .append(&mut shared.deletion_queue.lock().unwrap());
            }
        }

        for pending in buffers {
            self.outstanding.push(pending.completion().clone());
            let mut prerequisites = std::mem::take(&mut self.next_dispatch_prerequisites);
            prerequisites.push(pending.completion().clone());

            let known_empty = pending.is_known_empty();
            let dispatch_state = state.clone();
            let exec = shared.clone();
            let ticket = shared.dispatch_pipe.enqueue(
                policy.dispatch_target(),
                prerequisites,
                move || match pending.take() {
                    Some(buffer) if !buffer.is_empty() => {
                        dispatch_state.lock().unwrap().dispatch(&exec, buffer);
                    }
                    _ => log::trace!("'{}' recorded nothing, skipping.", pending.label()),
                },
            );
            if known_empty {
                ticket.mark_void();
            }
        }

        if flags.contains(SubmitFlags::SUBMIT_TO_GPU) {
            let prerequisites = std::mem::take(&mut self.next_dispatch_prerequisites);
            let exec = shared.clone();
            shared.in_flight.fetch_add(1, Ordering::AcqRel);
            shared
                .dispatch_pipe
                .enqueue(policy.dispatch_target(), prerequisites, move || {
                    let mut prerequisites = {
                        let mut state = state.lock().unwrap();
                        state.finalize_current(&exec);
                        state.take_translate_events()
                    };
                    // Device calls stay in submission order even without buffers.
                    prerequisites.extend(exec.signals.lock().unwrap().last_submit.clone());
                    let submitting = exec.clone();
                    exec.submission_pipe.enqueue(
                        exec.policy.submit_target(),
                        prerequisites,
                        move || submit::run(&submitting, &state),
                    );
                    let last_submit = exec.submission_pipe.close();
                    exec.signals.lock().unwrap().last_submit = last_submit;
                });
            self.submit_state = None;
            log::debug!("Executor flushing ({flags:?}).");
        }

        let completion = self
            .completion
            .clone()
            .unwrap_or_else(CompletionSignal::completed);

        let wait = flags.contains(SubmitFlags::FLUSH_AND_WAIT)
            || (flags.contains(SubmitFlags::SUBMIT_TO_GPU) && !policy.is_parallel());
        if wait {
            shared.scheduler.wait(&completion);
            self.wait_for_tasks();
        }
        completion
    }

    fn open_submit_state(&mut self) -> Arc<Mutex<SubmitState>> {
        if let Some(state) = &self.submit_state {
            return state.clone();
        }

        let completion = CompletionSignal::new();
        if let Some(previous) = &self.completion {
            completion.dont_complete_until(previous);
        }
        self.completion = Some(completion.clone());

        let state = Arc::new(Mutex::new(SubmitState::new(
            completion,
            &self.shared.config,
            &self.shared.policy,
        )));
        self.submit_state = Some(state.clone());
        log::debug!("Executor accumulating.");
        state
    }

    /// Submits everything pending with `flags`.
    pub fn flush(&mut self, flags: SubmitFlags) -> CompletionSignal {
        self.submit(Vec::new(), flags)
    }

    /// Waits until every buffer submitted so far finished recording.
    pub fn wait_for_tasks(&mut self) {
        let outstanding = std::mem::take(&mut self.outstanding);
        if outstanding.is_empty() {
            return;
        }
        self.shared
            .scheduler
            .wait(&CompletionSignal::all(&outstanding));
    }
}

/// Appends `pending` to `buffers` after its attached buffers, depth-first.
fn consume(buffers: &mut Vec<PendingCommandBuffer>, pending: PendingCommandBuffer) {
    for attached in pending.take_attached() {
        consume(buffers, attached);
    }
    buffers.push(pending);
}

impl Drop for Executor {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        if self.has_pending_work() {
            log::debug!("Executor dropped with pending work, flushing.");
            self.flush(SubmitFlags::SUBMIT_TO_GPU | SubmitFlags::FLUSH_AND_WAIT);
        } else if let Some(completion) = self.completion.take() {
            self.shared.scheduler.wait(&completion);
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("state", &self.state())
            .field("frame_number", &self.frame_number())
            .field("policy", &self.shared.policy)
            .finish()
    }
}
