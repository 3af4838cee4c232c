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

//! Deferred command recording.
//!
//! A [`CommandBuffer`] is an append-only log of [`Operation`]s written by a
//! single producer. Recording never touches the hardware. Once
//! [`CommandBuffer::finish_recording`] is called, the log is immutable and is
//! replayed into hardware contexts by the translate stage.
//!
//! Buffers reach the executor as [`PendingCommandBuffer`]s. A buffer can be
//! handed to the executor before it is finished through
//! [`CommandBuffer::submit_later`]: the executor keeps its place in the
//! submission order and picks up the contents once recording finishes.

mod operation;
mod parallel_pass;
mod replay;

pub use self::operation::{Operation, ReplayCallback};
pub use self::parallel_pass::ParallelPassInfo;
pub use self::replay::ReplayContext;

pub(crate) use self::replay::ContextSet;

use crate::signal::CompletionSignal;
use khora_core::renderer::{GpuCommand, PipelineMask, RhiPipeline};
use std::fmt;
use std::sync::{Arc, Mutex};

/// The role a command buffer plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingKind {
    /// The executor's own buffer. Always translated serially.
    Immediate,
    /// A buffer recorded by any producer, eligible for parallel translation.
    Parallel,
    /// Part of the body of a parallel render pass.
    Sub,
    /// Created during replay and executed at once into the parent's contexts.
    Recursive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordingState {
    Recording,
    Finished,
    Executed,
}

/// An append-only log of deferred GPU work.
pub struct CommandBuffer {
    label: String,
    kind: RecordingKind,
    state: RecordingState,
    operations: Vec<Operation>,
    command_count: u32,
    initial_pipelines: PipelineMask,
    active_pipelines: PipelineMask,
    touched_pipelines: PipelineMask,
    scope_depth: u32,
    completion: CompletionSignal,
    slot: Option<PendingCommandBuffer>,
    parallel_translate: bool,
    uses_lock_fence: bool,
    last_lock_fence: Option<CompletionSignal>,
    dispatch_prerequisites: Vec<CompletionSignal>,
    attached: Vec<PendingCommandBuffer>,
    parallel_pass_begin: Option<Arc<ParallelPassInfo>>,
    parallel_pass_end: Option<Arc<ParallelPassInfo>>,
    sub_pass: Option<Arc<ParallelPassInfo>>,
}

impl CommandBuffer {
    fn with_kind(label: impl Into<String>, kind: RecordingKind, pipelines: PipelineMask) -> Self {
        Self {
            label: label.into(),
            kind,
            state: RecordingState::Recording,
            operations: Vec::new(),
            command_count: 0,
            initial_pipelines: pipelines,
            active_pipelines: pipelines,
            touched_pipelines: pipelines,
            scope_depth: 0,
            completion: CompletionSignal::new(),
            slot: None,
            parallel_translate: true,
            uses_lock_fence: false,
            last_lock_fence: None,
            dispatch_prerequisites: Vec::new(),
            attached: Vec::new(),
            parallel_pass_begin: None,
            parallel_pass_end: None,
            sub_pass: None,
        }
    }

    /// Creates the executor's immediate buffer. Graphics starts active.
    pub fn immediate() -> Self {
        Self::with_kind("immediate", RecordingKind::Immediate, PipelineMask::GRAPHICS)
    }

    /// Creates a buffer eligible for parallel translation. Graphics starts active.
    pub fn parallel(label: impl Into<String>) -> Self {
        Self::with_pipelines(label, PipelineMask::GRAPHICS)
    }

    /// Creates a parallel buffer whose recording starts on `pipelines`.
    pub fn with_pipelines(label: impl Into<String>, pipelines: PipelineMask) -> Self {
        Self::with_kind(label, RecordingKind::Parallel, pipelines)
    }

    /// Creates a buffer that records part of the body of a parallel render pass.
    pub fn sub(label: impl Into<String>, pass: &Arc<ParallelPassInfo>) -> Self {
        let mut buffer = Self::with_kind(label, RecordingKind::Sub, PipelineMask::GRAPHICS);
        buffer.sub_pass = Some(pass.clone());
        buffer
    }

    pub(crate) fn recursive(label: &str, pipelines: PipelineMask) -> Self {
        Self::with_kind(label, RecordingKind::Recursive, pipelines)
    }

    fn closed_shell(&self) -> Self {
        let mut shell = Self::with_kind(self.label.clone(), self.kind, self.initial_pipelines);
        shell.state = RecordingState::Finished;
        shell.completion = self.completion.clone();
        shell
    }

    fn assert_recording(&self, action: &str) {
        assert!(
            self.state == RecordingState::Recording,
            "cannot {action} on command buffer '{}': recording already finished",
            self.label
        );
    }

    /// Returns the debug label of the buffer.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the role of the buffer.
    pub fn kind(&self) -> RecordingKind {
        self.kind
    }

    /// Appends an operation.
    ///
    /// # Panics
    ///
    /// Panics if recording already finished, or if an `EndScope` has no
    /// matching `BeginScope`.
    pub fn enqueue(&mut self, operation: Operation) {
        self.assert_recording("append an operation");
        match &operation {
            Operation::ActivatePipelines(pipelines) => {
                self.active_pipelines = *pipelines;
                self.touched_pipelines |= *pipelines;
            }
            Operation::BeginScope(_) => self.scope_depth += 1,
            Operation::EndScope => {
                assert!(
                    self.scope_depth > 0,
                    "unbalanced end_scope on command buffer '{}'",
                    self.label
                );
                self.scope_depth -= 1;
            }
            _ => {}
        }
        self.operations.push(operation);
        self.command_count += 1;
    }

    /// Appends a concrete GPU command.
    pub fn enqueue_command(&mut self, command: GpuCommand) {
        self.enqueue(Operation::Command(command));
    }

    /// Appends a closure replayed against the hardware contexts.
    pub fn enqueue_lambda<F>(&mut self, callback: F)
    where
        F: for<'a> FnOnce(&mut ReplayContext<'a>) + Send + 'static,
    {
        self.enqueue(Operation::Callback(Box::new(callback)));
    }

    /// Routes subsequent commands to `pipelines`.
    ///
    /// Returns the previously active pipelines. Nothing is recorded if the
    /// set does not change.
    pub fn activate_pipelines(&mut self, pipelines: PipelineMask) -> PipelineMask {
        let previous = self.active_pipelines;
        if pipelines != previous {
            self.enqueue(Operation::ActivatePipelines(pipelines));
        }
        previous
    }

    /// Routes subsequent commands to a single pipeline.
    pub fn switch_pipeline(&mut self, pipeline: RhiPipeline) -> PipelineMask {
        self.activate_pipelines(pipeline.into())
    }

    /// Opens a named debug scope.
    pub fn begin_scope(&mut self, name: impl Into<String>) {
        self.enqueue(Operation::BeginScope(name.into()));
    }

    /// Closes the innermost debug scope.
    pub fn end_scope(&mut self) {
        self.enqueue(Operation::EndScope);
    }

    /// Makes translation of this buffer wait for `signal`.
    ///
    /// The translate task is scheduled once the signal fired. No worker
    /// blocks on it.
    ///
    /// # Panics
    ///
    /// Panics if recording already finished or for recursive buffers, which
    /// execute in place.
    pub fn add_dispatch_prerequisite(&mut self, signal: CompletionSignal) {
        self.assert_recording("add a dispatch prerequisite");
        assert!(
            self.kind != RecordingKind::Recursive,
            "recursive command buffer '{}' cannot wait for dispatch prerequisites",
            self.label
        );
        self.dispatch_prerequisites.push(signal);
    }

    /// Records a fence fired when translation reaches this point.
    ///
    /// A lock fence marks the buffer as mutating shared state: it is
    /// translated serially, and buffers submitted after it wait for the
    /// fence before translating.
    pub fn fence(&mut self, lock: bool) -> CompletionSignal {
        let signal = CompletionSignal::new();
        self.enqueue(Operation::Fence(signal.clone()));
        if lock {
            self.uses_lock_fence = true;
            self.last_lock_fence = Some(signal.clone());
        }
        signal
    }

    /// Opts this buffer out of parallel translation.
    pub fn disallow_parallel_translate(&mut self) {
        self.parallel_translate = false;
    }

    /// Splits the buffer around a parallel render pass.
    ///
    /// Everything recorded so far, followed by the start of the pass, moves
    /// into an attached prefix buffer. The `subs` record the body of the pass
    /// and are attached after the prefix. This buffer continues with the end of
    /// the pass and the pipelines that were active.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was already handed to the executor.
    pub fn insert_parallel_pass(
        &mut self,
        info: Arc<ParallelPassInfo>,
        subs: Vec<PendingCommandBuffer>,
    ) {
        self.assert_recording("insert a parallel pass");
        assert!(
            self.slot.is_none(),
            "cannot insert a parallel pass into command buffer '{}' after it was handed to the executor",
            self.label
        );
        assert!(
            self.kind != RecordingKind::Recursive && self.kind != RecordingKind::Sub,
            "parallel passes cannot be nested into {:?} command buffers",
            self.kind
        );

        let pipelines = self.active_pipelines;
        assert!(
            pipelines.contains(RhiPipeline::Graphics),
            "parallel pass '{}' needs the graphics pipeline active on '{}'",
            info.name(),
            self.label
        );
        self.enqueue(Operation::BeginParallelPass(info.clone()));

        let mut prefix = Self::with_kind(
            format!("{}/{}", self.label, info.name()),
            self.kind,
            self.initial_pipelines,
        );
        std::mem::swap(&mut prefix.operations, &mut self.operations);
        prefix.command_count = std::mem::take(&mut self.command_count);
        prefix.active_pipelines = self.active_pipelines;
        prefix.touched_pipelines = self.touched_pipelines;
        prefix.scope_depth = std::mem::take(&mut self.scope_depth);
        prefix.parallel_translate = self.parallel_translate;
        prefix.uses_lock_fence = std::mem::take(&mut self.uses_lock_fence);
        prefix.last_lock_fence = self.last_lock_fence.take();
        prefix.dispatch_prerequisites = std::mem::take(&mut self.dispatch_prerequisites);
        prefix.parallel_pass_begin = Some(info.clone());
        prefix.parallel_pass_end = self.parallel_pass_end.take();
        prefix.finish_recording();
        self.attached.push(prefix.into());

        log::trace!(
            "Parallel pass '{}' inserted into '{}' with {} sub buffer(s).",
            info.name(),
            self.label,
            subs.len()
        );
        self.attached.extend(subs);

        self.initial_pipelines = pipelines;
        self.parallel_pass_end = Some(info);
        self.enqueue(Operation::EndParallelPass);
    }

    /// Hands the buffer to the executor before recording finished.
    ///
    /// The returned handle keeps the buffer's place in submission order. The
    /// contents move into the handle when [`CommandBuffer::finish_recording`] is
    /// called. Buffers attached by parallel passes move into the handle right
    /// away, so they are dispatched even while this buffer is still recording.
    ///
    /// # Panics
    ///
    /// Panics for recursive buffers or if recording already finished.
    pub fn submit_later(&mut self) -> PendingCommandBuffer {
        self.assert_recording("hand over for submission");
        assert!(
            self.kind != RecordingKind::Recursive,
            "recursive command buffer '{}' executes in place and cannot be submitted",
            self.label
        );
        let pending = self
            .slot
            .get_or_insert_with(|| PendingCommandBuffer::empty(&self.label, self.completion.clone()))
            .clone();
        pending.attach(std::mem::take(&mut self.attached));
        pending
    }

    /// Closes the buffer for appending and fires its completion signal.
    ///
    /// # Panics
    ///
    /// Panics if called twice or with open debug scopes.
    pub fn finish_recording(&mut self) {
        assert!(
            self.state == RecordingState::Recording,
            "finish_recording called twice on command buffer '{}'",
            self.label
        );
        assert!(
            self.scope_depth == 0,
            "command buffer '{}' finished with {} open scope(s)",
            self.label,
            self.scope_depth
        );
        self.state = RecordingState::Finished;

        let completion = self.completion.clone();
        if let Some(slot) = self.slot.take() {
            let shell = self.closed_shell();
            let finished = std::mem::replace(self, shell);
            slot.store(finished);
        }
        completion.complete();
    }

    /// Returns `true` once recording finished.
    pub fn is_finished(&self) -> bool {
        self.state != RecordingState::Recording
    }

    /// Returns the signal fired by [`CommandBuffer::finish_recording`].
    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }

    /// Replays every operation into `replay`, draining the log.
    ///
    /// # Panics
    ///
    /// Panics if recording has not finished or the buffer was already executed.
    pub fn execute(&mut self, replay: &mut ReplayContext<'_>) {
        match self.state {
            RecordingState::Recording => panic!(
                "cannot execute command buffer '{}' before finish_recording",
                self.label
            ),
            RecordingState::Executed => {
                panic!("command buffer '{}' executed twice", self.label)
            }
            RecordingState::Finished => {}
        }
        self.state = RecordingState::Executed;

        if !self.initial_pipelines.is_empty() {
            replay.activate(self.initial_pipelines);
        }
        for operation in self.operations.drain(..) {
            operation.replay(replay);
        }
    }

    /// Returns the number of operations recorded.
    pub fn command_count(&self) -> u32 {
        self.command_count
    }

    /// Returns `true` if nothing was recorded and nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.attached.is_empty()
    }

    /// Returns the pipelines currently routed to.
    pub fn active_pipelines(&self) -> PipelineMask {
        self.active_pipelines
    }

    /// Returns every pipeline the buffer ever routed to.
    pub fn touched_pipelines(&self) -> PipelineMask {
        self.touched_pipelines
    }

    /// Returns `true` if the buffer may be translated on the worker pool.
    pub fn allow_parallel_translate(&self) -> bool {
        matches!(self.kind, RecordingKind::Parallel | RecordingKind::Sub)
            && self.parallel_translate
            && !self.uses_lock_fence
    }

    /// Returns `true` if the buffer records part of a parallel render pass.
    pub fn is_sub_command_list(&self) -> bool {
        self.sub_pass.is_some()
    }

    /// Returns `true` if the buffer recorded a lock fence.
    pub fn uses_lock_fence(&self) -> bool {
        self.uses_lock_fence
    }

    /// Returns the buffers attached by [`CommandBuffer::insert_parallel_pass`]
    /// that were not yet handed over by [`CommandBuffer::submit_later`].
    pub fn attached(&self) -> &[PendingCommandBuffer] {
        &self.attached
    }

    pub(crate) fn take_attached(&mut self) -> Vec<PendingCommandBuffer> {
        std::mem::take(&mut self.attached)
    }

    pub(crate) fn last_lock_fence(&self) -> Option<&CompletionSignal> {
        self.last_lock_fence.as_ref()
    }

    pub(crate) fn take_dispatch_prerequisites(&mut self) -> Vec<CompletionSignal> {
        std::mem::take(&mut self.dispatch_prerequisites)
    }

    /// Returns the pass this buffer opens, if it is the prefix of one.
    pub fn parallel_pass_begin(&self) -> Option<&Arc<ParallelPassInfo>> {
        self.parallel_pass_begin.as_ref()
    }

    /// Returns the pass this buffer closes, if any.
    pub fn parallel_pass_end(&self) -> Option<&Arc<ParallelPassInfo>> {
        self.parallel_pass_end.as_ref()
    }

    /// Returns the pass this sub buffer records into, if any.
    pub fn sub_pass(&self) -> Option<&Arc<ParallelPassInfo>> {
        self.sub_pass.as_ref()
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        if self.state == RecordingState::Recording {
            if let Some(slot) = self.slot.take() {
                if self.operations.is_empty() {
                    // Nothing to submit. Release the executor waiting on it.
                    log::warn!(
                        "Command buffer '{}' dropped before finish_recording.",
                        self.label
                    );
                    drop(slot);
                    self.completion.complete();
                    return;
                }
            }
        }
        if self.state != RecordingState::Executed && !self.operations.is_empty() {
            panic!(
                "command buffer '{}' dropped with {} unsubmitted operation(s)",
                self.label,
                self.operations.len()
            );
        }
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("command_count", &self.command_count)
            .field("attached", &self.attached.len())
            .finish()
    }
}

struct BufferSlot {
    label: String,
    completion: CompletionSignal,
    buffer: Mutex<Option<CommandBuffer>>,
    attached: Mutex<Vec<PendingCommandBuffer>>,
}

/// A command buffer handed to the executor, finished or still recording.
#[derive(Clone)]
pub struct PendingCommandBuffer {
    slot: Arc<BufferSlot>,
}

impl PendingCommandBuffer {
    fn empty(label: &str, completion: CompletionSignal) -> Self {
        Self {
            slot: Arc::new(BufferSlot {
                label: label.to_string(),
                completion,
                buffer: Mutex::new(None),
                attached: Mutex::new(Vec::new()),
            }),
        }
    }

    fn attach(&self, buffers: Vec<PendingCommandBuffer>) {
        self.slot.attached.lock().unwrap().extend(buffers);
    }

    fn store(&self, buffer: CommandBuffer) {
        *self.slot.buffer.lock().unwrap() = Some(buffer);
    }

    /// Returns the label of the buffer.
    pub fn label(&self) -> &str {
        &self.slot.label
    }

    /// Returns the signal fired once recording finished.
    pub fn completion(&self) -> &CompletionSignal {
        &self.slot.completion
    }

    /// Returns `true` if recording finished and nothing was recorded.
    pub fn is_known_empty(&self) -> bool {
        self.slot.completion.is_complete()
            && self.slot.attached.lock().unwrap().is_empty()
            && self
                .slot
                .buffer
                .lock()
                .unwrap()
                .as_ref()
                .map_or(true, CommandBuffer::is_empty)
    }

    pub(crate) fn take(&self) -> Option<CommandBuffer> {
        self.slot.buffer.lock().unwrap().take()
    }

    pub(crate) fn take_attached(&self) -> Vec<PendingCommandBuffer> {
        std::mem::take(&mut *self.slot.attached.lock().unwrap())
    }
}

impl From<CommandBuffer> for PendingCommandBuffer {
    /// Wraps a buffer, finishing its recording if needed.
    fn from(mut buffer: CommandBuffer) -> Self {
        if let Some(slot) = buffer.slot.clone() {
            if !buffer.is_finished() {
                buffer.finish_recording();
            }
            return slot;
        }
        if !buffer.is_finished() {
            buffer.finish_recording();
        }
        let pending = Self::empty(&buffer.label, buffer.completion.clone());
        pending.attach(buffer.take_attached());
        pending.store(buffer);
        pending
    }
}

impl fmt::Debug for PendingCommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommandBuffer")
            .field("label", &self.slot.label)
            .field("recorded", &self.slot.completion.is_complete())
            .finish()
    }
}
