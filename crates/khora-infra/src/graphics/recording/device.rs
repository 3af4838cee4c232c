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

use super::context::RecordingContext;
use khora_core::renderer::traits::{CommandContext, RhiDevice};
use khora_core::renderer::{
    BufferId, GpuCommand, PlatformCommandList, PlatformCommandListId, ResourceHandle, RhiError,
    RhiPipeline, TextureId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The contents of a sealed [`RecordingContext`].
#[derive(Debug, Clone, PartialEq)]
pub struct SealedRecording {
    /// The identifier handed out when the context was sealed.
    pub id: PlatformCommandListId,
    /// The pipeline the context recorded for.
    pub pipeline: RhiPipeline,
    /// The parallel render pass the context recorded into, if any.
    pub parallel_pass: Option<String>,
    /// Every command replayed into the context, in order.
    pub commands: Vec<GpuCommand>,
}

/// The internal, non-clonable state of the [`RecordingDevice`].
#[derive(Debug, Default)]
struct RecordingDeviceInternal {
    sealed: Mutex<HashMap<PlatformCommandListId, SealedRecording>>,
    submissions: Mutex<Vec<Vec<SealedRecording>>>,
    frames: Mutex<Vec<u64>>,

    /// Live resources and the number of completion polls each stays busy for.
    resources: Mutex<HashMap<ResourceHandle, u32>>,
    deleted: Mutex<Vec<ResourceHandle>>,

    next_list_id: AtomicU64,
    next_resource_id: AtomicU64,
    contexts_acquired: AtomicUsize,
    completion_polls: AtomicUsize,
    delete_queue_flushes: AtomicUsize,

    replay_latency: Mutex<Option<Duration>>,
    fail_seals: AtomicBool,
    fail_submissions: AtomicBool,
}

/// A clonable, thread-safe handle to a device that records instead of rendering.
///
/// Every sealed context is kept, and every submitted batch is kept in
/// submission order, so callers can check exactly what reached the device.
/// Failures and latency can be injected to exercise the pipeline.
#[derive(Clone, Debug, Default)]
pub struct RecordingDevice {
    inner: Arc<RecordingDeviceInternal>,
}

impl RecordingDevice {
    /// Creates a device with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every replayed command sleep for `latency`.
    pub fn set_replay_latency(&self, latency: Option<Duration>) {
        *self.inner.replay_latency.lock().unwrap() = latency;
    }

    /// Makes sealing fail with [`RhiError::SealFailed`].
    pub fn set_fail_seals(&self, fail: bool) {
        self.inner.fail_seals.store(fail, Ordering::Release);
    }

    /// Makes submission fail with [`RhiError::SubmissionFailed`].
    pub fn set_fail_submissions(&self, fail: bool) {
        self.inner.fail_submissions.store(fail, Ordering::Release);
    }

    fn next_resource(&self) -> u64 {
        self.inner.next_resource_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a live buffer.
    pub fn create_buffer(&self) -> BufferId {
        let id = BufferId(self.next_resource());
        self.inner.resources.lock().unwrap().insert(id.into(), 0);
        id
    }

    /// Registers a live texture.
    pub fn create_texture(&self) -> TextureId {
        let id = TextureId(self.next_resource());
        self.inner.resources.lock().unwrap().insert(id.into(), 0);
        id
    }

    /// Keeps `resource` in use by the GPU for the next `polls` completion polls.
    pub fn mark_busy(&self, resource: impl Into<ResourceHandle>, polls: u32) {
        let resource = resource.into();
        if let Some(busy) = self.inner.resources.lock().unwrap().get_mut(&resource) {
            *busy = polls;
        } else {
            log::warn!("RecordingDevice: {resource:?} is not a live resource.");
        }
    }

    /// Returns `true` if `resource` was created and not yet deleted.
    pub fn is_alive(&self, resource: impl Into<ResourceHandle>) -> bool {
        self.inner
            .resources
            .lock()
            .unwrap()
            .contains_key(&resource.into())
    }

    /// Returns the deleted resources, in deletion order.
    pub fn deleted(&self) -> Vec<ResourceHandle> {
        self.inner.deleted.lock().unwrap().clone()
    }

    /// Returns a sealed recording that was not submitted yet.
    pub fn recorded(&self, id: PlatformCommandListId) -> Option<SealedRecording> {
        self.inner.sealed.lock().unwrap().get(&id).cloned()
    }

    /// Returns every submitted batch, in submission order.
    pub fn submissions(&self) -> Vec<Vec<SealedRecording>> {
        self.inner.submissions.lock().unwrap().clone()
    }

    /// Removes and returns every submitted batch.
    pub fn take_submissions(&self) -> Vec<Vec<SealedRecording>> {
        std::mem::take(&mut *self.inner.submissions.lock().unwrap())
    }

    /// Returns every submitted command, flattened in submission order.
    pub fn submitted_commands(&self) -> Vec<GpuCommand> {
        self.inner
            .submissions
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .flat_map(|recording| recording.commands.iter().cloned())
            .collect()
    }

    /// Returns the frame numbers passed to [`RhiDevice::end_frame`].
    pub fn frames(&self) -> Vec<u64> {
        self.inner.frames.lock().unwrap().clone()
    }

    /// Returns the number of contexts handed out.
    pub fn contexts_acquired(&self) -> usize {
        self.inner.contexts_acquired.load(Ordering::Acquire)
    }

    /// Returns the number of calls to [`RhiDevice::poll_completion`].
    pub fn completion_polls(&self) -> usize {
        self.inner.completion_polls.load(Ordering::Acquire)
    }

    /// Returns the number of calls to [`RhiDevice::process_delete_queue`].
    pub fn delete_queue_flushes(&self) -> usize {
        self.inner.delete_queue_flushes.load(Ordering::Acquire)
    }

    fn new_context(&self, pipeline: RhiPipeline, parallel_pass: Option<String>) -> RecordingContext {
        self.inner.contexts_acquired.fetch_add(1, Ordering::AcqRel);
        let latency = *self.inner.replay_latency.lock().unwrap();
        RecordingContext::new(pipeline, parallel_pass, latency)
    }
}

impl RhiDevice for RecordingDevice {
    fn acquire_context(&self, pipeline: RhiPipeline) -> Box<dyn CommandContext> {
        Box::new(self.new_context(pipeline, None))
    }

    fn acquire_parallel_context(&self, pass: &str) -> Box<dyn CommandContext> {
        Box::new(self.new_context(RhiPipeline::Graphics, Some(pass.to_string())))
    }

    fn seal_context(
        &self,
        mut context: Box<dyn CommandContext>,
    ) -> Result<PlatformCommandList, RhiError> {
        let pipeline = context.pipeline();
        if self.inner.fail_seals.load(Ordering::Acquire) {
            return Err(RhiError::SealFailed {
                pipeline,
                details: "injected failure".to_string(),
            });
        }

        let Some(recording) = context.as_any_mut().downcast_mut::<RecordingContext>() else {
            return Err(RhiError::Backend(format!(
                "cannot seal a {pipeline} context of another backend"
            )));
        };

        let id = PlatformCommandListId(self.inner.next_list_id.fetch_add(1, Ordering::Relaxed));
        let sealed = SealedRecording {
            id,
            pipeline,
            parallel_pass: recording.parallel_pass.take(),
            commands: std::mem::take(&mut recording.commands),
        };
        let list = PlatformCommandList {
            id,
            pipeline,
            parallel_pass: sealed.parallel_pass.is_some(),
        };
        log::trace!(
            "RecordingDevice: sealed {id:?} with {} command(s).",
            sealed.commands.len()
        );
        self.inner.sealed.lock().unwrap().insert(id, sealed);
        Ok(list)
    }

    fn submit_batches(&self, lists: Vec<PlatformCommandList>) -> Result<(), RhiError> {
        if self.inner.fail_submissions.load(Ordering::Acquire) {
            return Err(RhiError::SubmissionFailed("injected failure".to_string()));
        }

        let mut sealed = self.inner.sealed.lock().unwrap();
        let batch = lists
            .iter()
            .map(|list| {
                sealed.remove(&list.id).ok_or_else(|| {
                    RhiError::SubmissionFailed(format!("{:?} was never sealed", list.id))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        drop(sealed);

        log::debug!("RecordingDevice: submitted {} command list(s).", batch.len());
        self.inner.submissions.lock().unwrap().push(batch);
        Ok(())
    }

    fn delete_resources(&self, resources: &mut Vec<ResourceHandle>) {
        let mut live = self.inner.resources.lock().unwrap();
        let mut deleted = self.inner.deleted.lock().unwrap();
        resources.retain(|resource| match live.get(resource) {
            Some(busy) if *busy > 0 => true,
            Some(_) => {
                live.remove(resource);
                deleted.push(*resource);
                false
            }
            None => {
                log::warn!("RecordingDevice: {resource:?} deleted twice or never created.");
                false
            }
        });
    }

    fn poll_completion(&self) {
        self.inner.completion_polls.fetch_add(1, Ordering::AcqRel);
        for busy in self.inner.resources.lock().unwrap().values_mut() {
            *busy = busy.saturating_sub(1);
        }
    }

    fn process_delete_queue(&self) {
        self.inner.delete_queue_flushes.fetch_add(1, Ordering::AcqRel);
    }

    fn end_frame(&self, frame_number: u64) {
        log::debug!("RecordingDevice: frame {frame_number} ended.");
        self.inner.frames.lock().unwrap().push(frame_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_contexts_keep_their_commands() {
        let device = RecordingDevice::new();
        let mut context = device.acquire_context(RhiPipeline::AsyncCompute);
        context.replay(&GpuCommand::Dispatch { x: 1, y: 2, z: 3 });

        let list = device.seal_context(context).unwrap();

        assert_eq!(list.pipeline, RhiPipeline::AsyncCompute);
        assert!(!list.parallel_pass);
        let recorded = device.recorded(list.id).unwrap();
        assert_eq!(recorded.commands, vec![GpuCommand::Dispatch { x: 1, y: 2, z: 3 }]);
        assert_eq!(device.contexts_acquired(), 1);
    }

    #[test]
    fn parallel_contexts_are_flagged() {
        let device = RecordingDevice::new();
        let context = device.acquire_parallel_context("GBuffer");
        assert_eq!(context.parallel_pass(), Some("GBuffer"));

        let list = device.seal_parallel_context(context).unwrap();
        assert!(list.parallel_pass);
        assert_eq!(
            device.recorded(list.id).unwrap().parallel_pass.as_deref(),
            Some("GBuffer")
        );
    }

    #[test]
    fn submission_moves_recordings_in_order() {
        let device = RecordingDevice::new();
        let first = device
            .seal_context(device.acquire_context(RhiPipeline::Graphics))
            .unwrap();
        let second = device
            .seal_context(device.acquire_context(RhiPipeline::AsyncCompute))
            .unwrap();

        device.submit_batches(vec![first.clone(), second.clone()]).unwrap();

        let submissions = device.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0][0].id, first.id);
        assert_eq!(submissions[0][1].id, second.id);
        assert!(device.recorded(first.id).is_none());
    }

    #[test]
    fn submitting_an_unknown_list_fails() {
        let device = RecordingDevice::new();
        let bogus = PlatformCommandList {
            id: PlatformCommandListId(99),
            pipeline: RhiPipeline::Graphics,
            parallel_pass: false,
        };
        assert!(matches!(
            device.submit_batches(vec![bogus]),
            Err(RhiError::SubmissionFailed(_))
        ));
    }

    #[test]
    fn injected_failures_surface_as_errors() {
        let device = RecordingDevice::new();
        device.set_fail_seals(true);
        let result = device.seal_context(device.acquire_context(RhiPipeline::Graphics));
        assert!(matches!(result, Err(RhiError::SealFailed { .. })));

        device.set_fail_submissions(true);
        assert!(device.submit_batches(Vec::new()).is_err());
    }

    #[test]
    fn busy_resources_survive_until_polled() {
        let device = RecordingDevice::new();
        let buffer = device.create_buffer();
        let texture = device.create_texture();
        device.mark_busy(texture, 2);

        let mut pending = vec![ResourceHandle::from(buffer), ResourceHandle::from(texture)];
        device.delete_resources(&mut pending);
        assert_eq!(pending, vec![ResourceHandle::from(texture)]);
        assert!(!device.is_alive(buffer));

        device.poll_completion();
        device.delete_resources(&mut pending);
        assert_eq!(pending.len(), 1);

        device.poll_completion();
        device.delete_resources(&mut pending);
        assert!(pending.is_empty());
        assert_eq!(
            device.deleted(),
            vec![ResourceHandle::from(buffer), ResourceHandle::from(texture)]
        );
        assert_eq!(device.completion_polls(), 2);
    }
}
