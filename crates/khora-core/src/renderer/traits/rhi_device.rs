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

use super::CommandContext;
use crate::renderer::api::command::PlatformCommandList;
use crate::renderer::api::resource::ResourceHandle;
use crate::renderer::api::util::RhiPipeline;
use crate::renderer::error::RhiError;
use std::fmt::Debug;

/// The hardware capability consumed by the command-list execution pipeline.
///
/// This trait abstracts over a concrete graphics API device. It hands out
/// recording contexts, seals them into immutable platform command lists, and
/// submits those lists in batches. It also owns the backend side of deferred
/// resource deletion.
///
/// Every method may be called from any worker thread, so implementations must be
/// `Send + Sync`.
pub trait RhiDevice: Send + Sync + Debug + 'static {
    /// Acquires a fresh recording context for a pipeline.
    ///
    /// # Arguments
    ///
    /// * `pipeline` - The pipeline the context records for.
    ///
    /// # Returns
    ///
    /// A context owned by the caller until it is sealed.
    fn acquire_context(&self, pipeline: RhiPipeline) -> Box<dyn CommandContext>;

    /// Acquires a graphics context that records part of a parallel render pass.
    ///
    /// # Arguments
    ///
    /// * `pass` - The name of the parallel render pass the context records into.
    fn acquire_parallel_context(&self, pass: &str) -> Box<dyn CommandContext>;

    /// Seals a context into an immutable platform command list.
    ///
    /// # Errors
    ///
    /// Returns an [`RhiError`] if the backend cannot close the command stream.
    fn seal_context(
        &self,
        context: Box<dyn CommandContext>,
    ) -> Result<PlatformCommandList, RhiError>;

    /// Seals a context acquired by [`RhiDevice::acquire_parallel_context`].
    ///
    /// The resulting list is executed inside the render pass opened by the list
    /// sealed from the pass's parent context.
    ///
    /// # Errors
    ///
    /// Returns an [`RhiError`] if the backend cannot close the command stream.
    fn seal_parallel_context(
        &self,
        context: Box<dyn CommandContext>,
    ) -> Result<PlatformCommandList, RhiError> {
        self.seal_context(context)
    }

    /// Submits a batch of sealed lists to the hardware queues, in order.
    ///
    /// # Errors
    ///
    /// Returns an [`RhiError`] if the device rejects the batch.
    fn submit_batches(&self, lists: Vec<PlatformCommandList>) -> Result<(), RhiError>;

    /// Destroys the given resources if the GPU no longer uses them.
    ///
    /// Destroyed resources are removed from `resources`. Resources still
    /// referenced by work in flight stay in the vector; the caller retries
    /// after [`RhiDevice::poll_completion`].
    fn delete_resources(&self, resources: &mut Vec<ResourceHandle>);

    /// Advances the backend's view of completed GPU work.
    fn poll_completion(&self) {}

    /// Flushes any backend-internal deletion queue.
    fn process_delete_queue(&self) {}

    /// Notifies the backend that a frame boundary was submitted.
    ///
    /// # Arguments
    ///
    /// * `frame_number` - The number of the frame that just ended.
    fn end_frame(&self, frame_number: u64) {
        let _ = frame_number;
    }
}
