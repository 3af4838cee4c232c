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

//! Defines the concrete GPU commands recorded into command buffers and the
//! sealed platform command lists produced from them.

use crate::renderer::api::resource::{BufferId, ComputePipelineId, RenderPipelineId, TextureId};
use crate::renderer::api::util::{IndexFormat, ResourceState, RhiPipeline};
use std::ops::Range;

/// A single backend-agnostic GPU command.
///
/// Commands are plain data: recording one never touches the hardware. They
/// are replayed into a [`CommandContext`](crate::renderer::traits::CommandContext)
/// by the translate stage.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// Sets the active render pipeline for subsequent draw calls.
    SetRenderPipeline(RenderPipelineId),
    /// Sets the active compute pipeline for subsequent dispatches.
    SetComputePipeline(ComputePipelineId),
    /// Binds a vertex buffer to a specific slot.
    SetVertexBuffer {
        /// The vertex buffer slot.
        slot: u32,
        /// The buffer to bind.
        buffer: BufferId,
        /// Byte offset into the buffer.
        offset: u64,
    },
    /// Binds an index buffer for indexed drawing.
    SetIndexBuffer {
        /// The buffer to bind.
        buffer: BufferId,
        /// Byte offset into the buffer.
        offset: u64,
        /// The format of the indices.
        format: IndexFormat,
    },
    /// A non-indexed draw call.
    Draw {
        /// The range of vertices to draw.
        vertices: Range<u32>,
        /// The range of instances to draw.
        instances: Range<u32>,
    },
    /// An indexed draw call.
    DrawIndexed {
        /// The range of indices to draw.
        indices: Range<u32>,
        /// Value added to each index before fetching the vertex.
        base_vertex: i32,
        /// The range of instances to draw.
        instances: Range<u32>,
    },
    /// A compute dispatch.
    Dispatch {
        /// Workgroups along X.
        x: u32,
        /// Workgroups along Y.
        y: u32,
        /// Workgroups along Z.
        z: u32,
    },
    /// Copies data from one buffer to another on the GPU.
    CopyBufferToBuffer {
        /// The source buffer.
        source: BufferId,
        /// Byte offset into the source.
        source_offset: u64,
        /// The destination buffer.
        destination: BufferId,
        /// Byte offset into the destination.
        destination_offset: u64,
        /// Number of bytes to copy.
        size: u64,
    },
    /// Transitions a texture between usage states.
    Transition {
        /// The texture to transition.
        texture: TextureId,
        /// The current state.
        from: ResourceState,
        /// The requested state.
        to: ResourceState,
    },
    /// Opens a named debug marker scope.
    BeginMarker(String),
    /// Closes the innermost debug marker scope.
    EndMarker,
    /// Opens a render pass whose body is recorded by several sub command lists.
    BeginParallelRenderPass {
        /// The name of the pass.
        name: String,
    },
    /// Closes the current parallel render pass.
    EndParallelRenderPass,
}

impl GpuCommand {
    /// Returns `true` for the draw variants.
    pub fn is_draw(&self) -> bool {
        matches!(self, GpuCommand::Draw { .. } | GpuCommand::DrawIndexed { .. })
    }

    /// Returns `true` for compute dispatches.
    pub fn is_dispatch(&self) -> bool {
        matches!(self, GpuCommand::Dispatch { .. })
    }

    /// Returns the number of triangles a draw submits, assuming triangle lists.
    pub fn primitive_count(&self) -> u64 {
        let (elements, instances) = match self {
            GpuCommand::Draw {
                vertices,
                instances,
            } => (vertices.len(), instances.len()),
            GpuCommand::DrawIndexed {
                indices, instances, ..
            } => (indices.len(), instances.len()),
            _ => return 0,
        };
        (elements as u64 / 3) * instances as u64
    }
}

/// An opaque identifier of a sealed platform command list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformCommandListId(pub u64);

/// A sealed, immutable, hardware-ready command list.
///
/// Produced by [`RhiDevice::seal_context`](crate::renderer::traits::RhiDevice::seal_context)
/// at the end of a translate job and consumed by the batched submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCommandList {
    /// The backend identifier of the list.
    pub id: PlatformCommandListId,
    /// The pipeline whose queue executes this list.
    pub pipeline: RhiPipeline,
    /// `true` for lists sealed from a parallel render pass context. The
    /// backend executes them inside the pass opened by the enclosing list.
    pub parallel_pass: bool,
}
