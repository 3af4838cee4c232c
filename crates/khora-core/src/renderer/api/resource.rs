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

//! Opaque GPU resource handles referenced by recorded commands.

/// An opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// An opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// An opaque handle to a compiled render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineId(pub u64);

/// An opaque handle to a compiled compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineId(pub u64);

/// A released resource waiting for deferred deletion.
///
/// Resources are not destroyed when the last CPU reference goes away: the GPU
/// may still read them from command lists in flight. They are queued and
/// handed back to the device by the submit stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceHandle {
    /// A buffer.
    Buffer(BufferId),
    /// A texture.
    Texture(TextureId),
}

impl From<BufferId> for ResourceHandle {
    fn from(id: BufferId) -> Self {
        ResourceHandle::Buffer(id)
    }
}

impl From<TextureId> for ResourceHandle {
    fn from(id: TextureId) -> Self {
        ResourceHandle::Texture(id)
    }
}
