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

//! Defines the hardware capability traits of the rendering subsystem.
//!
//! - [`RhiDevice`]: Hands out recording contexts, seals and submits command lists.
//! - [`CommandContext`]: A single-pipeline recording target commands are replayed into.

mod command_context;
mod rhi_device;

pub use self::command_context::CommandContext;
pub use self::rhi_device::RhiDevice;
