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

//! # Khora RHI
//!
//! Deferred, multi-stage execution of GPU command buffers.
//!
//! Producers on any thread record [`CommandBuffer`]s without touching the
//! hardware. The [`Executor`] dispatches them in submission order, translates
//! them into hardware contexts on a worker pool, and submits the sealed
//! command lists to the device in a single call.
//!
//! ```no_run
//! use khora_rhi::{CommandBuffer, Executor, ExecutorConfig, SubmitFlags};
//! # fn run(device: std::sync::Arc<dyn khora_core::renderer::RhiDevice>) -> Result<(), khora_rhi::ExecutorError> {
//! let mut executor = Executor::new(device, ExecutorConfig::default())?;
//!
//! let mut buffer = CommandBuffer::parallel("shadows");
//! let pending = buffer.submit_later();
//! std::thread::spawn(move || {
//!     buffer.begin_scope("Shadows");
//!     buffer.end_scope();
//!     buffer.finish_recording();
//! });
//!
//! executor
//!     .submit([pending], SubmitFlags::SUBMIT_TO_GPU | SubmitFlags::END_FRAME)
//!     .wait();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod command_buffer;
pub mod config;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod signal;
pub mod task_pipe;
pub mod telemetry;

pub use self::command_buffer::{
    CommandBuffer, Operation, ParallelPassInfo, PendingCommandBuffer, RecordingKind,
    ReplayContext,
};
pub use self::config::ExecutorConfig;
pub use self::error::{ConfigError, ExecutorError};
pub use self::executor::{Executor, ExecutorState, SubmitFlags};
pub use self::scheduler::{Scheduler, SchedulingPolicy, WorkerCategory};
pub use self::signal::CompletionSignal;
pub use self::task_pipe::{TaskPipe, TaskTicket};
pub use self::telemetry::RhiEvent;
