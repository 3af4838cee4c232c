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

//! Provides the public, backend-agnostic rendering contracts for the Khora Engine.
//!
//! This module defines the "common language" shared by the command-list
//! execution pipeline and the hardware backends: the concrete GPU commands,
//! the pipelines they run on, the capability traits a backend implements
//! (like [`RhiDevice`]), and the error types they report.
//!
//! The 'how' is handled by a concrete backend in the `khora-infra` crate, while
//! `khora-rhi` schedules recording, translation and submission on top of these
//! traits without knowing the specifics of the underlying graphics API.

pub mod api;
pub mod error;
pub mod traits;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::error::RhiError;
pub use self::traits::{CommandContext, RhiDevice};
