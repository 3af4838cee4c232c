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

//! Recoverable errors of the execution pipeline.
//!
//! Only setup can fail recoverably. Misuse of the recording API and device
//! failures during a frame are fatal: misuse panics and a failed device
//! aborts the process.

use thiserror::Error;

/// An error raised while loading or validating an executor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read executor config '{path}': {source}")]
    Io {
        /// The path that failed to load.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The RON text is malformed or does not match the configuration schema.
    #[error("invalid executor config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// The configuration could not be serialized.
    #[error("failed to serialize executor config: {0}")]
    Serialize(#[from] ron::Error),
    /// The values parse but contradict each other.
    #[error("inconsistent executor config: {0}")]
    Invalid(String),
}

/// An error raised while creating an [`Executor`](crate::Executor).
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A scheduler thread could not be spawned.
    #[error("failed to spawn scheduler thread '{name}': {source}")]
    WorkerSpawn {
        /// The name of the thread.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
