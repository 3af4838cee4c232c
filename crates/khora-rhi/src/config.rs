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

//! Operator-tunable executor settings.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The default command budget of a translate job.
pub const DEFAULT_MAX_COMMANDS_PER_TRANSLATE: i32 = 256;

/// The default capacity of the telemetry event bus.
pub const DEFAULT_TELEMETRY_CAPACITY: usize = 1024;

/// Configuration of an [`Executor`](crate::Executor).
///
/// Every field has a default, so a RON file only needs to name the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of threads in the parallel worker pool.
    pub worker_threads: usize,
    /// Whether dispatch, translate and submit may leave the producer thread.
    pub allow_parallel: bool,
    /// Whether eligible command buffers are translated on the worker pool.
    pub parallel_translate: bool,
    /// Command budget of a translate job before it is split.
    /// `0` disables the limit and a negative value splits after every buffer.
    pub max_commands_per_translate: i32,
    /// Allows serial buffers to join a parallel job.
    /// A parallel buffer still never joins a serial job.
    pub combine_single_and_parallel: bool,
    /// The buffer that closes a parallel render pass waits for every sub
    /// buffer of the pass before translating.
    pub child_wait: bool,
    /// Sub buffers wait for the buffer that opened their pass before translating.
    pub parent_wait: bool,
    /// Every submit goes to the hardware immediately and waits for it.
    pub bypass: bool,
    /// Events buffered on the telemetry bus before new ones are dropped.
    pub telemetry_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let worker_threads = std::thread::available_parallelism()
            .map(|threads| threads.get().saturating_sub(1).max(1))
            .unwrap_or(2);
        Self {
            worker_threads,
            allow_parallel: true,
            parallel_translate: true,
            max_commands_per_translate: DEFAULT_MAX_COMMANDS_PER_TRANSLATE,
            combine_single_and_parallel: false,
            child_wait: true,
            parent_wait: false,
            bypass: false,
            telemetry_capacity: DEFAULT_TELEMETRY_CAPACITY,
        }
    }
}

impl ExecutorConfig {
    /// Parses a configuration from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed text and
    /// [`ConfigError::Invalid`] for contradictory values.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: ExecutorConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or any error of
    /// [`ExecutorConfig::from_ron_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_ron_str(&text)?;
        log::info!("Loaded executor config from '{}'.", path.display());
        Ok(config)
    }

    /// Serializes the configuration to pretty-printed RON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Checks that the values are consistent with each other.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first inconsistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allow_parallel && !self.bypass && self.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "worker_threads must be at least 1 when allow_parallel is set".to_string(),
            ));
        }
        if self.telemetry_capacity == 0 {
            return Err(ConfigError::Invalid(
                "telemetry_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the command budget actually applied to translate jobs.
    ///
    /// Without parallel translation every buffer joins the open job.
    pub fn effective_max_commands(&self) -> i32 {
        if self.parallel_translate {
            self.max_commands_per_translate
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ExecutorConfig::default();
        assert!(config.worker_threads >= 1);
        assert_eq!(config.max_commands_per_translate, 256);
        assert!(config.child_wait);
        assert!(!config.parent_wait);
        assert!(!config.combine_single_and_parallel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_ron_overrides_defaults() {
        let config = ExecutorConfig::from_ron_str(
            "(worker_threads: 3, max_commands_per_translate: -1, parent_wait: true)",
        )
        .unwrap();

        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.max_commands_per_translate, -1);
        assert!(config.parent_wait);
        assert!(config.allow_parallel);
    }

    #[test]
    fn ron_round_trip() {
        let config = ExecutorConfig {
            worker_threads: 5,
            bypass: true,
            ..ExecutorConfig::default()
        };
        let text = config.to_ron_string().unwrap();
        assert_eq!(ExecutorConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn malformed_ron_is_a_parse_error() {
        let err = ExecutorConfig::from_ron_str("(worker_threads: \"many\")").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn parallel_without_workers_is_invalid() {
        let err = ExecutorConfig::from_ron_str("(worker_threads: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        // Serial execution needs no pool.
        assert!(ExecutorConfig::from_ron_str("(worker_threads: 0, allow_parallel: false)").is_ok());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ExecutorConfig::load("/definitely/not/here/executor.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn disabling_parallel_translate_lifts_the_budget() {
        let config = ExecutorConfig {
            parallel_translate: false,
            ..ExecutorConfig::default()
        };
        assert_eq!(config.effective_max_commands(), 0);
    }
}
