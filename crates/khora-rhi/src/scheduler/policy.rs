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

use super::WorkerCategory;
use crate::config::ExecutorConfig;

/// Which task pipe a translate job enqueues its work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeSelector {
    /// The job's own pipe, closed when the job is finalized.
    Job,
    /// The executor's submission pipe, shared with the submit stage.
    Submission,
}

/// Where the translate work of a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateTarget {
    /// The worker category of every task of the job.
    pub category: WorkerCategory,
    /// The pipe the tasks are chained on.
    pub pipe: PipeSelector,
}

/// Resolves which worker category each pipeline stage runs on.
///
/// Derived once from the [`ExecutorConfig`]. With parallelism disabled (or in
/// bypass mode) every stage runs on the producer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingPolicy {
    /// Whether dispatch, translate and submit may leave the producer thread.
    pub allow_parallel: bool,
    /// Whether translate jobs may run on the worker pool.
    pub parallel_translate: bool,
    /// Whether every submit goes straight to the hardware and waits.
    pub bypass: bool,
}

impl SchedulingPolicy {
    /// Derives the policy from a configuration.
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            allow_parallel: config.allow_parallel,
            parallel_translate: config.parallel_translate,
            bypass: config.bypass,
        }
    }

    /// Returns `true` if stages may run off the producer thread.
    pub fn is_parallel(&self) -> bool {
        self.allow_parallel && !self.bypass
    }

    /// Returns `true` if eligible translate jobs may run on the worker pool.
    pub fn allows_parallel_translate(&self) -> bool {
        self.is_parallel() && self.parallel_translate
    }

    /// The category of dispatch tasks.
    pub fn dispatch_target(&self) -> WorkerCategory {
        if self.is_parallel() {
            WorkerCategory::AnyWorker
        } else {
            WorkerCategory::Local
        }
    }

    /// The category and pipe of the translate tasks of a job.
    ///
    /// # Arguments
    ///
    /// * `parallel_job` - Whether the job was opened for parallel translation.
    pub fn translate_target(&self, parallel_job: bool) -> TranslateTarget {
        if !self.is_parallel() {
            TranslateTarget {
                category: WorkerCategory::Local,
                pipe: PipeSelector::Submission,
            }
        } else if !parallel_job {
            TranslateTarget {
                category: WorkerCategory::Submission,
                pipe: PipeSelector::Submission,
            }
        } else {
            TranslateTarget {
                category: WorkerCategory::AnyWorker,
                pipe: PipeSelector::Job,
            }
        }
    }

    /// The category of submit tasks.
    pub fn submit_target(&self) -> WorkerCategory {
        if self.is_parallel() {
            WorkerCategory::Submission
        } else {
            WorkerCategory::Local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(allow_parallel: bool, bypass: bool) -> SchedulingPolicy {
        SchedulingPolicy {
            allow_parallel,
            parallel_translate: true,
            bypass,
        }
    }

    #[test]
    fn parallel_policy_spreads_stages() {
        let policy = policy(true, false);
        assert_eq!(policy.dispatch_target(), WorkerCategory::AnyWorker);
        assert_eq!(policy.submit_target(), WorkerCategory::Submission);
        assert_eq!(
            policy.translate_target(true),
            TranslateTarget {
                category: WorkerCategory::AnyWorker,
                pipe: PipeSelector::Job,
            }
        );
        assert_eq!(
            policy.translate_target(false),
            TranslateTarget {
                category: WorkerCategory::Submission,
                pipe: PipeSelector::Submission,
            }
        );
    }

    #[test]
    fn serial_policy_keeps_everything_local() {
        for policy in [policy(false, false), policy(true, true)] {
            assert!(!policy.is_parallel());
            assert!(!policy.allows_parallel_translate());
            assert_eq!(policy.dispatch_target(), WorkerCategory::Local);
            assert_eq!(policy.submit_target(), WorkerCategory::Local);
            assert_eq!(
                policy.translate_target(true).category,
                WorkerCategory::Local
            );
        }
    }

    #[test]
    fn derived_from_config() {
        let config = ExecutorConfig {
            parallel_translate: false,
            ..ExecutorConfig::default()
        };
        let policy = SchedulingPolicy::from_config(&config);
        assert!(policy.is_parallel());
        assert!(!policy.allows_parallel_translate());
    }
}
