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

use super::replay::ContextSet;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Shared description of a render pass recorded by several sub buffers.
///
/// The buffer that opens the pass may hand its open hardware contexts over to
/// the buffer that closes it. The handoff goes through this struct, so the
/// contexts change owner explicitly and are never aliased.
pub struct ParallelPassInfo {
    name: String,
    handoff: Mutex<ContextSet>,
}

impl ParallelPassInfo {
    /// Creates the description of a parallel render pass.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            handoff: Mutex::new(ContextSet::default()),
        })
    }

    /// Returns the name of the pass.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn store_contexts(&self, contexts: ContextSet) {
        let mut handoff = self.handoff.lock().unwrap();
        debug_assert!(
            handoff.iter().all(|(_, context)| context.is_none()),
            "parallel pass '{}' already holds handed-off contexts",
            self.name
        );
        *handoff = contexts;
    }

    pub(crate) fn take_contexts(&self) -> ContextSet {
        std::mem::take(&mut *self.handoff.lock().unwrap())
    }
}

impl fmt::Debug for ParallelPassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelPassInfo")
            .field("name", &self.name)
            .finish()
    }
}
