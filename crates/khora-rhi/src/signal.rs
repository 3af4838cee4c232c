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

//! One-shot completion signals.
//!
//! A [`CompletionSignal`] is the future/promise pair every stage of the
//! pipeline is stitched together with: command buffers fulfil one when they
//! finish recording, scheduled tasks fulfil one when their job returns, and
//! a submission fulfils one once the device accepted its lists.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

type Callback = Box<dyn FnOnce() + Send>;

struct SignalState {
    /// Outstanding holds. The signal completes when this reaches zero.
    holds: usize,
    complete: bool,
    callbacks: Vec<Callback>,
}

struct SignalInner {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

/// A cloneable handle to a one-shot event.
///
/// A pending signal starts with a single hold owned by whoever created it.
/// [`CompletionSignal::dont_complete_until`] adds holds that are released by
/// other signals, so a signal may outlive the work that created it.
#[derive(Clone)]
pub struct CompletionSignal {
    inner: Arc<SignalInner>,
}

impl CompletionSignal {
    /// Creates a pending signal.
    pub fn new() -> Self {
        Self::with_state(1, false)
    }

    /// Creates a signal that is already complete.
    pub fn completed() -> Self {
        Self::with_state(0, true)
    }

    fn with_state(holds: usize, complete: bool) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                state: Mutex::new(SignalState {
                    holds,
                    complete,
                    callbacks: Vec::new(),
                }),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Returns `true` once the signal fired.
    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().unwrap().complete
    }

    /// Releases the creator's hold on the signal.
    ///
    /// The signal fires once every hold is released. Completion callbacks run
    /// on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if the signal already fired.
    pub fn complete(&self) {
        self.release();
    }

    fn release(&self) {
        let callbacks = {
            let mut state = self.inner.state.lock().unwrap();
            assert!(
                !state.complete,
                "completion signal fulfilled more than once"
            );
            state.holds -= 1;
            if state.holds > 0 {
                return;
            }
            state.complete = true;
            self.inner.condvar.notify_all();
            std::mem::take(&mut state.callbacks)
        };

        for callback in callbacks {
            callback();
        }
    }

    /// Runs `callback` once the signal fires, or immediately if it already did.
    pub fn on_complete(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if !state.complete {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Keeps this signal pending until `other` fires as well.
    ///
    /// # Panics
    ///
    /// Panics if this signal already fired.
    pub fn dont_complete_until(&self, other: &CompletionSignal) {
        if other.is_complete() {
            return;
        }
        {
            let mut state = self.inner.state.lock().unwrap();
            assert!(
                !state.complete,
                "cannot extend a completion signal that already fired"
            );
            state.holds += 1;
        }
        let this = self.clone();
        other.on_complete(move || this.release());
    }

    /// Blocks the calling thread until the signal fires.
    pub fn wait(&self) {
        let mut state = self.inner.state.lock().unwrap();
        while !state.complete {
            state = self.inner.condvar.wait(state).unwrap();
        }
    }

    /// Blocks until the signal fires or `timeout` elapses.
    ///
    /// Returns `true` if the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock().unwrap();
        while !state.complete {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self.inner.condvar.wait_timeout(state, remaining).unwrap().0;
        }
        true
    }

    /// Returns a signal that fires once every signal in `signals` fired.
    pub fn all(signals: &[CompletionSignal]) -> CompletionSignal {
        let aggregate = CompletionSignal::new();
        for signal in signals {
            aggregate.dont_complete_until(signal);
        }
        aggregate.complete();
        aggregate
    }

    /// Returns `true` if both handles refer to the same signal.
    pub fn ptr_eq(a: &CompletionSignal, b: &CompletionSignal) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("complete", &self.is_complete())
            .finish()
    }
}
