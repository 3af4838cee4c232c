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

//! Worker thread bodies.

use crossbeam_channel::Receiver;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// The first panic raised by a worker, kept until a waiter re-raises it.
#[derive(Default)]
pub(crate) struct FailureSlot {
    message: Mutex<Option<String>>,
}

impl FailureSlot {
    pub(crate) fn record(&self, thread_name: &str, payload: Box<dyn Any + Send>) {
        let message = panic_message(payload.as_ref());
        log::error!("Worker '{thread_name}' panicked: {message}");
        let mut slot = self.message.lock().unwrap();
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    pub(crate) fn get(&self) -> Option<String> {
        self.message.lock().unwrap().clone()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs a job, capturing a panic into `failure`.
pub(crate) fn run_guarded(job: Job, failure: &FailureSlot) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let name = thread::current().name().unwrap_or("unnamed").to_string();
        failure.record(&name, payload);
    }
}

/// Spawns a thread draining `jobs` until every sender is dropped.
///
/// `stall` is held while a job runs, so the owner of the lock can pause the
/// thread between jobs.
pub(crate) fn spawn(
    name: String,
    jobs: Receiver<Job>,
    failure: Arc<FailureSlot>,
    stall: Option<Arc<Mutex<()>>>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name(name).spawn(move || {
        log::trace!(
            "Worker '{}' started.",
            thread::current().name().unwrap_or("unnamed")
        );
        for job in jobs.iter() {
            match &stall {
                Some(stall) => {
                    let _guard = stall.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    run_guarded(job, &failure);
                }
                None => run_guarded(job, &failure),
            }
        }
        log::trace!(
            "Worker '{}' exiting.",
            thread::current().name().unwrap_or("unnamed")
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extraction() {
        let failure = FailureSlot::default();
        run_guarded(Box::new(|| panic!("device lost")), &failure);
        assert_eq!(failure.get().as_deref(), Some("device lost"));

        // Only the first failure is kept.
        run_guarded(Box::new(|| panic!("{}", String::from("second"))), &failure);
        assert_eq!(failure.get().as_deref(), Some("device lost"));
    }

    #[test]
    fn worker_drains_until_disconnected() {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let handle = spawn(
            "test-worker".to_string(),
            rx,
            Arc::new(FailureSlot::default()),
            None,
        )
        .unwrap();

        for i in 0..4 {
            let done_tx = done_tx.clone();
            tx.send(Box::new(move || done_tx.send(i).unwrap())).unwrap();
        }
        drop(tx);
        handle.join().unwrap();

        let received: Vec<i32> = done_rx.try_iter().collect();
        assert_eq!(received, vec![0, 1, 2, 3]);
    }
}
