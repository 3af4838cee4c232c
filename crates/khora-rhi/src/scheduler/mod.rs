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

//! The task scheduler the pipeline stages run on.
//!
//! Work is routed to one of three [`WorkerCategory`]s. The pool and the
//! submission thread are spawned once, when the scheduler is created. `Local`
//! work is queued for the producer thread and only runs while that thread
//! waits through [`Scheduler::wait`].

mod policy;
mod worker;

pub use self::policy::{PipeSelector, SchedulingPolicy, TranslateTarget};

use self::worker::{FailureSlot, Job};
use crate::error::ExecutorError;
use crate::signal::CompletionSignal;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long a waiting producer sleeps before re-checking for worker failures.
const FAILURE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The class of thread a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerCategory {
    /// The producer thread. Runs only while the producer waits.
    Local,
    /// Any thread of the parallel worker pool.
    AnyWorker,
    /// The single dedicated submission thread.
    Submission,
}

struct SchedulerShared {
    pool: Option<Sender<Job>>,
    submission: Option<Sender<Job>>,
    local_tx: Sender<Job>,
    local_rx: Receiver<Job>,
    threads: Vec<JoinHandle<()>>,
    stall: Arc<Mutex<()>>,
    failure: Arc<FailureSlot>,
    worker_count: usize,
}

impl Drop for SchedulerShared {
    fn drop(&mut self) {
        // Disconnect the queues so the threads leave their receive loops.
        self.pool.take();
        self.submission.take();

        let current = thread::current().id();
        for handle in self.threads.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::error!("A scheduler thread terminated abnormally.");
            }
        }
        log::debug!("Scheduler shut down.");
    }
}

/// A cloneable handle to the worker threads and the producer's local queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
}

impl Scheduler {
    /// Creates a scheduler with `worker_threads` pool threads and one
    /// submission thread.
    ///
    /// With zero pool threads, [`WorkerCategory::AnyWorker`] work runs on the
    /// producer's local queue.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::WorkerSpawn`] if a thread cannot be spawned.
    pub fn new(worker_threads: usize) -> Result<Self, ExecutorError> {
        let failure = Arc::new(FailureSlot::default());
        let stall = Arc::new(Mutex::new(()));
        let mut threads = Vec::with_capacity(worker_threads + 1);

        let pool = if worker_threads > 0 {
            let (tx, rx) = crossbeam_channel::unbounded::<Job>();
            for index in 0..worker_threads {
                let name = format!("khora-rhi-worker-{index}");
                let handle = worker::spawn(name.clone(), rx.clone(), failure.clone(), None)
                    .map_err(|source| ExecutorError::WorkerSpawn { name, source })?;
                threads.push(handle);
            }
            Some(tx)
        } else {
            None
        };

        let (submission_tx, submission_rx) = crossbeam_channel::unbounded::<Job>();
        let name = "khora-rhi-submit".to_string();
        let handle = worker::spawn(
            name.clone(),
            submission_rx,
            failure.clone(),
            Some(stall.clone()),
        )
        .map_err(|source| ExecutorError::WorkerSpawn { name, source })?;
        threads.push(handle);

        let (local_tx, local_rx) = crossbeam_channel::unbounded::<Job>();

        log::info!("Scheduler started with {worker_threads} worker thread(s).");

        Ok(Self {
            shared: Arc::new(SchedulerShared {
                pool,
                submission: Some(submission_tx),
                local_tx,
                local_rx,
                threads,
                stall,
                failure,
                worker_count: worker_threads,
            }),
        })
    }

    /// Returns the number of pool threads.
    pub fn worker_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Schedules `job` on `category` once every prerequisite completed.
    ///
    /// The job receives its own completion signal, which fires when the job
    /// returns unless the job extended it with
    /// [`CompletionSignal::dont_complete_until`].
    pub fn launch<F>(
        &self,
        category: WorkerCategory,
        prerequisites: Vec<CompletionSignal>,
        job: F,
    ) -> CompletionSignal
    where
        F: FnOnce(&CompletionSignal) + Send + 'static,
    {
        let done = CompletionSignal::new();
        let signal = done.clone();
        let run: Job = Box::new(move || {
            job(&signal);
            signal.complete();
        });

        let launch = Arc::new(PendingLaunch {
            remaining: AtomicUsize::new(1),
            job: Mutex::new(Some(run)),
            category,
            scheduler: self.clone(),
        });
        for prerequisite in prerequisites {
            if prerequisite.is_complete() {
                continue;
            }
            launch.remaining.fetch_add(1, Ordering::AcqRel);
            let pending = launch.clone();
            prerequisite.on_complete(move || pending.arrive());
        }
        launch.arrive();

        done
    }

    fn dispatch(&self, category: WorkerCategory, job: Job) {
        let shared = &self.shared;
        let sender = match category {
            WorkerCategory::Local => &shared.local_tx,
            WorkerCategory::AnyWorker => shared.pool.as_ref().unwrap_or(&shared.local_tx),
            WorkerCategory::Submission => shared.submission.as_ref().unwrap_or(&shared.local_tx),
        };
        if let Err(err) = sender.send(job) {
            log::error!("Scheduler queue for {category:?} is disconnected, running job inline.");
            (err.0)();
        }
    }

    /// Waits for `signal`, running local work in the meantime.
    ///
    /// # Panics
    ///
    /// Re-raises the first panic captured on a worker thread.
    pub fn wait(&self, signal: &CompletionSignal) {
        let wake = self.shared.local_tx.clone();
        signal.on_complete(move || {
            let _ = wake.send(Box::new(|| {}));
        });

        loop {
            self.raise_worker_failure();
            if signal.is_complete() {
                return;
            }
            match self.shared.local_rx.recv_timeout(FAILURE_POLL_INTERVAL) {
                Ok(job) => job(),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    signal.wait_timeout(FAILURE_POLL_INTERVAL);
                }
            }
        }
    }

    /// Runs every local job queued so far without blocking.
    ///
    /// Returns the number of jobs run.
    pub fn run_pending_local(&self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.shared.local_rx.try_recv() {
            job();
            count += 1;
        }
        count
    }

    /// Pauses the submission thread until the returned guard is dropped.
    ///
    /// A job already running on the submission thread finishes first. The
    /// caller must not wait on submission work while holding the guard.
    pub fn stall_submission(&self) -> SubmissionStall<'_> {
        let guard = self
            .shared
            .stall
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log::debug!("Submission thread stalled.");
        SubmissionStall { _guard: guard }
    }

    fn raise_worker_failure(&self) {
        if let Some(message) = self.shared.failure.get() {
            panic!("a pipeline worker panicked: {message}");
        }
    }
}

/// Keeps the submission thread paused while alive.
#[must_use = "the submission thread resumes as soon as the stall is dropped"]
pub struct SubmissionStall<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl Drop for SubmissionStall<'_> {
    fn drop(&mut self) {
        log::debug!("Submission thread resumed.");
    }
}

/// A job waiting for its prerequisites.
struct PendingLaunch {
    remaining: AtomicUsize,
    job: Mutex<Option<Job>>,
    category: WorkerCategory,
    scheduler: Scheduler,
}

impl PendingLaunch {
    fn arrive(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        if let Some(job) = self.job.lock().unwrap().take() {
            self.scheduler.dispatch(self.category, job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn thread_name() -> String {
        thread::current().name().unwrap_or("unnamed").to_string()
    }

    #[test]
    fn jobs_run_on_their_category() {
        let scheduler = Scheduler::new(2).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut signals = Vec::new();
        for category in [
            WorkerCategory::AnyWorker,
            WorkerCategory::Submission,
            WorkerCategory::Local,
        ] {
            let seen = seen.clone();
            signals.push(scheduler.launch(category, Vec::new(), move |_| {
                seen.lock().unwrap().push((category, thread_name()));
            }));
        }
        scheduler.wait(&CompletionSignal::all(&signals));

        let main = thread_name();
        for (category, name) in seen.lock().unwrap().iter() {
            match category {
                WorkerCategory::AnyWorker => assert!(name.starts_with("khora-rhi-worker-")),
                WorkerCategory::Submission => assert_eq!(name, "khora-rhi-submit"),
                WorkerCategory::Local => assert_eq!(name, &main),
            }
        }
    }

    #[test]
    fn local_jobs_wait_for_the_producer() {
        let scheduler = Scheduler::new(1).unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        let signal = scheduler.launch(WorkerCategory::Local, Vec::new(), move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(10));
        assert!(!ran.load(Ordering::SeqCst));

        assert_eq!(scheduler.run_pending_local(), 1);
        assert!(ran.load(Ordering::SeqCst));
        assert!(signal.is_complete());
    }

    #[test]
    fn prerequisites_gate_the_launch() {
        let scheduler = Scheduler::new(2).unwrap();
        let gate = CompletionSignal::new();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        let signal = scheduler.launch(WorkerCategory::AnyWorker, vec![gate.clone()], move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(!ran.load(Ordering::SeqCst));

        gate.complete();
        scheduler.wait(&signal);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn job_can_extend_its_own_signal() {
        let scheduler = Scheduler::new(1).unwrap();
        let extra = CompletionSignal::new();

        let held = extra.clone();
        let signal = scheduler.launch(WorkerCategory::AnyWorker, Vec::new(), move |me| {
            me.dont_complete_until(&held);
        });
        assert!(!signal.wait_timeout(Duration::from_millis(20)));

        extra.complete();
        scheduler.wait(&signal);
    }

    #[test]
    fn zero_workers_fall_back_to_local() {
        let scheduler = Scheduler::new(0).unwrap();
        let signal = scheduler.launch(WorkerCategory::AnyWorker, Vec::new(), |_| {});
        scheduler.wait(&signal);
        assert!(signal.is_complete());
    }

    #[test]
    fn stall_pauses_submission_work() {
        let scheduler = Scheduler::new(1).unwrap();
        let stall = scheduler.stall_submission();

        let signal = scheduler.launch(WorkerCategory::Submission, Vec::new(), |_| {});
        assert!(!signal.wait_timeout(Duration::from_millis(20)));

        drop(stall);
        scheduler.wait(&signal);
    }

    #[test]
    #[should_panic(expected = "a pipeline worker panicked: boom")]
    fn worker_panics_are_raised_on_wait() {
        let scheduler = Scheduler::new(1).unwrap();
        let signal = scheduler.launch(WorkerCategory::AnyWorker, Vec::new(), |_| {
            panic!("boom");
        });
        scheduler.wait(&signal);
    }
}
