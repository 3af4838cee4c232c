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

//! Strictly ordered task chains.
//!
//! A [`TaskPipe`] runs the closures enqueued on it one after another, in
//! enqueue order, without ever blocking a worker thread on the previous task.
//! While a task runs, the producer may append a successor through the task's
//! `next` link. The running chain then executes the successor in place,
//! without another round trip through the scheduler. When the chain already
//! finished, the producer launches the successor as a fresh task instead.
//!
//! The `next` link of a task is an [`AtomicPtr`] with three states:
//!
//! - null: the task has no successor yet,
//! - another task: the producer appended a successor,
//! - the task's own address: the task finished, and appending must launch.
//!
//! Producer and consumer race on the same null-to-something transition with a
//! compare-and-swap, so exactly one of them wins.

use crate::scheduler::{Scheduler, WorkerCategory};
use crate::signal::CompletionSignal;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, Mutex};

type PipeJob = Box<dyn FnOnce() + Send>;

/// A node of a task chain.
///
/// Shared by the producer (as the tail it may append to) and the consumer (as
/// the task it is running). A successor is owned by its predecessor's `next`
/// link until the consumer takes it.
struct PipeTask {
    category: WorkerCategory,
    job: Mutex<Option<PipeJob>>,
    prerequisites: Mutex<Vec<CompletionSignal>>,
    next: AtomicPtr<PipeTask>,
    void: Arc<AtomicBool>,
}

impl PipeTask {
    fn sentinel(&self) -> *mut PipeTask {
        self as *const PipeTask as *mut PipeTask
    }
}

impl Drop for PipeTask {
    fn drop(&mut self) {
        let next = *self.next.get_mut();
        if !next.is_null() && next != self.sentinel() {
            // The chain never ran this far. Reclaim the successor it owned.
            // SAFETY: a non-sentinel, non-null `next` was produced by
            // `Arc::into_raw` in `TaskPipe::enqueue` and nothing else took it.
            drop(unsafe { Arc::from_raw(next) });
        }
    }
}

/// A handle to an enqueued task.
#[derive(Debug, Clone)]
pub struct TaskTicket {
    void: Arc<AtomicBool>,
}

impl TaskTicket {
    /// Marks the task as superseded.
    ///
    /// The task still takes its turn in the chain but skips its closure.
    pub fn mark_void(&self) {
        self.void.store(true, Ordering::Release);
    }

    /// Returns `true` if the task was marked void.
    pub fn is_void(&self) -> bool {
        self.void.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct PipeState {
    current: Option<Arc<PipeTask>>,
    category: Option<WorkerCategory>,
    last_signal: Option<CompletionSignal>,
}

impl PipeState {
    fn close(&mut self) -> Option<CompletionSignal> {
        self.current = None;
        self.last_signal.clone()
    }
}

/// An ordered queue of tasks executed on a single logical thread.
pub struct TaskPipe {
    name: &'static str,
    scheduler: Scheduler,
    state: Mutex<PipeState>,
}

impl TaskPipe {
    /// Creates an empty pipe whose tasks run on `scheduler`.
    pub fn new(name: &'static str, scheduler: Scheduler) -> Self {
        Self {
            name,
            scheduler,
            state: Mutex::new(PipeState::default()),
        }
    }

    /// Returns the name the pipe was created with.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Appends a task to the chain.
    ///
    /// The task runs after every task enqueued before it and after all of
    /// `prerequisites` completed. Switching to another worker category closes
    /// the current chain, and the new chain starts after the old one finished.
    pub fn enqueue<F>(
        &self,
        category: WorkerCategory,
        mut prerequisites: Vec<CompletionSignal>,
        job: F,
    ) -> TaskTicket
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock().unwrap();

        if state.category != Some(category) {
            if let Some(previous) = state.close() {
                prerequisites.push(previous);
            }
            state.category = Some(category);
        }

        let void = Arc::new(AtomicBool::new(false));
        let task = Arc::new(PipeTask {
            category,
            job: Mutex::new(Some(Box::new(job))),
            prerequisites: Mutex::new(prerequisites),
            next: AtomicPtr::new(ptr::null_mut()),
            void: void.clone(),
        });
        let ticket = TaskTicket { void };

        if let Some(tail) = state.current.replace(task.clone()) {
            let raw = Arc::into_raw(task.clone()) as *mut PipeTask;
            match tail
                .next
                .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    log::trace!("Pipe '{}': task chained onto a running task.", self.name);
                    return ticket;
                }
                Err(_) => {
                    // The tail already finished. Take the reference back and launch.
                    // SAFETY: `raw` came from `Arc::into_raw` above and was never published.
                    drop(unsafe { Arc::from_raw(raw) });
                }
            }
        }

        state.last_signal = Some(launch(&self.scheduler, task));
        ticket
    }

    /// Closes the current chain.
    ///
    /// Returns the signal of the last launched chain, which completes once every
    /// task enqueued so far ran. The next enqueue starts a fresh chain.
    pub fn close(&self) -> Option<CompletionSignal> {
        self.state.lock().unwrap().close()
    }

    /// Returns the signal of the last launched chain without closing it.
    pub fn last_signal(&self) -> Option<CompletionSignal> {
        self.state.lock().unwrap().last_signal.clone()
    }
}

impl std::fmt::Debug for TaskPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPipe").field("name", &self.name).finish()
    }
}

fn launch(scheduler: &Scheduler, task: Arc<PipeTask>) -> CompletionSignal {
    let prerequisites = std::mem::take(&mut *task.prerequisites.lock().unwrap());
    let chain_scheduler = scheduler.clone();
    scheduler.launch(task.category, prerequisites, move |current| {
        execute_chain(&chain_scheduler, task, current)
    })
}

/// Runs `task` and every successor appended while the chain is running.
fn execute_chain(scheduler: &Scheduler, mut task: Arc<PipeTask>, current: &CompletionSignal) {
    loop {
        let blocked = task
            .prerequisites
            .lock()
            .unwrap()
            .iter()
            .any(|prerequisite| !prerequisite.is_complete());
        if blocked {
            // A chained successor must not block the worker. Relaunch it behind
            // its prerequisites and keep this chain's signal open until it ran.
            let relaunched = launch(scheduler, task);
            current.dont_complete_until(&relaunched);
            return;
        }

        let job = task.job.lock().unwrap().take();
        if task.void.load(Ordering::Acquire) {
            // Dropped unrun, releasing whatever the closure captured.
            log::trace!("Skipping void pipe task.");
        } else if let Some(job) = job {
            job();
        }

        let sentinel = task.sentinel();
        match task
            .next
            .compare_exchange(ptr::null_mut(), sentinel, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => return,
            Err(next) => {
                // The producer never touches a task whose `next` is set, so
                // marking it finished here cannot race.
                task.next.store(sentinel, Ordering::Release);
                // SAFETY: the producer published `next` with `Arc::into_raw` and
                // the sentinel store above hands its ownership to this thread.
                task = unsafe { Arc::from_raw(next) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn scheduler() -> Scheduler {
        Scheduler::new(4).unwrap()
    }

    #[test]
    fn tasks_run_in_enqueue_order() {
        let scheduler = scheduler();
        let pipe = TaskPipe::new("order", scheduler.clone());
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..64 {
            let order = order.clone();
            pipe.enqueue(WorkerCategory::AnyWorker, Vec::new(), move || {
                if i % 7 == 0 {
                    thread::sleep(Duration::from_micros(200));
                }
                order.lock().unwrap().push(i);
            });
        }
        let done = pipe.close().unwrap();
        scheduler.wait(&done);

        assert_eq!(*order.lock().unwrap(), (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn category_switch_preserves_order() {
        let scheduler = scheduler();
        let pipe = TaskPipe::new("switch", scheduler.clone());
        let order = Arc::new(Mutex::new(Vec::new()));

        let categories = [
            WorkerCategory::AnyWorker,
            WorkerCategory::Submission,
            WorkerCategory::AnyWorker,
            WorkerCategory::Local,
            WorkerCategory::Submission,
        ];
        for (i, category) in categories.into_iter().enumerate() {
            let order = order.clone();
            pipe.enqueue(category, Vec::new(), move || {
                thread::sleep(Duration::from_millis(2));
                order.lock().unwrap().push(i);
            });
        }
        scheduler.wait(&pipe.close().unwrap());

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn chained_task_with_pending_prerequisite_is_relaunched() {
        let scheduler = scheduler();
        let pipe = TaskPipe::new("relaunch", scheduler.clone());
        let gate = CompletionSignal::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = order.clone();
        pipe.enqueue(WorkerCategory::AnyWorker, Vec::new(), move || {
            thread::sleep(Duration::from_millis(10));
            first.lock().unwrap().push("first");
        });
        let second = order.clone();
        pipe.enqueue(WorkerCategory::AnyWorker, vec![gate.clone()], move || {
            second.lock().unwrap().push("second");
        });

        let done = pipe.close().unwrap();
        assert!(!done.wait_timeout(Duration::from_millis(40)));
        assert_eq!(*order.lock().unwrap(), vec!["first"]);

        gate.complete();
        scheduler.wait(&done);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn void_tasks_keep_their_turn_but_skip_work() {
        let scheduler = scheduler();
        let pipe = TaskPipe::new("void", scheduler.clone());
        let ran = Arc::new(Mutex::new(Vec::new()));

        let mut tickets = Vec::new();
        for i in 0..3 {
            let ran = ran.clone();
            tickets.push(pipe.enqueue(WorkerCategory::Local, Vec::new(), move || {
                ran.lock().unwrap().push(i);
            }));
        }
        tickets[1].mark_void();
        assert!(tickets[1].is_void());

        scheduler.wait(&pipe.close().unwrap());
        assert_eq!(*ran.lock().unwrap(), vec![0, 2]);
    }

    #[test]
    fn concurrent_producers_never_lose_or_repeat_tasks() {
        const PER_PRODUCER: usize = 500;
        let scheduler = scheduler();
        let pipe = Arc::new(TaskPipe::new("race", scheduler.clone()));
        let executions: Arc<Vec<AtomicUsize>> =
            Arc::new((0..PER_PRODUCER * 2).map(|_| AtomicUsize::new(0)).collect());

        let producers: Vec<_> = (0..2)
            .map(|producer| {
                let pipe = pipe.clone();
                let executions = executions.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let slot = producer * PER_PRODUCER + i;
                        let executions = executions.clone();
                        pipe.enqueue(WorkerCategory::AnyWorker, Vec::new(), move || {
                            executions[slot].fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        scheduler.wait(&pipe.close().unwrap());

        for count in executions.iter() {
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn close_without_tasks_returns_none() {
        let pipe = TaskPipe::new("empty", scheduler());
        assert!(pipe.close().is_none());
        assert!(pipe.last_signal().is_none());
    }

    #[test]
    fn dropping_a_linked_task_reclaims_its_successor() {
        let marker = Arc::new(());
        let make = |marker: Arc<()>| {
            Arc::new(PipeTask {
                category: WorkerCategory::Local,
                job: Mutex::new(Some(Box::new(move || drop(marker)) as PipeJob)),
                prerequisites: Mutex::new(Vec::new()),
                next: AtomicPtr::new(ptr::null_mut()),
                void: Arc::new(AtomicBool::new(false)),
            })
        };

        let head = make(marker.clone());
        let tail = make(marker.clone());
        head.next
            .store(Arc::into_raw(tail) as *mut PipeTask, Ordering::Release);
        assert_eq!(Arc::strong_count(&marker), 3);

        drop(head);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
