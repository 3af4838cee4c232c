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

//! Hands finalized command lists to the device.

use super::dispatch::SubmitState;
use super::flags::SubmitFlags;
use super::ExecutorShared;
use crate::telemetry::RhiEvent;
use khora_core::renderer::DrawStats;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

/// Submits everything translated for `state`, then runs the post-submission
/// bookkeeping and fires the submission's completion signal.
///
/// Runs on the submission pipe after every translate job of the state was
/// finalized.
pub(crate) fn run(shared: &ExecutorShared, state: &Mutex<SubmitState>) {
    let mut state = state.lock().unwrap();

    let mut command_lists = Vec::new();
    let mut stats = DrawStats::default();
    for job in &state.jobs {
        let (lists, job_stats) = job.take_finalized();
        command_lists.extend(lists);
        stats.accumulate(&job_stats);
    }
    shared.frame_stats.lock().unwrap().accumulate(&stats);

    let submitted = RhiEvent::Submitted {
        command_lists: command_lists.len(),
        translate_jobs: state.jobs.len(),
    };
    log::debug!(
        "Submitting {} command list(s) from {} translate job(s).",
        command_lists.len(),
        state.jobs.len()
    );
    if let Err(err) = shared.device.submit_batches(command_lists) {
        shared.fatal("submit", &err);
    }
    shared.events.publish(submitted);

    sweep_deletions(shared, &mut state);

    if state.flags.contains(SubmitFlags::DELETE_RESOURCES) {
        shared.device.process_delete_queue();
    }

    if state.flags.contains(SubmitFlags::END_FRAME) {
        let frame = shared.frame_number.fetch_add(1, Ordering::AcqRel);
        shared.device.end_frame(frame);
        let stats = std::mem::take(&mut *shared.frame_stats.lock().unwrap());
        log::debug!(
            "Frame {frame} ended: {} draw(s), {} primitive(s), {} dispatch(es).",
            stats.draws,
            stats.primitives,
            stats.dispatches
        );
        shared.events.publish(RhiEvent::FrameEnded { frame, stats });
    }

    let completion = state.completion.clone();
    drop(state);
    shared.in_flight.fetch_sub(1, Ordering::AcqRel);
    completion.complete();
}

/// Deletes released resources the device no longer uses.
///
/// When the submission also flushes, resources released in the meantime are
/// gathered on every pass and the sweep polls the device until all of them
/// are gone. Otherwise a single pass runs and whatever is still in use goes
/// back to the deletion queue for a later submission.
fn sweep_deletions(shared: &ExecutorShared, state: &mut SubmitState) {
    let gather = state
        .flags
        .contains(SubmitFlags::FLUSH_AND_WAIT | SubmitFlags::DELETE_RESOURCES);
    let mut pending = std::mem::take(&mut state.resources_to_delete);

    loop {
        if gather {
            pending.append(&mut shared.deletion_queue.lock().unwrap());
        }
        if pending.is_empty() {
            break;
        }
        shared.device.delete_resources(&mut pending);
        if pending.is_empty() {
            continue;
        }
        if !gather {
            log::trace!(
                "{} resource(s) still in use, deferring them to a later submission.",
                pending.len()
            );
            shared.deletion_queue.lock().unwrap().append(&mut pending);
            break;
        }
        log::trace!("{} resource(s) still in use, polling the device.", pending.len());
        shared.device.poll_completion();
    }
}
