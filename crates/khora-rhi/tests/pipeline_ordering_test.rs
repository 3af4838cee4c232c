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

use anyhow::Result;
use khora_core::renderer::{GpuCommand, RhiPipeline};
use khora_infra::graphics::recording::{RecordingDevice, SealedRecording};
use khora_rhi::{
    CommandBuffer, Executor, ExecutorConfig, ExecutorState, ParallelPassInfo,
    PendingCommandBuffer, RhiEvent, SubmitFlags,
};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FLUSH: SubmitFlags = SubmitFlags::SUBMIT_TO_GPU.union(SubmitFlags::FLUSH_AND_WAIT);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn executor_with(config: ExecutorConfig) -> Result<(Executor, RecordingDevice)> {
    init_logging();
    let device = RecordingDevice::new();
    let executor = Executor::new(Arc::new(device.clone()), config)?;
    Ok((executor, device))
}

fn draw() -> GpuCommand {
    GpuCommand::Draw {
        vertices: 0..3,
        instances: 0..1,
    }
}

/// A parallel buffer holding `draws` draw calls, wrapped in a labelled marker.
fn labelled(label: &str, draws: u32) -> CommandBuffer {
    let mut buffer = CommandBuffer::parallel(label);
    buffer.enqueue_command(GpuCommand::BeginMarker(label.to_string()));
    for _ in 0..draws {
        buffer.enqueue_command(draw());
    }
    buffer.enqueue_command(GpuCommand::EndMarker);
    buffer
}

fn markers(device: &RecordingDevice) -> Vec<String> {
    device
        .submitted_commands()
        .into_iter()
        .filter_map(|command| match command {
            GpuCommand::BeginMarker(label) => Some(label),
            _ => None,
        })
        .collect()
}

fn submitted_jobs(executor: &Executor) -> Vec<usize> {
    executor
        .telemetry()
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            RhiEvent::Submitted { translate_jobs, .. } => Some(translate_jobs),
            _ => None,
        })
        .collect()
}

fn split_config(max_commands_per_translate: i32) -> ExecutorConfig {
    ExecutorConfig {
        worker_threads: 4,
        max_commands_per_translate,
        ..ExecutorConfig::default()
    }
}

#[test]
fn submission_order_survives_random_latency() -> Result<()> {
    for max_commands in [256, -1] {
        // --- ARRANGE ---
        let (mut executor, device) = executor_with(split_config(max_commands))?;
        let mut rng = rand::rng();
        let mut producers = Vec::new();
        let mut pending = Vec::new();

        for index in 0..12 {
            let label = format!("buffer-{index}");
            let mut buffer = CommandBuffer::parallel(label.clone());
            pending.push(buffer.submit_later());

            let record_delay = Duration::from_millis(rng.random_range(0..15));
            let translate_delay = Duration::from_millis(rng.random_range(0..15));
            producers.push(thread::spawn(move || {
                thread::sleep(record_delay);
                buffer.enqueue_command(GpuCommand::BeginMarker(label));
                buffer.enqueue_lambda(move |_| thread::sleep(translate_delay));
                buffer.enqueue_command(draw());
                buffer.enqueue_command(GpuCommand::EndMarker);
                buffer.finish_recording();
            }));
        }

        // --- ACT ---
        let done = executor.submit(pending, FLUSH);
        for producer in producers {
            producer.join().expect("producer panicked");
        }

        // --- ASSERT ---
        assert!(done.is_complete());
        let expected: Vec<_> = (0..12).map(|index| format!("buffer-{index}")).collect();
        assert_eq!(markers(&device), expected, "max_commands = {max_commands}");
    }
    Ok(())
}

#[test]
fn consecutive_submissions_reach_the_device_in_order() -> Result<()> {
    let (mut executor, device) = executor_with(split_config(-1))?;

    for index in 0..5 {
        let buffer = labelled(&format!("submit-{index}"), 4);
        executor.submit([buffer.into()], SubmitFlags::SUBMIT_TO_GPU);
    }
    executor.flush(FLUSH);

    let expected: Vec<_> = (0..5).map(|index| format!("submit-{index}")).collect();
    assert_eq!(markers(&device), expected);
    assert_eq!(device.submissions().len(), 5);
    Ok(())
}

#[test]
fn replay_through_the_pipeline_is_deterministic() -> Result<()> {
    let record = |buffer: &mut CommandBuffer| {
        buffer.begin_scope("Lighting");
        buffer.enqueue_command(draw());
        buffer.switch_pipeline(RhiPipeline::AsyncCompute);
        buffer.enqueue_command(GpuCommand::Dispatch { x: 8, y: 8, z: 1 });
        buffer.switch_pipeline(RhiPipeline::Graphics);
        buffer.enqueue_lambda(|replay| {
            replay.record_recursive("nested", |nested| {
                nested.enqueue_command(GpuCommand::Draw {
                    vertices: 0..6,
                    instances: 0..2,
                });
            });
        });
        buffer.end_scope();
    };

    let mut runs = Vec::new();
    for _ in 0..2 {
        let (mut executor, device) = executor_with(split_config(256))?;
        let mut buffer = CommandBuffer::parallel("frame");
        record(&mut buffer);
        executor.submit([buffer.into()], FLUSH);
        runs.push(device.submissions());
    }

    let commands = |run: &[Vec<SealedRecording>]| -> Vec<Vec<GpuCommand>> {
        run.iter()
            .flatten()
            .map(|recording| recording.commands.clone())
            .collect()
    };
    assert_eq!(commands(&runs[0]), commands(&runs[1]));
    assert!(!commands(&runs[0]).is_empty());
    Ok(())
}

#[test]
fn jobs_split_on_the_command_threshold() -> Result<()> {
    // ARRANGE
    let (mut executor, _device) = executor_with(split_config(256))?;
    let small: Vec<PendingCommandBuffer> = (0..3)
        .map(|index| {
            let mut buffer = CommandBuffer::parallel(format!("small-{index}"));
            for _ in 0..100 {
                buffer.enqueue_command(draw());
            }
            buffer.into()
        })
        .collect();

    // ACT
    executor.submit(small, FLUSH);
    let mut large = CommandBuffer::parallel("large");
    for _ in 0..300 {
        large.enqueue_command(draw());
    }
    executor.submit([large.into()], FLUSH);

    // ASSERT
    assert_eq!(submitted_jobs(&executor), vec![2, 1]);
    Ok(())
}

#[test]
fn serial_buffer_splits_on_both_sides() -> Result<()> {
    let (mut executor, device) = executor_with(split_config(256))?;

    let a = labelled("A", 1);
    let mut b = labelled("B", 1);
    b.disallow_parallel_translate();
    assert!(!b.allow_parallel_translate());
    let c = labelled("C", 1);

    executor.submit([a.into(), b.into(), c.into()], FLUSH);

    assert_eq!(submitted_jobs(&executor), vec![3]);
    assert_eq!(markers(&device), vec!["A", "B", "C"]);
    assert_eq!(device.submissions()[0].len(), 3);
    Ok(())
}

#[test]
fn empty_submit_completes_without_opening_a_submission() -> Result<()> {
    let (mut executor, device) = executor_with(ExecutorConfig::default())?;

    let done = executor.submit(Vec::new(), FLUSH);

    assert!(done.is_complete());
    assert_eq!(executor.state(), ExecutorState::Idle);
    assert!(device.submissions().is_empty());
    assert!(executor.telemetry().drain().is_empty());
    Ok(())
}

#[test]
fn immediate_buffer_goes_first() -> Result<()> {
    let (mut executor, device) = executor_with(split_config(256))?;

    executor
        .immediate()
        .enqueue_command(GpuCommand::BeginMarker("immediate".to_string()));
    executor.immediate().enqueue_command(GpuCommand::EndMarker);
    executor.submit([labelled("after", 2).into()], FLUSH);

    assert_eq!(markers(&device), vec!["immediate", "after"]);
    assert!(executor.immediate().is_empty());
    Ok(())
}

/// Records a parent buffer with a parallel pass whose sub buffer takes a while.
/// Returns what the closing part of the parent observed about the sub buffer.
fn run_parallel_pass(config: ExecutorConfig) -> Result<(bool, RecordingDevice)> {
    let (mut executor, device) = executor_with(config)?;
    let sub_done = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicBool::new(false));

    let pass = ParallelPassInfo::new("GBuffer");
    let mut sub = CommandBuffer::sub("gbuffer", &pass);
    let flag = sub_done.clone();
    sub.enqueue_lambda(move |_| {
        thread::sleep(Duration::from_millis(40));
        flag.store(true, Ordering::SeqCst);
    });
    sub.enqueue_command(draw());

    let mut parent = labelled("parent", 1);
    parent.insert_parallel_pass(pass, vec![sub.into()]);
    let (flag, seen) = (sub_done.clone(), observed.clone());
    parent.enqueue_lambda(move |_| seen.store(flag.load(Ordering::SeqCst), Ordering::SeqCst));
    parent.enqueue_command(draw());

    executor.submit([parent.into()], FLUSH);
    Ok((observed.load(Ordering::SeqCst), device))
}

#[test]
fn child_wait_orders_the_pass_end_after_its_children() -> Result<()> {
    let (observed, device) = run_parallel_pass(ExecutorConfig {
        child_wait: true,
        ..split_config(256)
    })?;

    assert!(observed, "the closing part ran before the sub buffer finished");

    let batch = &device.submissions()[0];
    let sub_lists: Vec<_> = batch
        .iter()
        .filter(|recording| recording.parallel_pass.is_some())
        .collect();
    assert_eq!(sub_lists.len(), 1);
    assert_eq!(sub_lists[0].parallel_pass.as_deref(), Some("GBuffer"));

    // The opening and closing halves share one forwarded context.
    let parent = batch
        .iter()
        .find(|recording| recording.parallel_pass.is_none())
        .expect("parent list");
    let begin = parent
        .commands
        .iter()
        .position(|command| matches!(command, GpuCommand::BeginParallelRenderPass { .. }));
    let end = parent
        .commands
        .iter()
        .position(|command| matches!(command, GpuCommand::EndParallelRenderPass));
    assert!(matches!((begin, end), (Some(begin), Some(end)) if begin < end));
    Ok(())
}

#[test]
fn without_child_wait_the_pass_halves_are_sealed_separately() -> Result<()> {
    let (_, device) = run_parallel_pass(ExecutorConfig {
        child_wait: false,
        ..split_config(256)
    })?;

    let batch = &device.submissions()[0];
    assert_eq!(batch.len(), 3);
    assert!(batch[0]
        .commands
        .iter()
        .any(|command| matches!(command, GpuCommand::BeginParallelRenderPass { .. })));
    assert_eq!(batch[1].parallel_pass.as_deref(), Some("GBuffer"));
    assert!(batch[2]
        .commands
        .iter()
        .any(|command| matches!(command, GpuCommand::EndParallelRenderPass)));
    Ok(())
}

#[test]
fn parent_wait_orders_sub_buffers_after_the_pass_begin() -> Result<()> {
    let (mut executor, _device) = executor_with(ExecutorConfig {
        parent_wait: true,
        ..split_config(256)
    })?;
    let opened = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicBool::new(false));

    let pass = ParallelPassInfo::new("Shadows");
    let mut sub = CommandBuffer::sub("shadow-cascade", &pass);
    let (flag, seen) = (opened.clone(), observed.clone());
    sub.enqueue_lambda(move |_| seen.store(flag.load(Ordering::SeqCst), Ordering::SeqCst));
    sub.enqueue_command(draw());

    let mut parent = CommandBuffer::parallel("parent");
    let flag = opened.clone();
    parent.enqueue_lambda(move |_| {
        thread::sleep(Duration::from_millis(40));
        flag.store(true, Ordering::SeqCst);
    });
    parent.insert_parallel_pass(pass, vec![sub.into()]);

    executor.submit([parent.into()], FLUSH);

    assert!(observed.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn frame_end_waits_for_the_submission_in_flight() -> Result<()> {
    let (mut executor, device) = executor_with(split_config(256))?;

    let mut slow = labelled("slow", 1);
    slow.enqueue_lambda(|_| thread::sleep(Duration::from_millis(100)));
    executor.submit([slow.into()], SubmitFlags::SUBMIT_TO_GPU);
    executor.flush(FLUSH | SubmitFlags::END_FRAME);

    let order: Vec<_> = executor
        .telemetry()
        .drain()
        .into_iter()
        .map(|event| match event {
            RhiEvent::Submitted { command_lists, .. } => format!("submitted {command_lists}"),
            RhiEvent::FrameEnded { frame, stats } => {
                format!("frame {frame} with {} draw(s)", stats.draws)
            }
        })
        .collect();
    assert_eq!(
        order,
        vec!["submitted 1", "submitted 0", "frame 0 with 1 draw(s)"]
    );
    assert_eq!(device.frames(), vec![0]);
    Ok(())
}

#[test]
fn parallel_pass_survives_deferred_submission() -> Result<()> {
    let (mut executor, device) = executor_with(ExecutorConfig {
        child_wait: false,
        ..split_config(256)
    })?;

    let pass = ParallelPassInfo::new("Lighting");
    let mut sub = CommandBuffer::sub("lights", &pass);
    sub.enqueue_command(GpuCommand::BeginMarker("sub".to_string()));
    sub.enqueue_command(draw());
    sub.enqueue_command(GpuCommand::EndMarker);

    let mut parent = labelled("prefix", 1);
    parent.insert_parallel_pass(pass, vec![sub.into()]);
    let pending = parent.submit_later();

    let recorder = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        parent.enqueue_command(GpuCommand::BeginMarker("suffix".to_string()));
        parent.enqueue_command(draw());
        parent.enqueue_command(GpuCommand::EndMarker);
        parent.finish_recording();
    });
    executor.submit([pending], FLUSH);
    recorder.join().expect("recording thread panicked");

    assert_eq!(markers(&device), vec!["prefix", "sub", "suffix"]);
    Ok(())
}
