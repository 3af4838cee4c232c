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

// Khora RHI Sandbox
// Records a few frames from several threads and submits them to a recording device.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use khora_core::renderer::{
    ComputePipelineId, GpuCommand, IndexFormat, RenderPipelineId, ResourceState, RhiPipeline,
};
use khora_infra::graphics::recording::RecordingDevice;
use khora_rhi::{
    CommandBuffer, Executor, ExecutorConfig, ParallelPassInfo, PendingCommandBuffer, RhiEvent,
    SubmitFlags,
};

const FRAMES: u64 = 3;
const GBUFFER_WORKERS: u32 = 4;
const DRAWS_PER_WORKER: u32 = 64;

fn record_gbuffer_slice(buffer: &mut CommandBuffer, worker: u32) {
    buffer.begin_scope(format!("GBuffer slice {worker}"));
    buffer.enqueue_command(GpuCommand::SetRenderPipeline(RenderPipelineId(1)));
    for draw in 0..DRAWS_PER_WORKER {
        buffer.enqueue_command(GpuCommand::DrawIndexed {
            indices: 0..36,
            base_vertex: (worker * DRAWS_PER_WORKER + draw) as i32,
            instances: 0..1,
        });
    }
    buffer.end_scope();
    buffer.finish_recording();
}

fn record_frame(
    executor: &mut Executor,
    device: &RecordingDevice,
    frame: u64,
) -> Vec<PendingCommandBuffer> {
    let pass = ParallelPassInfo::new("GBuffer");

    let vertices = device.create_buffer();
    let indices = device.create_buffer();
    let target = device.create_texture();

    let immediate = executor.immediate();
    immediate.begin_scope(format!("Frame {frame}"));
    immediate.enqueue_command(GpuCommand::Transition {
        texture: target,
        from: ResourceState::Undefined,
        to: ResourceState::RenderTarget,
    });
    immediate.end_scope();

    let mut scene = CommandBuffer::parallel("scene");
    scene.enqueue_command(GpuCommand::SetVertexBuffer {
        slot: 0,
        buffer: vertices,
        offset: 0,
    });
    scene.enqueue_command(GpuCommand::SetIndexBuffer {
        buffer: indices,
        offset: 0,
        format: IndexFormat::Uint16,
    });

    let mut subs = Vec::new();
    let mut workers = Vec::new();
    for worker in 0..GBUFFER_WORKERS {
        let mut sub = CommandBuffer::sub(format!("gbuffer-{worker}"), &pass);
        subs.push(sub.submit_later());
        workers.push(thread::spawn(move || record_gbuffer_slice(&mut sub, worker)));
    }
    scene.insert_parallel_pass(pass, subs);

    scene.switch_pipeline(RhiPipeline::AsyncCompute);
    scene.enqueue_command(GpuCommand::SetComputePipeline(ComputePipelineId(2)));
    scene.enqueue_command(GpuCommand::Dispatch { x: 16, y: 16, z: 1 });
    scene.switch_pipeline(RhiPipeline::Graphics);
    scene.enqueue_command(GpuCommand::Transition {
        texture: target,
        from: ResourceState::RenderTarget,
        to: ResourceState::Present,
    });
    scene.finish_recording();

    for worker in workers {
        if worker.join().is_err() {
            log::error!("A recording thread panicked.");
        }
    }

    executor.defer_delete(vertices);
    executor.defer_delete(indices);
    executor.defer_delete(target);

    vec![scene.into()]
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ExecutorConfig::load(&path)
            .with_context(|| format!("loading executor config from '{path}'"))?,
        None => ExecutorConfig::default(),
    };
    log::info!("Sandbox config:\n{}", config.to_ron_string()?);

    let device = RecordingDevice::new();
    let mut executor = Executor::new(Arc::new(device.clone()), config)?;

    for frame in 0..FRAMES {
        let buffers = record_frame(&mut executor, &device, frame);
        executor.submit(
            buffers,
            SubmitFlags::SUBMIT_TO_GPU | SubmitFlags::DELETE_RESOURCES | SubmitFlags::END_FRAME,
        );
    }
    executor
        .flush(SubmitFlags::SUBMIT_TO_GPU | SubmitFlags::FLUSH_AND_WAIT)
        .wait();

    for event in executor.telemetry().drain() {
        match event {
            RhiEvent::Submitted {
                command_lists,
                translate_jobs,
            } => log::info!("Submitted {command_lists} list(s) from {translate_jobs} job(s)."),
            RhiEvent::FrameEnded { frame, stats } => log::info!(
                "Frame {frame}: {} draws, {} primitives, {} dispatches.",
                stats.draws,
                stats.primitives,
                stats.dispatches
            ),
        }
    }

    log::info!(
        "{} command(s) reached the device across {} frame(s); {} resource(s) deleted.",
        device.submitted_commands().len(),
        executor.frame_number(),
        device.deleted().len()
    );
    Ok(())
}
