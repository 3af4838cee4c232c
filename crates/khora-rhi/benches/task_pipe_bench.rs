use criterion::{criterion_group, criterion_main, Criterion};
use khora_core::renderer::{GpuCommand, RhiPipeline};
use khora_infra::graphics::recording::RecordingDevice;
use khora_rhi::{
    CommandBuffer, Executor, ExecutorConfig, Scheduler, SubmitFlags, TaskPipe, WorkerCategory,
};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn bench_task_pipe(c: &mut Criterion) {
    let scheduler = Scheduler::new(4).expect("scheduler");
    let mut group = c.benchmark_group("Task Pipe");

    group.bench_function("1000 chained tasks (AnyWorker)", |b| {
        let pipe = TaskPipe::new("bench", scheduler.clone());
        b.iter(|| {
            let sum = Arc::new(AtomicU64::new(0));
            for i in 0..1000u64 {
                let sum = sum.clone();
                pipe.enqueue(WorkerCategory::AnyWorker, Vec::new(), move || {
                    sum.fetch_add(black_box(i), Ordering::Relaxed);
                });
            }
            if let Some(done) = pipe.close() {
                scheduler.wait(&done);
            }
            black_box(sum.load(Ordering::Relaxed));
        });
    });

    group.bench_function("1000 tasks alternating categories", |b| {
        let pipe = TaskPipe::new("bench-switch", scheduler.clone());
        b.iter(|| {
            for i in 0..1000u64 {
                let category = if i % 2 == 0 {
                    WorkerCategory::AnyWorker
                } else {
                    WorkerCategory::Submission
                };
                pipe.enqueue(category, Vec::new(), move || {
                    black_box(i);
                });
            }
            if let Some(done) = pipe.close() {
                scheduler.wait(&done);
            }
        });
    });

    group.finish();
}

fn bench_submission(c: &mut Criterion) {
    let device = RecordingDevice::new();
    let mut executor =
        Executor::new(Arc::new(device.clone()), ExecutorConfig::default()).expect("executor");

    let mut group = c.benchmark_group("Executor");

    group.bench_function("16 buffers x 256 draws", |b| {
        b.iter(|| {
            let buffers: Vec<_> = (0..16)
                .map(|index| {
                    let mut buffer = CommandBuffer::parallel(format!("bench-{index}"));
                    buffer.switch_pipeline(RhiPipeline::Graphics);
                    for _ in 0..256 {
                        buffer.enqueue_command(GpuCommand::Draw {
                            vertices: 0..3,
                            instances: 0..1,
                        });
                    }
                    buffer.into()
                })
                .collect();
            executor
                .submit(buffers, SubmitFlags::SUBMIT_TO_GPU | SubmitFlags::FLUSH_AND_WAIT)
                .wait();
            black_box(device.take_submissions());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_task_pipe, bench_submission);
criterion_main!(benches);
