//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opflow::events::NoOpTelemetrySink;
use opflow::prelude::*;

fn build_pipeline(operations: usize, interceptors: bool) -> Pipeline {
    let mut pipeline = Pipeline::new().with_telemetry(Arc::new(NoOpTelemetrySink));
    for i in 0..operations {
        pipeline = pipeline
            .add_operation(Arc::new(NoOpOperation::new(format!("op-{i}"))))
            .expect("valid operation");
    }
    if interceptors {
        pipeline = pipeline
            .add_interceptor(
                Arc::new(NoOpOperation::new("pre")),
                InterceptorStage::PreOperation,
            )
            .expect("valid interceptor")
            .add_interceptor(
                Arc::new(NoOpOperation::new("post")),
                InterceptorStage::PostOperation,
            )
            .expect("valid interceptor")
            .add_custom_interceptor(
                Arc::new(NoOpOperation::new("gated")),
                |ctx: &ExecutionContext| ctx.is_locked(),
                false,
            )
            .expect("valid interceptor");
    }
    pipeline
}

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    let plain = build_pipeline(16, false);
    c.bench_function("execute_16_operations", |b| {
        b.iter(|| runtime.block_on(async { black_box(plain.execute(None).await) }))
    });

    let intercepted = build_pipeline(16, true);
    c.bench_function("execute_16_operations_with_interceptors", |b| {
        b.iter(|| runtime.block_on(async { black_box(intercepted.execute(None).await) }))
    });

    let failing = build_pipeline(16, false)
        .with_options(PipelineOptions::new().with_force_rollback_on_fault(true))
        .add_operation(Arc::new(FnOperation::new("fail", |_| anyhow::bail!("boom"))))
        .expect("valid operation");
    c.bench_function("execute_with_rollback", |b| {
        b.iter(|| runtime.block_on(async { black_box(failing.execute(None).await) }))
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
