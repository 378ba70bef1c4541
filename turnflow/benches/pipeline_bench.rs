//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use turnflow::events::NoOpEventSink;
use turnflow::persistence::{InMemoryPersistence, NoOpPersistence};
use turnflow::pipeline::Orchestrator;
use turnflow::stages::StageDefinition;
use turnflow::testing::{FailingStage, SuccessStage};

fn nine_stages(fail_fifth: bool) -> Vec<StageDefinition> {
    (1..=9)
        .map(|i| {
            let name = format!("stage{i}");
            let stage: Arc<dyn turnflow::stages::Stage> = if fail_fifth && i == 5 {
                Arc::new(FailingStage::declared(name, "injected", true))
            } else {
                Arc::new(SuccessStage::new(name))
            };
            StageDefinition::from_stage(stage).expect("valid stage")
        })
        .collect()
}

fn pipeline_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");

    let noop = Orchestrator::new(
        nine_stages(false),
        Arc::new(NoOpPersistence::new()),
        Arc::new(NoOpEventSink),
    )
    .expect("orchestrator");
    c.bench_function("nine_stages_noop_persistence", |b| {
        b.iter(|| black_box(rt.block_on(noop.process("conv", "user", "web"))));
    });

    let journaled = Orchestrator::new(
        nine_stages(true),
        Arc::new(InMemoryPersistence::new()),
        Arc::new(NoOpEventSink),
    )
    .expect("orchestrator");
    c.bench_function("nine_stages_in_memory_with_failure", |b| {
        b.iter(|| black_box(rt.block_on(journaled.process("conv", "user", "web"))));
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
