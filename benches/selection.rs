//! Selection Hot Path Benchmark
//!
//! Measures the per-call cost of the operations workers run around every
//! unit of work.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench selection
//! ```

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use whisper_fallback::backend::{Backend, OperationKind};
use whisper_fallback::classifier::categorize_text;
use whisper_fallback::device::{
    CapabilityProbe, CapabilityTable, CpuReferenceExecutor, ModelProbeShape, PreferenceOrder,
    ScriptedExecutor, SimulatedHost,
};
use whisper_fallback::engine::{EngineConfig, EngineHandle};
use whisper_fallback::settings::WorkloadSize;

fn engine() -> EngineHandle {
    EngineHandle::simulated(
        EngineConfig::quick(),
        &SimulatedHost {
            metal: true,
            cuda: true,
        },
        Arc::new(ScriptedExecutor::all_pass()),
    )
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    let fresh = engine();
    group.bench_function("no_history", |b| {
        b.iter(|| fresh.select(black_box(OperationKind::Transcription), None));
    });

    let healthy = engine();
    for _ in 0..10 {
        healthy.report_success(Backend::Metal, OperationKind::Transcription);
    }
    group.bench_function("healthy_history", |b| {
        b.iter(|| {
            healthy.select(
                black_box(OperationKind::Transcription),
                Some(WorkloadSize::Base),
            )
        });
    });

    let degraded = engine();
    degraded.report_failure(
        "SparseMPS backend",
        OperationKind::Transcription,
        Backend::Metal,
    );
    degraded.report_failure(
        "SparseMPS backend",
        OperationKind::Transcription,
        Backend::Cuda,
    );
    group.bench_function("terminal_fallback", |b| {
        b.iter(|| degraded.select(black_box(OperationKind::Transcription), None));
    });

    group.finish();
}

fn bench_report(c: &mut Criterion) {
    let mut group = c.benchmark_group("report");
    let engine = engine();

    group.bench_function("success", |b| {
        b.iter(|| engine.report_success(black_box(Backend::Cuda), OperationKind::ModelLoading));
    });

    group.bench_function("failure_unknown", |b| {
        b.iter(|| {
            engine.report_failure(
                black_box("device lost"),
                OperationKind::ModelLoading,
                Backend::Cuda,
            )
        });
    });

    group.finish();
}

fn bench_categorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("categorize");
    let samples = [
        ("sparse", "Could not run 'aten::empty.memory_format' with arguments from the 'SparseMPS' backend"),
        ("oom", "RuntimeError: MPS backend out of memory (MPS allocated: 17.00 GB)"),
        ("unknown", "RuntimeError: expected scalar type Float but found Half"),
    ];
    for (name, text) in samples {
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            b.iter(|| categorize_text(black_box(text)));
        });
    }
    group.finish();
}

fn bench_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("probe");
    group.sample_size(10);

    let order = PreferenceOrder::cpu_only();
    for (name, shape) in [
        ("reduced", ModelProbeShape::reduced()),
        ("whisper_encoder", ModelProbeShape::whisper_encoder()),
    ] {
        let probe = CapabilityProbe::new(Arc::new(CpuReferenceExecutor)).with_model_shape(shape);
        group.bench_function(name, |b| {
            b.iter(|| {
                let table = CapabilityTable::new();
                probe.probe_all(&order, &table);
                table
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_select, bench_report, bench_categorize, bench_probe);
criterion_main!(benches);
