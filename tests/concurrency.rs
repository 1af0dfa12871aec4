//! Concurrency Tests
//!
//! Many workers selecting and reporting against one shared engine.

use std::sync::Arc;
use std::thread;

use whisper_fallback::backend::{Backend, CapabilityClass, OperationKind};
use whisper_fallback::device::{CapabilityKey, ScriptedExecutor, SimulatedHost};
use whisper_fallback::engine::{EngineConfig, EngineHandle};
use whisper_fallback::history::HistoryTracker;

const WORKERS: usize = 8;
const ROUNDS: usize = 200;

fn shared_engine() -> EngineHandle {
    EngineHandle::simulated(
        EngineConfig::quick(),
        &SimulatedHost {
            metal: true,
            cuda: true,
        },
        Arc::new(ScriptedExecutor::all_pass()),
    )
}

#[test]
fn test_history_windows_stay_bounded_under_contention() {
    let tracker = HistoryTracker::default();
    thread::scope(|s| {
        for worker in 0..WORKERS {
            let tracker = &tracker;
            s.spawn(move || {
                for round in 0..ROUNDS {
                    let success = (worker + round) % 3 != 0;
                    tracker.record(Backend::Metal, OperationKind::Transcription, success);
                    let rate = tracker
                        .recent_success_rate(Backend::Metal, OperationKind::Transcription)
                        .expect("history was just recorded");
                    assert!((0.0..=1.0).contains(&rate));
                }
            });
        }
    });

    assert_eq!(
        tracker.outcomes(Backend::Metal, OperationKind::Transcription).len(),
        10
    );
}

#[test]
fn test_all_successes_counted_per_key() {
    let tracker = HistoryTracker::new(WORKERS * ROUNDS, 5);
    thread::scope(|s| {
        for worker in 0..WORKERS {
            let tracker = &tracker;
            let operation = OperationKind::ALL[worker % OperationKind::ALL.len()];
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    tracker.record_success(Backend::Cuda, operation);
                }
            });
        }
    });

    let total: usize = OperationKind::ALL
        .iter()
        .map(|op| tracker.outcomes(Backend::Cuda, *op).len())
        .sum();
    assert_eq!(total, WORKERS * ROUNDS);
}

#[test]
fn test_revocation_visible_to_all_workers() {
    let engine = shared_engine();
    let op = OperationKind::Transcription;

    engine.report_failure("aten::empty.memory_format", op, Backend::Metal);

    thread::scope(|s| {
        for _ in 0..WORKERS {
            let engine = &engine;
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    let backend = engine.select(op, None).backend;
                    assert_ne!(backend, Backend::Metal);
                    engine.report_success(backend, op);
                }
            });
        }
    });

    assert!(!engine
        .selector()
        .capabilities()
        .is_available(CapabilityKey::new(Backend::Metal, CapabilityClass::Transcription)));
}

#[test]
fn test_concurrent_failures_and_selection() {
    let engine = Arc::new(shared_engine());

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let op = OperationKind::ALL[worker % OperationKind::ALL.len()];
                for round in 0..ROUNDS {
                    let backend = engine.select(op, None).backend;
                    assert!(engine.preference_order().contains(backend));
                    if backend.is_gpu() && round % 4 == 0 {
                        let (next, message) = engine.report_failure("SparseMPS backend", op, backend);
                        assert_ne!(next, backend);
                        assert!(!message.is_empty());
                    } else {
                        engine.report_success(backend, op);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }

    // Every GPU eventually failed on every operation kind it was given
    let report = engine.status_report();
    assert!(report.error_statistics["sparse_backend"] > 0);
    for op in OperationKind::ALL {
        assert_eq!(engine.select(op, None).backend, Backend::Cpu);
    }
}
