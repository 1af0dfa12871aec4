//! Capability probing with synthetic workloads
//!
//! Two independent checks run per backend at startup:
//!
//! - **basic**: elementwise addition and a reduction over small matrices
//! - **model**: a conv1d over a mel-spectrogram shaped input followed by a
//!   linear projection, matching the Whisper encoder stem
//!
//! The engine never computes on GPUs itself. Whoever owns the real compute
//! runtime implements [`BackendExecutor`]; [`CpuReferenceExecutor`] covers
//! the CPU so the engine always has a working baseline.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::capabilities::{CapabilityKey, CapabilityRecord, CapabilityTable, DEFAULT_ERROR_LIMIT};
use super::detect::PreferenceOrder;
use super::error::{ProbeFault, ProbeResult};
use crate::backend::{Backend, CapabilityClass};

/// Side length of the square matrices used by the basic check
pub const BASIC_PROBE_DIM: usize = 10;

/// Which synthetic check to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Elementwise arithmetic
    Basic,
    /// Model-shaped conv + projection
    Model,
}

impl ProbeKind {
    /// Check that decides a capability class
    #[must_use]
    pub const fn for_class(class: CapabilityClass) -> Self {
        if class.is_model_shaped() {
            Self::Model
        } else {
            Self::Basic
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Tensor dimensions of the model-shaped check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProbeShape {
    /// Input channels (mel bins)
    pub channels: usize,
    /// Input frames
    pub frames: usize,
    /// Conv output channels
    pub conv_out: usize,
    /// Conv kernel width
    pub kernel: usize,
    /// Projection output width
    pub proj_out: usize,
}

impl Default for ModelProbeShape {
    fn default() -> Self {
        Self::whisper_encoder()
    }
}

impl ModelProbeShape {
    /// Production dimensions: 80 mel bins x 3000 frames, 512-wide conv, 256-wide projection
    #[must_use]
    pub const fn whisper_encoder() -> Self {
        Self {
            channels: 80,
            frames: 3000,
            conv_out: 512,
            kernel: 3,
            proj_out: 256,
        }
    }

    /// Same graph with small dimensions, for quick probes and tests
    #[must_use]
    pub const fn reduced() -> Self {
        Self {
            channels: 8,
            frames: 64,
            conv_out: 16,
            kernel: 3,
            proj_out: 8,
        }
    }

    /// Frames left after an unpadded convolution
    #[must_use]
    pub const fn conv_frames(&self) -> usize {
        self.frames.saturating_sub(self.kernel.saturating_sub(1))
    }

    /// Multiply-accumulate count of the whole check
    #[must_use]
    pub fn estimated_macs(&self) -> u64 {
        let conv = self.conv_out * self.channels * self.kernel * self.conv_frames();
        let proj = self.conv_frames() * self.conv_out * self.proj_out;
        (conv + proj) as u64
    }
}

/// A synthetic workload handed to an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeWorkload {
    /// Add two `dim x dim` matrices and sum the result
    Basic {
        /// Matrix side length
        dim: usize,
    },
    /// Conv1d + linear projection
    Model(ModelProbeShape),
}

impl ProbeWorkload {
    /// Workload for a probe kind
    #[must_use]
    pub fn for_kind(kind: ProbeKind, shape: ModelProbeShape) -> Self {
        match kind {
            ProbeKind::Basic => Self::Basic {
                dim: BASIC_PROBE_DIM,
            },
            ProbeKind::Model => Self::Model(shape),
        }
    }

    /// Probe kind of this workload
    #[must_use]
    pub fn kind(&self) -> ProbeKind {
        match self {
            Self::Basic { .. } => ProbeKind::Basic,
            Self::Model(_) => ProbeKind::Model,
        }
    }
}

/// Result of a successful synthetic run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutput {
    /// Sum over the final tensor
    pub checksum: f32,
}

/// Runs synthetic workloads on real backends
///
/// Implementations must be callable from any thread. Panics are caught
/// by the probe and recorded as faults.
pub trait BackendExecutor: Send + Sync {
    /// Run `workload` on `backend`
    fn execute(&self, backend: Backend, workload: &ProbeWorkload) -> ProbeResult<ProbeOutput>;
}

/// Pure-Rust executor for the CPU backend
///
/// Reports [`ProbeFault::NoRuntime`] for every GPU backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuReferenceExecutor;

impl BackendExecutor for CpuReferenceExecutor {
    fn execute(&self, backend: Backend, workload: &ProbeWorkload) -> ProbeResult<ProbeOutput> {
        if !backend.is_cpu() {
            return Err(ProbeFault::NoRuntime(backend));
        }
        match workload {
            ProbeWorkload::Basic { dim } => basic_check(*dim),
            ProbeWorkload::Model(shape) => model_check(shape),
        }
    }
}

/// Scripted outcome for one (backend, kind) pair
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutcome {
    /// Succeed with a zero checksum
    Pass,
    /// Fail with this backend error text
    Fail(String),
    /// Panic with this message
    Panic(String),
}

/// Executor with scripted outcomes, for simulations and tests
///
/// Unscripted pairs pass.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    outcomes: HashMap<(Backend, ProbeKind), ScriptedOutcome>,
}

impl ScriptedExecutor {
    /// Executor where every check passes
    #[must_use]
    pub fn all_pass() -> Self {
        Self::default()
    }

    /// Script a failure
    #[must_use]
    pub fn fail(mut self, backend: Backend, kind: ProbeKind, message: impl Into<String>) -> Self {
        self.outcomes
            .insert((backend, kind), ScriptedOutcome::Fail(message.into()));
        self
    }

    /// Script a failure for both checks
    #[must_use]
    pub fn fail_all(self, backend: Backend, message: impl Into<String>) -> Self {
        let message = message.into();
        self.fail(backend, ProbeKind::Basic, message.clone())
            .fail(backend, ProbeKind::Model, message)
    }

    /// Script a panic
    #[must_use]
    pub fn panic(mut self, backend: Backend, kind: ProbeKind, message: impl Into<String>) -> Self {
        self.outcomes
            .insert((backend, kind), ScriptedOutcome::Panic(message.into()));
        self
    }
}

impl BackendExecutor for ScriptedExecutor {
    fn execute(&self, backend: Backend, workload: &ProbeWorkload) -> ProbeResult<ProbeOutput> {
        match self.outcomes.get(&(backend, workload.kind())) {
            None | Some(ScriptedOutcome::Pass) => Ok(ProbeOutput { checksum: 0.0 }),
            Some(ScriptedOutcome::Fail(message)) => Err(ProbeFault::execution(message.clone())),
            Some(ScriptedOutcome::Panic(message)) => panic!("{message}"),
        }
    }
}

/// Runs synthetic checks and turns their outcomes into capability records
#[derive(Clone)]
pub struct CapabilityProbe {
    executor: Arc<dyn BackendExecutor>,
    model_shape: ModelProbeShape,
    error_limit: usize,
}

impl std::fmt::Debug for CapabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProbe")
            .field("model_shape", &self.model_shape)
            .field("error_limit", &self.error_limit)
            .finish_non_exhaustive()
    }
}

impl CapabilityProbe {
    /// Create a probe over `executor`
    #[must_use]
    pub fn new(executor: Arc<dyn BackendExecutor>) -> Self {
        Self {
            executor,
            model_shape: ModelProbeShape::default(),
            error_limit: DEFAULT_ERROR_LIMIT,
        }
    }

    /// Set the model-shaped check's dimensions
    #[must_use]
    pub fn with_model_shape(mut self, shape: ModelProbeShape) -> Self {
        self.model_shape = shape;
        self
    }

    /// Set the stored error bound
    #[must_use]
    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }

    /// Probe one backend for one capability class
    pub fn probe(&self, backend: Backend, class: CapabilityClass) -> CapabilityRecord {
        self.run_check(backend, ProbeKind::for_class(class))
    }

    /// Run one check. Never panics, whatever the executor does.
    pub fn run_check(&self, backend: Backend, kind: ProbeKind) -> CapabilityRecord {
        let workload = ProbeWorkload::for_kind(kind, self.model_shape);
        let executor = &self.executor;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(backend, &workload)))
            .unwrap_or_else(|payload| Err(ProbeFault::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(_) => {
                tracing::info!(%backend, check = %kind, "probe passed");
                CapabilityRecord::passed(backend)
            }
            Err(fault) => {
                let record = CapabilityRecord::failed(backend, &fault.to_string(), self.error_limit);
                tracing::warn!(
                    %backend,
                    check = %kind,
                    error = record.last_error.as_deref().unwrap_or_default(),
                    "probe failed"
                );
                record
            }
        }
    }

    /// Probe every backend in `order` and fill `table`
    ///
    /// Each backend gets one basic and one model check; the model result is
    /// stored under every model-shaped class.
    pub fn probe_all(&self, order: &PreferenceOrder, table: &CapabilityTable) {
        for backend in order.iter() {
            tracing::info!(%backend, "testing capabilities");
            let basic = self.run_check(backend, ProbeKind::Basic);
            let model = self.run_check(backend, ProbeKind::Model);
            tracing::info!(
                %backend,
                basic = basic.available,
                model = model.available,
                "capabilities cached"
            );

            for class in CapabilityClass::ALL {
                let record = if class.is_model_shaped() {
                    model.clone()
                } else {
                    basic.clone()
                };
                table.insert(CapabilityKey::new(backend, class), record);
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Deterministic fill in [-1, 1]
fn synthetic(len: usize, phase: f32) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.37 + phase).sin()).collect()
}

fn ensure_finite(value: f32, stage: &'static str) -> ProbeResult<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProbeFault::NonFinite { stage })
    }
}

fn basic_check(dim: usize) -> ProbeResult<ProbeOutput> {
    let x = synthetic(dim * dim, 0.0);
    let y = synthetic(dim * dim, 1.3);
    let sum: f32 = x.iter().zip(&y).map(|(a, b)| a + b).sum();
    Ok(ProbeOutput {
        checksum: ensure_finite(sum, "elementwise add")?,
    })
}

fn model_check(shape: &ModelProbeShape) -> ProbeResult<ProbeOutput> {
    let input = synthetic(shape.channels * shape.frames, 0.0);
    let conv_weight = synthetic(shape.conv_out * shape.channels * shape.kernel, 0.7);
    let conv = conv1d(&input, shape, &conv_weight);

    let proj_weight = synthetic(shape.proj_out * shape.conv_out, 2.1);
    let projected = linear(&conv, shape.conv_frames(), shape.conv_out, &proj_weight, shape.proj_out)?;

    let checksum: f32 = projected.iter().sum();
    Ok(ProbeOutput {
        checksum: ensure_finite(checksum, "linear projection")?,
    })
}

/// Unpadded conv1d. Input `[channels, frames]`, weight `[out, channels, kernel]`,
/// output transposed to `[frames', out]` ready for the projection.
fn conv1d(input: &[f32], shape: &ModelProbeShape, weight: &[f32]) -> Vec<f32> {
    let out_frames = shape.conv_frames();
    let mut output = vec![0.0_f32; out_frames * shape.conv_out];

    for oc in 0..shape.conv_out {
        for ic in 0..shape.channels {
            let w = &weight[(oc * shape.channels + ic) * shape.kernel..][..shape.kernel];
            let row = &input[ic * shape.frames..][..shape.frames];
            for t in 0..out_frames {
                let acc: f32 = w.iter().zip(&row[t..]).map(|(a, b)| a * b).sum();
                output[t * shape.conv_out + oc] += acc;
            }
        }
    }
    output
}

/// `input [rows, in_dim] x weight^T`, weight `[out_dim, in_dim]`
fn linear(
    input: &[f32],
    rows: usize,
    in_dim: usize,
    weight: &[f32],
    out_dim: usize,
) -> ProbeResult<Vec<f32>> {
    if out_dim == 0 || weight.len() != out_dim * in_dim {
        return Err(ProbeFault::ShapeMismatch {
            expected: in_dim,
            actual: weight.len().checked_div(out_dim).unwrap_or(0),
        });
    }

    let mut output = Vec::with_capacity(rows * out_dim);
    for r in 0..rows {
        let x = &input[r * in_dim..][..in_dim];
        for o in 0..out_dim {
            let w = &weight[o * in_dim..][..in_dim];
            output.push(x.iter().zip(w).map(|(a, b)| a * b).sum());
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduced_probe(executor: impl BackendExecutor + 'static) -> CapabilityProbe {
        CapabilityProbe::new(Arc::new(executor)).with_model_shape(ModelProbeShape::reduced())
    }

    // =========================================================================
    // Shapes and workloads
    // =========================================================================

    #[test]
    fn test_whisper_encoder_shape() {
        let shape = ModelProbeShape::whisper_encoder();
        assert_eq!(shape.channels, 80);
        assert_eq!(shape.frames, 3000);
        assert_eq!(shape.conv_frames(), 2998);
        assert!(shape.estimated_macs() > 700_000_000);
    }

    #[test]
    fn test_probe_kind_for_class() {
        assert_eq!(ProbeKind::for_class(CapabilityClass::Basic), ProbeKind::Basic);
        assert_eq!(
            ProbeKind::for_class(CapabilityClass::Transcription),
            ProbeKind::Model
        );
        assert_eq!(
            ProbeKind::for_class(CapabilityClass::ModelLoading),
            ProbeKind::Model
        );
    }

    #[test]
    fn test_workload_kind() {
        let shape = ModelProbeShape::reduced();
        assert_eq!(
            ProbeWorkload::for_kind(ProbeKind::Basic, shape),
            ProbeWorkload::Basic { dim: 10 }
        );
        assert_eq!(
            ProbeWorkload::for_kind(ProbeKind::Model, shape).kind(),
            ProbeKind::Model
        );
    }

    // =========================================================================
    // CPU reference math
    // =========================================================================

    #[test]
    fn test_cpu_reference_basic() {
        let output = CpuReferenceExecutor
            .execute(Backend::Cpu, &ProbeWorkload::Basic { dim: 10 })
            .expect("cpu basic check");
        assert!(output.checksum.is_finite());
    }

    #[test]
    fn test_cpu_reference_model_reduced() {
        let output = CpuReferenceExecutor
            .execute(Backend::Cpu, &ProbeWorkload::Model(ModelProbeShape::reduced()))
            .expect("cpu model check");
        assert!(output.checksum.is_finite());
    }

    #[test]
    fn test_cpu_reference_rejects_gpu() {
        let err = CpuReferenceExecutor
            .execute(Backend::Metal, &ProbeWorkload::Basic { dim: 10 })
            .expect_err("no metal runtime");
        assert_eq!(err, ProbeFault::NoRuntime(Backend::Metal));
    }

    #[test]
    fn test_conv1d_known_values() {
        let shape = ModelProbeShape {
            channels: 1,
            frames: 4,
            conv_out: 1,
            kernel: 2,
            proj_out: 1,
        };
        let out = conv1d(&[1.0, 2.0, 3.0, 4.0], &shape, &[1.0, 1.0]);
        assert_eq!(out, vec![3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_linear_known_values() {
        // [[1, 2]] x [[1, 0], [0, 1], [1, 1]]^T
        let out = linear(&[1.0, 2.0], 1, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0], 3)
            .expect("shapes line up");
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_linear_shape_mismatch() {
        let err = linear(&[1.0; 512], 1, 512, &[0.0; 256 * 256], 256).expect_err("mismatch");
        assert_eq!(
            err,
            ProbeFault::ShapeMismatch {
                expected: 512,
                actual: 256
            }
        );
    }

    // =========================================================================
    // Probe records
    // =========================================================================

    #[test]
    fn test_probe_success_record() {
        let probe = reduced_probe(CpuReferenceExecutor);
        let record = probe.probe(Backend::Cpu, CapabilityClass::Transcription);
        assert!(record.available);
        assert!(record.tested);
        assert!((record.performance_score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_probe_failure_record() {
        let probe = reduced_probe(CpuReferenceExecutor);
        let record = probe.probe(Backend::Cuda, CapabilityClass::Basic);
        assert!(!record.available);
        assert!(record.tested);
        assert_eq!(record.performance_score, 0.0);
        assert!(record.last_error.expect("error kept").contains("cuda"));
    }

    #[test]
    fn test_probe_truncates_long_errors() {
        let executor =
            ScriptedExecutor::all_pass().fail(Backend::Metal, ProbeKind::Model, "e".repeat(300));
        let record = reduced_probe(executor).probe(Backend::Metal, CapabilityClass::Transcription);
        let error = record.last_error.expect("error kept");
        assert_eq!(error.chars().count(), 103);
        assert!(error.ends_with("..."));
    }

    #[test]
    fn test_probe_catches_panics() {
        let executor =
            ScriptedExecutor::all_pass().panic(Backend::Metal, ProbeKind::Basic, "driver crashed");
        let record = reduced_probe(executor).probe(Backend::Metal, CapabilityClass::Basic);
        assert!(!record.available);
        assert!(record
            .last_error
            .expect("error kept")
            .contains("driver crashed"));
    }

    #[test]
    fn test_probe_all_fills_every_class() {
        let executor = ScriptedExecutor::all_pass().fail(
            Backend::Metal,
            ProbeKind::Model,
            "Could not run 'aten::empty.memory_format' with arguments from the 'SparseMPS' backend",
        );
        let order = PreferenceOrder::new([Backend::Metal]);
        let table = CapabilityTable::new();
        reduced_probe(executor).probe_all(&order, &table);

        assert_eq!(table.len(), 6);
        assert!(table.is_available(CapabilityKey::new(Backend::Metal, CapabilityClass::Basic)));
        assert!(!table.is_available(CapabilityKey::new(
            Backend::Metal,
            CapabilityClass::Transcription
        )));
        assert!(!table.is_available(CapabilityKey::new(
            Backend::Metal,
            CapabilityClass::ModelLoading
        )));
        assert!(table.is_available(CapabilityKey::new(
            Backend::Cpu,
            CapabilityClass::Transcription
        )));
    }

    #[test]
    fn test_scripted_fail_all() {
        let executor = ScriptedExecutor::all_pass().fail_all(Backend::Cuda, "no device");
        let probe = reduced_probe(executor);
        assert!(!probe.run_check(Backend::Cuda, ProbeKind::Basic).available);
        assert!(!probe.run_check(Backend::Cuda, ProbeKind::Model).available);
        assert!(probe.run_check(Backend::Metal, ProbeKind::Model).available);
    }
}
