//! Host detection and the backend preference order
//!
//! Decides once per process which GPU backends are worth probing on this
//! host. The resulting [`PreferenceOrder`] is immutable and always ends
//! in CPU.

use std::path::Path;

use crate::backend::Backend;

/// Ordered backends to try, most preferred first
///
/// Invariant: CPU is present exactly once and is the last element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceOrder {
    backends: Vec<Backend>,
}

impl PreferenceOrder {
    /// Build an order from candidates, removing duplicates and moving CPU last
    #[must_use]
    pub fn new(candidates: impl IntoIterator<Item = Backend>) -> Self {
        let mut backends: Vec<Backend> = Vec::new();
        for backend in candidates {
            if !backend.is_cpu() && !backends.contains(&backend) {
                backends.push(backend);
            }
        }
        backends.push(Backend::Cpu);
        Self { backends }
    }

    /// Order containing only CPU
    #[must_use]
    pub fn cpu_only() -> Self {
        Self::new([])
    }

    /// Backends in preference order
    #[must_use]
    pub fn as_slice(&self) -> &[Backend] {
        &self.backends
    }

    /// Iterate in preference order
    pub fn iter(&self) -> impl Iterator<Item = Backend> + '_ {
        self.backends.iter().copied()
    }

    /// Backends other than `excluded`, preserving relative order
    pub fn without(&self, excluded: Backend) -> impl Iterator<Item = Backend> + '_ {
        self.iter().filter(move |backend| *backend != excluded)
    }

    /// Check membership
    #[must_use]
    pub fn contains(&self, backend: Backend) -> bool {
        self.backends.contains(&backend)
    }

    /// Number of backends, CPU included
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false; CPU is always present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Check if any GPU backend is listed
    #[must_use]
    pub fn has_gpu(&self) -> bool {
        self.backends.iter().any(Backend::is_gpu)
    }
}

impl std::fmt::Display for PreferenceOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(Backend::name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// How the preference order was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Queried the host
    Host,
    /// Caller supplied the order
    Forced,
    /// Simulated for testing
    Simulated,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Forced => write!(f, "forced"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// Result of host detection
#[derive(Debug, Clone)]
pub struct HostDetection {
    /// Backends to try, CPU last
    pub order: PreferenceOrder,
    /// How the order was produced
    pub method: DetectionMethod,
}

impl HostDetection {
    /// Human-readable one-liner
    #[must_use]
    pub fn summary(&self) -> String {
        format!("Preference order {} ({})", self.order, self.method)
    }
}

/// Host detection options
#[derive(Debug, Clone)]
pub struct DetectionOptions {
    /// Consider Metal when the host has it
    pub allow_metal: bool,
    /// Consider CUDA when the host has it
    pub allow_cuda: bool,
    /// Skip host queries and use this order (CPU still forced last)
    pub forced_order: Option<Vec<Backend>>,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            allow_metal: true,
            allow_cuda: true,
            forced_order: None,
        }
    }
}

impl DetectionOptions {
    /// Options for inference workloads: every detected GPU is a candidate
    #[must_use]
    pub fn for_inference() -> Self {
        Self::default()
    }

    /// Never consider a GPU
    #[must_use]
    pub fn cpu_only() -> Self {
        Self {
            allow_metal: false,
            allow_cuda: false,
            forced_order: None,
        }
    }

    /// Use a fixed order instead of querying the host
    #[must_use]
    pub fn with_forced_order(mut self, order: Vec<Backend>) -> Self {
        self.forced_order = Some(order);
        self
    }

    /// Disable Metal
    #[must_use]
    pub fn without_metal(mut self) -> Self {
        self.allow_metal = false;
        self
    }

    /// Disable CUDA
    #[must_use]
    pub fn without_cuda(mut self) -> Self {
        self.allow_cuda = false;
        self
    }

    fn allows(&self, backend: Backend) -> bool {
        match backend {
            Backend::Metal => self.allow_metal,
            Backend::Cuda => self.allow_cuda,
            Backend::Cpu => true,
        }
    }
}

/// Detect the preference order for this host
pub fn detect_preference_order(options: &DetectionOptions) -> HostDetection {
    if let Some(forced) = &options.forced_order {
        let order = PreferenceOrder::new(forced.iter().copied().filter(|b| options.allows(*b)));
        tracing::info!(%order, "using forced backend order");
        return HostDetection {
            order,
            method: DetectionMethod::Forced,
        };
    }

    let mut candidates = Vec::new();
    if options.allow_metal && metal_present() {
        tracing::info!("Metal (Apple Silicon GPU) detected");
        candidates.push(Backend::Metal);
    }
    if options.allow_cuda && cuda_present() {
        tracing::info!("CUDA (NVIDIA GPU) detected");
        candidates.push(Backend::Cuda);
    }

    HostDetection {
        order: PreferenceOrder::new(candidates),
        method: DetectionMethod::Host,
    }
}

/// Build a detection result for a simulated host
#[must_use]
pub fn detect_simulated(host: &SimulatedHost) -> HostDetection {
    let mut candidates = Vec::new();
    if host.metal {
        candidates.push(Backend::Metal);
    }
    if host.cuda {
        candidates.push(Backend::Cuda);
    }
    HostDetection {
        order: PreferenceOrder::new(candidates),
        method: DetectionMethod::Simulated,
    }
}

/// Simulated host hardware for tests and dry runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedHost {
    /// Host exposes a Metal GPU
    pub metal: bool,
    /// Host exposes a CUDA GPU
    pub cuda: bool,
}

impl SimulatedHost {
    /// Apple Silicon laptop
    #[must_use]
    pub fn apple_silicon() -> Self {
        Self {
            metal: true,
            cuda: false,
        }
    }

    /// Desktop with an NVIDIA card
    #[must_use]
    pub fn nvidia_desktop() -> Self {
        Self {
            metal: false,
            cuda: true,
        }
    }

    /// Host with no usable GPU
    #[must_use]
    pub fn cpu_only() -> Self {
        Self::default()
    }
}

fn metal_present() -> bool {
    cfg!(all(target_os = "macos", target_arch = "aarch64"))
}

fn cuda_present() -> bool {
    if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
        let visible = visible.trim();
        if visible.is_empty() || visible == "-1" {
            return false;
        }
    }

    if cfg!(target_os = "linux") {
        Path::new("/proc/driver/nvidia/version").exists() || Path::new("/dev/nvidiactl").exists()
    } else if cfg!(target_os = "windows") {
        std::env::var_os("SystemRoot")
            .map(|root| Path::new(&root).join("System32").join("nvcuda.dll").exists())
            .unwrap_or(false)
    } else {
        false
    }
}
