//! Execution context shared by the connectivity generation and the integration loop.
use serde::{Deserialize, Serialize};

/// The numeric precision used to store weights, biases and rates.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Values are kept at single (f32) resolution.
    Single,
    /// Values are kept at double (f64) resolution.
    #[default]
    Double,
}

impl Precision {
    /// Round a value to the resolution of the precision.
    pub fn quantize(self, value: f64) -> f64 {
        match self {
            Precision::Single => value as f32 as f64,
            Precision::Double => value,
        }
    }

    /// Round every value of a slice in place.
    pub fn quantize_slice(self, values: &mut [f64]) {
        if let Precision::Single = self {
            values.iter_mut().for_each(|v| *v = *v as f32 as f64);
        }
    }

    /// The NumPy type descriptor (little endian float) matching the precision.
    pub fn npy_descr(self) -> &'static str {
        match self {
            Precision::Single => "<f4",
            Precision::Double => "<f8",
        }
    }
}

/// The compute backend for the per-step linear algebra.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Everything runs on the calling thread.
    #[default]
    Serial,
    /// Neuron-wise work inside a step is split over the rayon thread pool.
    Parallel,
}

/// Precision and backend threaded through every operation of a simulation.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub precision: Precision,
    pub backend: Backend,
}

impl ExecutionContext {
    pub fn new(precision: Precision, backend: Backend) -> Self {
        ExecutionContext { precision, backend }
    }

    /// Whether neuron-wise work on `num_neurons` neurons should be parallelized.
    pub fn use_parallel(&self, num_neurons: usize) -> bool {
        matches!(self.backend, Backend::Parallel) && num_neurons >= crate::core::MIN_PARALLEL_NEURONS
    }
}
