//! Transfer functions mapping the net input of a neuron to a non-negative firing rate.
use std::f64::consts::SQRT_2;

use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;

/// A stateless transfer function.
pub trait Activation: Send + Sync {
    /// The firing rate for the given net input.
    fn eval(&self, input: f64) -> f64;

    /// The largest rate the function can produce, if bounded.
    fn max_rate(&self) -> Option<f64> {
        None
    }
}

/// A saturating transfer function shaped as a scaled Gaussian cumulative distribution,
/// `thresh * (1 + erf(input / sqrt(2))) / 2`, with values in [0, thresh].
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ErfActivation {
    pub thresh: f64,
}

impl Activation for ErfActivation {
    fn eval(&self, input: f64) -> f64 {
        0.5 * self.thresh * (1.0 + erf(input / SQRT_2))
    }

    fn max_rate(&self) -> Option<f64> {
        Some(self.thresh)
    }
}

/// A threshold-linear transfer function clipped at `thresh`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ThresholdLinear {
    pub thresh: f64,
}

impl Activation for ThresholdLinear {
    fn eval(&self, input: f64) -> f64 {
        input.clamp(0.0, self.thresh)
    }

    fn max_rate(&self) -> Option<f64> {
        Some(self.thresh)
    }
}

/// The transfer function selected in a configuration file.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferFunction {
    Erf { thresh: f64 },
    ThresholdLinear { thresh: f64 },
}

impl Default for TransferFunction {
    fn default() -> Self {
        TransferFunction::Erf { thresh: 15.0 }
    }
}

impl TransferFunction {
    pub fn thresh(&self) -> f64 {
        match self {
            TransferFunction::Erf { thresh } | TransferFunction::ThresholdLinear { thresh } => *thresh,
        }
    }

    pub fn into_activation(self) -> Box<dyn Activation> {
        match self {
            TransferFunction::Erf { thresh } => Box::new(ErfActivation { thresh }),
            TransferFunction::ThresholdLinear { thresh } => Box::new(ThresholdLinear { thresh }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_erf_activation() {
        let activation = ErfActivation { thresh: 10.0 };
        assert_relative_eq!(activation.eval(0.0), 5.0);
        assert!(activation.eval(-40.0) >= 0.0);
        assert_relative_eq!(activation.eval(-40.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(activation.eval(40.0), 10.0, epsilon = 1e-12);
        assert_relative_eq!(activation.eval(1.0), 8.413447460685429, epsilon = 1e-9);
        assert_eq!(activation.max_rate(), Some(10.0));
    }

    #[test]
    fn test_threshold_linear() {
        let activation = ThresholdLinear { thresh: 2.0 };
        assert_eq!(activation.eval(-1.0), 0.0);
        assert_eq!(activation.eval(1.5), 1.5);
        assert_eq!(activation.eval(3.0), 2.0);
    }

    #[test]
    fn test_transfer_function() {
        let transfer: TransferFunction =
            serde_json::from_str(r#"{"type": "threshold_linear", "thresh": 3.0}"#).unwrap();
        assert_eq!(transfer, TransferFunction::ThresholdLinear { thresh: 3.0 });
        assert_eq!(transfer.thresh(), 3.0);
        assert_eq!(transfer.into_activation().eval(5.0), 3.0);
    }
}
