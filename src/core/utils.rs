//! Utility functions.
use std::f64::consts::PI;

use crate::core::STEP_TOLERANCE;

/// Maximum number of terms in the power series of the modified Bessel function.
const MAX_BESSEL_TERMS: usize = 500;

/// Returns the evenly spaced angles `2π·a/n` for `a = 0, ..., n-1`, i.e., the positions of `n` neurons on a ring.
pub fn ring_angles(n: usize) -> Vec<f64> {
    (0..n).map(|a| 2.0 * PI * a as f64 / n as f64).collect()
}

/// The modified Bessel function of the first kind of order zero.
/// Evaluated with its power series, sum over k of (x/2)^(2k) / (k!)^2, which converges for every real x.
pub fn bessel_i0(x: f64) -> f64 {
    let q = 0.25 * x * x;
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..MAX_BESSEL_TERMS {
        term *= q / (k * k) as f64;
        sum += term;
        if term <= f64::EPSILON * sum {
            break;
        }
    }
    sum
}

/// Number of integration steps covered by a duration, i.e., the truncation of `duration / dt`.
/// A small tolerance absorbs floating point noise so that `1.0 / 0.01` yields 100 steps and not 99.
pub fn num_steps(duration: f64, dt: f64) -> usize {
    (duration / dt + STEP_TOLERANCE).floor().max(0.0) as usize
}

/// Converts an angle in degrees to radians.
pub fn deg_to_rad(angle: f64) -> f64 {
    angle * PI / 180.0
}
