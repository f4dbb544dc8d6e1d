//! Inversion of the speckle contrast model.
//!
//! For exposure `T` and correlation time `τ`, with `x = T/τ`, the ideal
//! squared contrast is
//!
//! ```text
//! f(x) = (e^(−2x) − 1 + 2x) / (2x²)
//! ```
//!
//! which falls monotonically from 1 at `x → 0` to 0 at `x → ∞`. There is no
//! closed-form inverse, so [`CorrelationSolver`] precomputes a table of
//! solutions and refines a table seed with one Newton step per query.

use std::time::Instant;

use super::{ComputeError, ConfigError};

/// Relative residual a table entry must reach.
const TABLE_PRECISION: f64 = 1e-6;

/// Newton iteration budget per table entry.
const MAX_ITERATIONS: usize = 100;

/// Below this normalised contrast the asymptotic form is accurate enough.
const ASYMPTOTIC_THRESHOLD: f64 = 0.05;

/// Ideal squared contrast for normalised exposure `x`.
#[inline]
pub fn squared_contrast_model(x: f64) -> f64 {
    ((-2.0 * x).exp_m1() + 2.0 * x) / (2.0 * x * x)
}

/// Derivative of [`squared_contrast_model`].
///
/// `exp_m1` keeps the numerator accurate when `x ≈ 0`.
#[inline]
pub fn squared_contrast_model_deriv(x: f64) -> f64 {
    -(((-2.0 * x).exp() + 1.0) * x + (-2.0 * x).exp_m1()) / (x * x * x)
}

#[inline]
fn newton_step(k_squared: f64, x: f64) -> f64 {
    x - (squared_contrast_model(x) - k_squared) / squared_contrast_model_deriv(x)
}

/// Maps squared contrast to normalised correlation time.
///
/// The table is built once and never mutated, so a solver can be shared
/// between threads (e.g. behind an `Arc`).
#[derive(Debug, Clone)]
pub struct CorrelationSolver {
    beta: f64,
    /// Spacing of the table in `k²`.
    step: f64,
    table: Vec<f64>,
}

impl CorrelationSolver {
    /// Builds the lookup table.
    ///
    /// Fails with [`ComputeError::Convergence`] if any entry does not
    /// converge; the solver cannot be used in that case.
    pub fn new(table_size: usize, beta: f64) -> Result<Self, ComputeError> {
        if table_size < 2 {
            return Err(ConfigError::InvalidTableSize(table_size).into());
        }
        if !beta.is_finite() || beta <= 0.0 {
            return Err(ConfigError::InvalidBaseline(beta).into());
        }

        let started = Instant::now();
        let step = 1.0 / (table_size - 1) as f64;
        let mut table = Vec::with_capacity(table_size);
        // k² → 0 is the x → ∞ asymptote; the slot is never read.
        table.push(0.0);

        let last = table_size - 1;
        for index in 1..last {
            let k_squared = step * index as f64;
            let mut x = 1.0 / k_squared;
            let mut rel_error = f64::INFINITY;
            for _ in 0..MAX_ITERATIONS {
                x = newton_step(k_squared, x);
                let expected = squared_contrast_model(x);
                rel_error = (expected - k_squared).abs() / expected;
                if !rel_error.is_finite() || rel_error <= TABLE_PRECISION {
                    break;
                }
            }
            // f is close to 1 on both sides of 0, so a negative root can
            // pass the residual check.
            if !rel_error.is_finite() || rel_error > TABLE_PRECISION || x <= 0.0 {
                tracing::error!(index, k_squared, rel_error, x, "Correlation table entry diverged");
                return Err(ComputeError::Convergence { index, k_squared });
            }
            table.push(x);
        }
        // k² = 1 is the x → 0 limit.
        table.push(0.0);

        tracing::info!(
            table_size,
            beta,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "Correlation table built"
        );

        Ok(Self { beta, step, table })
    }

    /// Returns the calibration factor β.
    #[inline]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Returns the number of table entries.
    #[inline]
    pub fn table_size(&self) -> usize {
        self.table.len()
    }

    /// Returns the normalised correlation time for a measured `K²`.
    ///
    /// - Low contrast uses the asymptote `1/s − 0.5` (`+∞` at `s = 0`).
    /// - `s ≥ 1` has no physical solution and returns 0.
    /// - Otherwise the nearest table entry is refined by one Newton step,
    ///   except within half a step of 1, where a series inverse is used.
    ///
    /// The result is never negative.
    #[inline]
    pub fn compute(&self, squared_contrast: f64) -> f64 {
        let s = squared_contrast / self.beta;
        let x = if s < self.step || s < ASYMPTOTIC_THRESHOLD {
            1.0 / s - 0.5
        } else if s >= 1.0 {
            0.0
        } else {
            let index = (s / self.step).round() as usize;
            if index + 1 == self.table.len() {
                // f is 0/0 at the last slot; invert f(x) ≈ 1 − 2x/3 + x²/3.
                let d = 1.0 - s;
                1.5 * d + 1.125 * d * d
            } else {
                newton_step(s, self.table[index])
            }
        };
        if x > 0.0 {
            x
        } else {
            0.0
        }
    }
}
