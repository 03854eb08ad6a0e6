//! Gaussian peak fit.
//!
//! Levenberg-Marquardt least squares for
//! `f(t) = amplitude * exp(-(t - mean)^2 / (2 sigma^2))`.
//! This is the only nonlinear optimisation in the crate and is kept
//! behind [`fit_gaussian`].
#![allow(clippy::cast_precision_loss, clippy::many_single_char_names)]

use nalgebra::{Matrix3, Vector3};
use std::ops::RangeInclusive;
use stripstat_core::error::FitError;
use stripstat_core::histogram::TimeHistogram;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const MAX_ITERATIONS: usize = 200;
const RELATIVE_TOLERANCE: f64 = 1e-10;
const MAX_DAMPING: f64 = 1e12;

/// Result of a Gaussian fit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaussianFit {
    /// Peak height.
    pub amplitude: f64,
    /// Peak position.
    pub mean: f64,
    /// Peak width (always positive).
    pub sigma: f64,
    /// Sum of squared residuals at the minimum.
    pub chi2: f64,
    /// Points minus parameters.
    pub ndf: usize,
    /// Iterations used.
    pub iterations: usize,
}

impl GaussianFit {
    /// Model value at `t`.
    #[must_use]
    pub fn eval(&self, t: f64) -> f64 {
        gaussian(t, &Vector3::new(self.amplitude, self.mean, self.sigma))
    }
}

#[inline]
fn gaussian(t: f64, params: &Vector3<f64>) -> f64 {
    let z = (t - params[1]) / params[2];
    params[0] * (-0.5 * z * z).exp()
}

/// Fits a Gaussian to the bins of `histogram` whose centers lie in `range`,
/// after subtracting a flat `baseline` per bin.
///
/// # Errors
/// Returns a [`FitError`] if fewer than three bins are available or the
/// minimisation fails.
pub fn fit_gaussian(
    histogram: &TimeHistogram,
    range: RangeInclusive<f64>,
    baseline: f64,
) -> Result<GaussianFit, FitError> {
    let points: Vec<(f64, f64)> = histogram
        .iter()
        .filter(|(t, _)| range.contains(t))
        .map(|(t, count)| (t, count as f64 - baseline))
        .collect();
    fit_points(&points)
}

/// Fits a Gaussian to `(t, y)` points.
///
/// # Errors
/// See [`fit_gaussian`].
pub fn fit_points(points: &[(f64, f64)]) -> Result<GaussianFit, FitError> {
    if points.len() < 3 {
        return Err(FitError::TooFewPoints {
            found: points.len(),
            required: 3,
        });
    }

    let mut params = initial_guess(points);
    let mut chi2 = chi_square(points, &params);
    let mut lambda = 1e-3;

    for iteration in 1..=MAX_ITERATIONS {
        let (jtj, jtr) = normal_equations(points, &params);
        let step = damped_step(&jtj, &jtr, lambda).ok_or(FitError::Singular)?;

        let trial = params + step;
        if !trial.iter().all(|p| p.is_finite()) {
            return Err(FitError::Diverged);
        }
        let trial_chi2 = chi_square(points, &trial);

        if trial_chi2 <= chi2 {
            let improvement = chi2 - trial_chi2;
            params = trial;
            chi2 = trial_chi2;
            lambda = (lambda / 10.0).max(1e-12);
            if improvement <= RELATIVE_TOLERANCE * chi2 + f64::EPSILON {
                return finish(points, &params, chi2, iteration);
            }
        } else {
            lambda *= 10.0;
            if lambda > MAX_DAMPING {
                // No downhill step left: we are at the minimum.
                return finish(points, &params, chi2, iteration);
            }
        }
    }

    Err(FitError::NotConverged(MAX_ITERATIONS))
}

fn finish(
    points: &[(f64, f64)],
    params: &Vector3<f64>,
    chi2: f64,
    iterations: usize,
) -> Result<GaussianFit, FitError> {
    let (a, m, sigma) = (params[0], params[1], params[2].abs());
    if !(sigma.is_finite() && sigma > 0.0 && a.is_finite() && m.is_finite()) {
        return Err(FitError::Diverged);
    }
    Ok(GaussianFit {
        amplitude: a,
        mean: m,
        sigma,
        chi2,
        ndf: points.len() - 3,
        iterations,
    })
}

/// Moments of the positive part of the data.
fn initial_guess(points: &[(f64, f64)]) -> Vector3<f64> {
    let (mut w, mut wt, mut wtt) = (0.0, 0.0, 0.0);
    let mut peak = (points[0].0, f64::NEG_INFINITY);
    for &(t, y) in points {
        if y > peak.1 {
            peak = (t, y);
        }
        let y = y.max(0.0);
        w += y;
        wt += y * t;
        wtt += y * t * t;
    }
    let span = points[points.len() - 1].0 - points[0].0;
    let fallback_sigma = (span.abs() / 4.0).max(f64::EPSILON);
    if w <= 0.0 {
        return Vector3::new(peak.1.max(1.0), peak.0, fallback_sigma);
    }
    let mean = wt / w;
    let variance = wtt / w - mean * mean;
    let sigma = if variance > 0.0 {
        variance.sqrt()
    } else {
        fallback_sigma
    };
    Vector3::new(peak.1, mean, sigma)
}

fn chi_square(points: &[(f64, f64)], params: &Vector3<f64>) -> f64 {
    points
        .iter()
        .map(|&(t, y)| {
            let r = y - gaussian(t, params);
            r * r
        })
        .sum()
}

/// `JᵀJ` and `Jᵀr` of the residuals at `params`.
fn normal_equations(
    points: &[(f64, f64)],
    params: &Vector3<f64>,
) -> (Matrix3<f64>, Vector3<f64>) {
    let (a, m, s) = (params[0], params[1], params[2]);
    let mut jtj = Matrix3::zeros();
    let mut jtr = Vector3::zeros();
    for &(t, y) in points {
        let d = t - m;
        let e = (-0.5 * d * d / (s * s)).exp();
        let f = a * e;
        let j = Vector3::new(e, f * d / (s * s), f * d * d / (s * s * s));
        jtr += j * (y - f);
        jtj += j * j.transpose();
    }
    (jtj, jtr)
}

/// Solves `(JᵀJ + λ diag(JᵀJ)) δ = Jᵀr`.
fn damped_step(jtj: &Matrix3<f64>, jtr: &Vector3<f64>, lambda: f64) -> Option<Vector3<f64>> {
    let mut damped = *jtj;
    for i in 0..3 {
        damped[(i, i)] += lambda * jtj[(i, i)].max(f64::MIN_POSITIVE);
    }
    damped
        .lu()
        .solve(jtr)
        .filter(|step| step.iter().all(|v| v.is_finite()))
}
