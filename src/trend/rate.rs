//! Endpoint rate of change and its uncertainty
//!
//! The rate is the difference between the last and first fitted values over
//! the record length, and its error follows from propagating a per-sample
//! error `σ` through that difference.

use crate::errors::{DhSeriesError, Result};
use serde::{Deserialize, Serialize};

/// Assumed correlation between the errors of the two endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorModel {
    /// `√2 · σ / Δt`
    Independent,
    /// `2 · σ / Δt`
    #[default]
    Dependent,
}

fn span(x: &[f64]) -> Result<f64> {
    if x.len() < 2 {
        return Err(DhSeriesError::InsufficientSamples {
            needed: 2,
            got: x.len(),
        });
    }
    let dt = x[x.len() - 1] - x[0];
    if dt == 0.0 || !dt.is_finite() {
        return Err(DhSeriesError::Generic(
            "rate requires distinct first and last times".to_string(),
        ));
    }
    Ok(dt)
}

/// `(y[last] − y[first]) / (x[last] − x[first])`.
pub fn rate(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        return Err(DhSeriesError::shape_mismatch("rate input", &[x.len()], &[y.len()]));
    }
    let dt = span(x)?;
    Ok((y[y.len() - 1] - y[0]) / dt)
}

/// Uncertainty of [`rate`] for a per-sample error `sigma`.
pub fn rate_err(x: &[f64], sigma: f64, model: ErrorModel) -> Result<f64> {
    let dt = span(x)?;
    Ok(match model {
        ErrorModel::Independent => std::f64::consts::SQRT_2 * sigma / dt,
        ErrorModel::Dependent => 2.0 * sigma / dt,
    })
}

/// Sample standard deviation of `observed − fitted` over the pairs where both
/// are finite.
///
/// # Errors
///
/// [`DhSeriesError::InsufficientSamples`] with fewer than two such pairs.
pub fn residual_std(fitted: &[f64], observed: &[f64]) -> Result<f64> {
    let residuals: Vec<f64> = fitted
        .iter()
        .zip(observed)
        .filter(|(f, o)| f.is_finite() && o.is_finite())
        .map(|(f, o)| o - f)
        .collect();
    let n = residuals.len();
    if n < 2 {
        return Err(DhSeriesError::InsufficientSamples { needed: 2, got: n });
    }
    let mean = residuals.iter().sum::<f64>() / n as f64;
    let var = residuals.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / (n - 1) as f64;
    Ok(var.sqrt())
}
