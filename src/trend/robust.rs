//! Outlier-resistant straight line
//!
//! Iteratively reweighted least squares with Huber weights. The residual
//! scale is re-estimated every iteration as the normalised median absolute
//! deviation.

use super::linear::{ols, weighted_ols, LinearFit};
use crate::errors::{DhSeriesError, Result};

/// Huber tuning constant (95% efficiency under Gaussian noise).
pub const HUBER_T: f64 = 1.345;

const MAX_ITER: usize = 50;
const TOL: f64 = 1e-8;

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Normalised MAD: consistent with the standard deviation for Gaussian data.
fn mad_scale(residuals: &[f64]) -> f64 {
    let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
    median(&mut abs) / 0.674_489_750_196_081_7
}

/// Straight line fitted with Huber M-estimation.
///
/// # Errors
///
/// Same conditions as [`super::linear_fit`].
pub fn linear_fit_robust(x: &[f64], y: &[f64]) -> Result<LinearFit> {
    if x.len() != y.len() {
        return Err(DhSeriesError::shape_mismatch("robust fit input", &[x.len()], &[y.len()]));
    }
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip();

    let mut fit = ols(&xs, &ys)?;
    for _ in 0..MAX_ITER {
        let residuals: Vec<f64> = xs.iter().zip(&ys).map(|(a, b)| b - fit.predict(*a)).collect();
        let scale = mad_scale(&residuals);
        if !(scale > 0.0) {
            break;
        }
        let weights: Vec<f64> = residuals
            .iter()
            .map(|r| {
                let z = (r / scale).abs();
                if z <= HUBER_T {
                    1.0
                } else {
                    HUBER_T / z
                }
            })
            .collect();
        let next = weighted_ols(&xs, &ys, &weights)?;
        let change = (next.slope - fit.slope).abs() + (next.intercept - fit.intercept).abs();
        fit = next;
        if change < TOL * (1.0 + fit.intercept.abs()) {
            break;
        }
    }
    Ok(fit)
}
