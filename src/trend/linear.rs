//! Ordinary least-squares straight line

use crate::errors::{DhSeriesError, Result};
use serde::Serialize;

/// Number of points in [`LinearFit::line`].
pub const LINE_POINTS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Valid samples the fit used.
    pub n: usize,
    /// Smallest and largest valid abscissa.
    pub x_range: (f64, f64),
}

impl LinearFit {
    #[inline]
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// The fitted line sampled at [`LINE_POINTS`] evenly spaced abscissae
    /// between the smallest and largest valid sample.
    pub fn line(&self) -> (Vec<f64>, Vec<f64>) {
        let (lo, hi) = self.x_range;
        let step = (hi - lo) / (LINE_POINTS - 1) as f64;
        (0..LINE_POINTS)
            .map(|i| {
                let x = if i == LINE_POINTS - 1 { hi } else { lo + step * i as f64 };
                (x, self.predict(x))
            })
            .unzip()
    }
}

/// Straight-line fit by ordinary least squares.
///
/// Samples where either coordinate is NaN are ignored.
///
/// # Errors
///
/// [`DhSeriesError::InsufficientSamples`] with fewer than two valid samples or
/// when every valid abscissa is the same.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Result<LinearFit> {
    fit_filtered(x, y, |_| true)
}

/// [`linear_fit`] that additionally treats `y == 0.0` as missing.
///
/// For inputs that still use zero as a missing-data sentinel.
pub fn linear_fit_excluding_zeros(x: &[f64], y: &[f64]) -> Result<LinearFit> {
    fit_filtered(x, y, |v| v != 0.0)
}

fn fit_filtered(x: &[f64], y: &[f64], keep: impl Fn(f64) -> bool) -> Result<LinearFit> {
    if x.len() != y.len() {
        return Err(DhSeriesError::shape_mismatch("linear fit input", &[x.len()], &[y.len()]));
    }
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite() && keep(**b))
        .map(|(a, b)| (*a, *b))
        .unzip();
    ols(&xs, &ys)
}

/// Weighted straight-line fit on already-filtered samples.
pub(crate) fn weighted_ols(x: &[f64], y: &[f64], w: &[f64]) -> Result<LinearFit> {
    let n = x.len();
    let sw: f64 = w.iter().sum();
    if n < 2 || sw <= 0.0 {
        return Err(DhSeriesError::InsufficientSamples { needed: 2, got: n });
    }
    let mx = x.iter().zip(w).map(|(a, w)| a * w).sum::<f64>() / sw;
    let my = y.iter().zip(w).map(|(b, w)| b * w).sum::<f64>() / sw;
    let (mut sxx, mut sxy) = (0.0, 0.0);
    for ((a, b), w) in x.iter().zip(y).zip(w) {
        sxx += w * (a - mx) * (a - mx);
        sxy += w * (a - mx) * (b - my);
    }
    if sxx <= 0.0 {
        return Err(DhSeriesError::InsufficientSamples { needed: 2, got: 1 });
    }
    let slope = sxy / sxx;
    let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(LinearFit {
        slope,
        intercept: my - slope * mx,
        n,
        x_range: (lo, hi),
    })
}

pub(crate) fn ols(x: &[f64], y: &[f64]) -> Result<LinearFit> {
    weighted_ols(x, y, &vec![1.0; x.len()])
}
