//! Low-order polynomial least squares
//!
//! Abscissae are centred and scaled before building the design matrix;
//! decimal years raised to the third power are otherwise too ill-conditioned.

use super::cv::{cross_validate, mse, FoldStrategy};
use super::least_squares;
use crate::errors::{DhSeriesError, Result};
use nalgebra::{DMatrix, DVector};

/// Highest degree accepted by [`poly_fit`].
pub const MAX_POLY_DEGREE: usize = 3;

/// `p(x) = Σ cₖ · uᵏ` with `u = (x − center) / scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    /// Coefficients in ascending powers of `u`.
    pub coefficients: Vec<f64>,
    pub center: f64,
    pub scale: f64,
}

impl Polynomial {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn predict(&self, x: f64) -> f64 {
        let u = (x - self.center) / self.scale;
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * u + c)
    }
}

/// Center and spread used to normalise polynomial abscissae.
pub(crate) fn normalisation(x: &[f64]) -> (f64, f64) {
    let n = x.len().max(1) as f64;
    let center = x.iter().sum::<f64>() / n;
    let spread = (x.iter().map(|v| (v - center) * (v - center)).sum::<f64>() / n).sqrt();
    (center, if spread > 0.0 { spread } else { 1.0 })
}

fn fit_normalised(x: &[f64], y: &[f64], degree: usize, center: f64, scale: f64) -> Result<Polynomial> {
    let needed = degree + 1;
    if x.len() < needed {
        return Err(DhSeriesError::InsufficientSamples {
            needed,
            got: x.len(),
        });
    }
    let design = DMatrix::from_fn(x.len(), needed, |i, k| ((x[i] - center) / scale).powi(k as i32));
    let coefficients = least_squares(design, &DVector::from_column_slice(y))?;
    Ok(Polynomial {
        coefficients: coefficients.iter().copied().collect(),
        center,
        scale,
    })
}

fn finite_pairs(x: &[f64], y: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    if x.len() != y.len() {
        return Err(DhSeriesError::shape_mismatch("polynomial fit input", &[x.len()], &[y.len()]));
    }
    Ok(x.iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip())
}

/// Least-squares polynomial of the given degree over the finite samples.
///
/// # Errors
///
/// Rejects degrees above [`MAX_POLY_DEGREE`] and returns
/// [`DhSeriesError::InsufficientSamples`] with fewer than `degree + 1` samples.
pub fn poly_fit(x: &[f64], y: &[f64], degree: usize) -> Result<Polynomial> {
    if degree > MAX_POLY_DEGREE {
        return Err(DhSeriesError::Generic(format!(
            "polynomial degree {degree} exceeds the maximum of {MAX_POLY_DEGREE}"
        )));
    }
    let (xs, ys) = finite_pairs(x, y)?;
    let (center, scale) = normalisation(&xs);
    fit_normalised(&xs, &ys, degree, center, scale)
}

/// Result of [`polyfit_cv`].
#[derive(Debug, Clone, PartialEq)]
pub struct CvPolyFit {
    /// Selected degree, refitted on all samples.
    pub polynomial: Polynomial,
    pub degree: usize,
    /// Mean held-out MSE per candidate degree `0..=max_degree`; `None` when
    /// every fold was degenerate for that degree.
    pub cv_mse: Vec<Option<f64>>,
}

/// Polynomial whose degree (`0..=max_degree`) minimises the k-fold held-out
/// mean squared error.
pub fn polyfit_cv(
    x: &[f64],
    y: &[f64],
    max_degree: usize,
    folds: usize,
    strategy: FoldStrategy,
) -> Result<CvPolyFit> {
    let max_degree = max_degree.min(MAX_POLY_DEGREE);
    let (xs, ys) = finite_pairs(x, y)?;
    if xs.len() < 2 {
        return Err(DhSeriesError::InsufficientSamples {
            needed: 2,
            got: xs.len(),
        });
    }

    let cv_mse: Vec<Option<f64>> = (0..=max_degree)
        .map(|degree| {
            cross_validate(xs.len(), folds, strategy, |train, test| {
                let tx: Vec<f64> = train.iter().map(|&i| xs[i]).collect();
                let ty: Vec<f64> = train.iter().map(|&i| ys[i]).collect();
                let (center, scale) = normalisation(&tx);
                let poly = fit_normalised(&tx, &ty, degree, center, scale).ok()?;
                Some(mse(
                    test.iter().map(|&i| poly.predict(xs[i])),
                    test.iter().map(|&i| ys[i]),
                ))
            })
        })
        .collect();

    let degree = cv_mse
        .iter()
        .enumerate()
        .filter_map(|(d, e)| e.map(|e| (d, e)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(d, _)| d)
        .ok_or(DhSeriesError::InsufficientSamples {
            needed: 2,
            got: xs.len(),
        })?;

    let polynomial = poly_fit(&xs, &ys, degree)?;
    Ok(CvPolyFit {
        polynomial,
        degree,
        cv_mse,
    })
}
