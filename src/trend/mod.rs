//! Trend estimation for regional time series
//!
//! # Organization
//!
//! - [`linear`]: ordinary least-squares straight line
//! - [`robust`]: Huber-weighted straight line
//! - [`polynomial`]: low-order polynomial least squares, with and without
//!   cross-validated degree selection
//! - [`lasso`]: L1-regularized polynomial with cross-validated strength
//! - [`cv`]: deterministic k-fold construction shared by the CV fits
//! - [`rate`]: endpoint rate of change and its uncertainty
//!
//! [`fit_trend`] runs one configured method over a [`TimeSeries`] and packs
//! the result into a [`TrendEstimate`].

pub mod cv;
pub mod lasso;
pub mod linear;
pub mod polynomial;
pub mod rate;
pub mod robust;

pub use cv::{kfold, FoldStrategy};
pub use lasso::{lasso_cv, LassoCvFit, LassoSettings};
pub use linear::{linear_fit, linear_fit_excluding_zeros, LinearFit};
pub use polynomial::{poly_fit, polyfit_cv, CvPolyFit, Polynomial, MAX_POLY_DEGREE};
pub use rate::{rate, rate_err, residual_std, ErrorModel};
pub use robust::linear_fit_robust;

use crate::errors::{DhSeriesError, Result};
use crate::series::TimeSeries;
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Which model produces the fitted curve of a [`TrendEstimate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMethod {
    Linear,
    Robust,
    Polynomial,
    PolyfitCv,
    #[default]
    LassoCv,
}

impl TrendMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Robust => "robust",
            Self::Polynomial => "polynomial",
            Self::PolyfitCv => "polyfit_cv",
            Self::LassoCv => "lasso_cv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub method: TrendMethod,
    /// Polynomial degree for `polynomial`, upper bound for the CV methods.
    pub max_degree: usize,
    pub cv_folds: usize,
    pub fold_strategy: FoldStrategy,
    pub error_model: ErrorModel,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            method: TrendMethod::LassoCv,
            max_degree: 3,
            cv_folds: 10,
            fold_strategy: FoldStrategy::Contiguous,
            error_model: ErrorModel::Dependent,
        }
    }
}

impl TrendConfig {
    /// Reject settings no series could be fitted with, so they are not
    /// mistaken for a lack of data later on.
    pub fn validate(&self) -> Result<()> {
        let uses_folds = matches!(self.method, TrendMethod::PolyfitCv | TrendMethod::LassoCv);
        if uses_folds && self.cv_folds < 2 {
            return Err(DhSeriesError::InvalidConfig(format!(
                "{} needs cv_folds >= 2, got {}",
                self.method.as_str(),
                self.cv_folds
            )));
        }
        if self.max_degree > MAX_POLY_DEGREE && self.method == TrendMethod::Polynomial {
            return Err(DhSeriesError::InvalidConfig(format!(
                "max_degree {} exceeds the maximum of {MAX_POLY_DEGREE}",
                self.max_degree
            )));
        }
        if self.max_degree == 0 && self.method == TrendMethod::LassoCv {
            return Err(DhSeriesError::InvalidConfig(
                "lasso_cv needs max_degree >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trend of one time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendEstimate {
    pub method: TrendMethod,
    /// OLS slope per year, always computed alongside the chosen method.
    pub slope: f64,
    pub intercept: f64,
    /// Endpoint rate of `curve` per year.
    pub rate: f64,
    /// `None` when the residual spread cannot be estimated.
    pub rate_error: Option<f64>,
    /// Fitted value at every time of the series.
    pub curve: Vec<(f64, f64)>,
    pub valid_samples: usize,
}

/// Fit `series` with the configured method.
///
/// # Errors
///
/// Returns [`DhSeriesError::InsufficientSamples`] when the series has fewer
/// valid samples than the method needs, so callers can tell "no data" from a
/// zero trend.
pub fn fit_trend(series: &TimeSeries, config: &TrendConfig) -> Result<TrendEstimate> {
    let time = series.time();
    let (t, y) = series.valid_pairs();
    let line = linear_fit(&t, &y)?;

    let fitted: Vec<f64> = match config.method {
        TrendMethod::Linear => time.iter().map(|&x| line.predict(x)).collect(),
        TrendMethod::Robust => {
            let robust = linear_fit_robust(&t, &y)?;
            time.iter().map(|&x| robust.predict(x)).collect()
        }
        TrendMethod::Polynomial => {
            let poly = poly_fit(&t, &y, config.max_degree)?;
            time.iter().map(|&x| poly.predict(x)).collect()
        }
        TrendMethod::PolyfitCv => {
            let fit = polyfit_cv(&t, &y, config.max_degree, config.cv_folds, config.fold_strategy)?;
            time.iter().map(|&x| fit.polynomial.predict(x)).collect()
        }
        TrendMethod::LassoCv => {
            let settings = LassoSettings {
                max_degree: config.max_degree,
                folds: config.cv_folds,
                strategy: config.fold_strategy,
                ..LassoSettings::default()
            };
            let fit = lasso_cv(&t, &y, &settings)?;
            time.iter().map(|&x| fit.predict(x)).collect()
        }
    };

    let trend_rate = rate(time, &fitted)?;
    let observed = series.to_floats();
    let rate_error = residual_std(&fitted, &observed)
        .ok()
        .map(|sigma| rate_err(time, sigma, config.error_model))
        .transpose()?;

    debug!(
        "{}: {} rate {:.4}/yr over {} samples",
        series.name,
        config.method.as_str(),
        trend_rate,
        t.len()
    );

    Ok(TrendEstimate {
        method: config.method,
        slope: line.slope,
        intercept: line.intercept,
        rate: trend_rate,
        rate_error,
        curve: time.iter().copied().zip(fitted).collect(),
        valid_samples: t.len(),
    })
}

/// Minimum-norm least-squares solution of `a · x ≈ b`.
pub(crate) fn least_squares(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    a.svd(true, true)
        .solve(b, 1e-12)
        .map_err(|e| DhSeriesError::Generic(format!("least-squares solve failed: {e}")))
}
