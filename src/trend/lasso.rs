//! Cross-validated lasso over polynomial features
//!
//! The features are `u, u², …, u^d` of the normalised abscissa, each
//! standardised on the training samples; the intercept is not penalised.
//! The objective minimised by coordinate descent is
//!
//! ```text
//! (1 / 2n) · ‖y − ȳ − X·β‖² + α · ‖β‖₁
//! ```
//!
//! α is picked from a log-spaced path running from the smallest value that
//! zeroes every coefficient down to `eps` times that value, by minimum mean
//! held-out squared error over deterministic folds.

use super::cv::{complement, kfold, mse, FoldStrategy};
use super::polynomial::normalisation;
use crate::errors::{DhSeriesError, Result};
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LassoSettings {
    pub max_degree: usize,
    pub folds: usize,
    pub strategy: FoldStrategy,
    /// Number of α values on the path.
    pub n_alphas: usize,
    /// Ratio of the smallest to the largest α.
    pub eps: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LassoSettings {
    fn default() -> Self {
        Self {
            max_degree: 3,
            folds: 10,
            strategy: FoldStrategy::Contiguous,
            n_alphas: 100,
            eps: 1e-3,
            max_iter: 10_000,
            tol: 1e-4,
        }
    }
}

/// Lasso model refitted on all samples at the selected α.
#[derive(Debug, Clone, PartialEq)]
pub struct LassoCvFit {
    pub alpha: f64,
    /// Mean held-out MSE at the selected α.
    pub cv_mse: f64,
    /// `(α, mean held-out MSE)` along the whole path.
    pub mse_path: Vec<(f64, f64)>,
    pub intercept: f64,
    /// Coefficients of the standardised features, lowest power first.
    pub coefficients: Vec<f64>,
    model: Features,
}

impl LassoCvFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.model
            .row(x)
            .iter()
            .zip(&self.coefficients)
            .fold(self.intercept, |acc, (f, b)| acc + f * b)
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len()
    }
}

/// Polynomial feature expansion with per-column standardisation learned from
/// a set of training abscissae.
#[derive(Debug, Clone, PartialEq)]
struct Features {
    degree: usize,
    center: f64,
    scale: f64,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl Features {
    fn learn(x: &[f64], degree: usize) -> Self {
        let (center, scale) = normalisation(x);
        let mut features = Self {
            degree,
            center,
            scale,
            means: vec![0.0; degree],
            stds: vec![1.0; degree],
        };
        let raw: Vec<Vec<f64>> = x.iter().map(|&v| features.raw(v)).collect();
        let n = x.len().max(1) as f64;
        for k in 0..degree {
            let mean = raw.iter().map(|r| r[k]).sum::<f64>() / n;
            let var = raw.iter().map(|r| (r[k] - mean) * (r[k] - mean)).sum::<f64>() / n;
            features.means[k] = mean;
            features.stds[k] = if var > 0.0 { var.sqrt() } else { 0.0 };
        }
        features
    }

    fn raw(&self, x: f64) -> Vec<f64> {
        let u = (x - self.center) / self.scale;
        (1..=self.degree).map(|k| u.powi(k as i32)).collect()
    }

    /// Standardised features; constant columns map to zero.
    fn row(&self, x: f64) -> Vec<f64> {
        self.raw(x)
            .into_iter()
            .enumerate()
            .map(|(k, v)| {
                if self.stds[k] > 0.0 {
                    (v - self.means[k]) / self.stds[k]
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn matrix(&self, x: &[f64]) -> Vec<Vec<f64>> {
        x.iter().map(|&v| self.row(v)).collect()
    }
}

/// Largest useful α: at or above it every coefficient is zero.
fn alpha_max(rows: &[Vec<f64>], y_centred: &[f64]) -> f64 {
    let n = rows.len().max(1) as f64;
    let p = rows.first().map_or(0, Vec::len);
    (0..p)
        .map(|k| rows.iter().zip(y_centred).map(|(r, y)| r[k] * y).sum::<f64>().abs() / n)
        .fold(0.0, f64::max)
}

fn alpha_path(alpha_max: f64, settings: &LassoSettings) -> Vec<f64> {
    let count = settings.n_alphas.max(1);
    if alpha_max <= 0.0 {
        return vec![0.0];
    }
    if count == 1 {
        return vec![alpha_max];
    }
    let hi = alpha_max.log10();
    let lo = (alpha_max * settings.eps).log10();
    (0..count)
        .map(|i| 10f64.powf(hi + (lo - hi) * i as f64 / (count - 1) as f64))
        .collect()
}

#[inline]
fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

/// Coordinate descent for one α, warm-started from `beta`.
fn coordinate_descent(rows: &[Vec<f64>], y: &[f64], alpha: f64, beta: &mut [f64], settings: &LassoSettings) {
    let n = rows.len() as f64;
    let p = beta.len();
    let col_sq: Vec<f64> = (0..p).map(|k| rows.iter().map(|r| r[k] * r[k]).sum::<f64>() / n).collect();
    let mut residual: Vec<f64> = rows
        .iter()
        .zip(y)
        .map(|(r, yi)| yi - r.iter().zip(beta.iter()).map(|(a, b)| a * b).sum::<f64>())
        .collect();

    for _ in 0..settings.max_iter {
        let mut max_step = 0.0f64;
        let mut max_beta = 0.0f64;
        for k in 0..p {
            if col_sq[k] == 0.0 {
                beta[k] = 0.0;
                continue;
            }
            let old = beta[k];
            let rho = rows.iter().zip(&residual).map(|(r, e)| r[k] * e).sum::<f64>() / n + col_sq[k] * old;
            let new = soft_threshold(rho, alpha) / col_sq[k];
            if new != old {
                let delta = new - old;
                for (e, r) in residual.iter_mut().zip(rows) {
                    *e -= r[k] * delta;
                }
                beta[k] = new;
            }
            max_step = max_step.max((new - old).abs());
            max_beta = max_beta.max(new.abs());
        }
        if max_beta == 0.0 || max_step / max_beta < settings.tol {
            break;
        }
    }
}

/// Fit the full α path on training samples and score each α on the test samples.
fn path_errors(
    x: &[f64],
    y: &[f64],
    train: &[usize],
    test: &[usize],
    alphas: &[f64],
    settings: &LassoSettings,
) -> Vec<f64> {
    let tx: Vec<f64> = train.iter().map(|&i| x[i]).collect();
    let ty: Vec<f64> = train.iter().map(|&i| y[i]).collect();
    let features = Features::learn(&tx, settings.max_degree);
    let rows = features.matrix(&tx);
    let y_mean = ty.iter().sum::<f64>() / ty.len() as f64;
    let y_centred: Vec<f64> = ty.iter().map(|v| v - y_mean).collect();
    let test_rows: Vec<Vec<f64>> = test.iter().map(|&i| features.row(x[i])).collect();

    let mut beta = vec![0.0; settings.max_degree];
    alphas
        .iter()
        .map(|&alpha| {
            coordinate_descent(&rows, &y_centred, alpha, &mut beta, settings);
            mse(
                test_rows
                    .iter()
                    .map(|r| y_mean + r.iter().zip(&beta).map(|(a, b)| a * b).sum::<f64>()),
                test.iter().map(|&i| y[i]),
            )
        })
        .collect()
}

/// Lasso polynomial of degree `settings.max_degree` with α chosen by k-fold CV.
///
/// Folds whose training part has fewer than `max_degree + 1` samples are
/// skipped.
///
/// # Errors
///
/// [`DhSeriesError::InsufficientSamples`] if fewer than `max_degree + 1`
/// finite samples exist, or if every fold is degenerate.
pub fn lasso_cv(x: &[f64], y: &[f64], settings: &LassoSettings) -> Result<LassoCvFit> {
    if x.len() != y.len() {
        return Err(DhSeriesError::shape_mismatch("lasso input", &[x.len()], &[y.len()]));
    }
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip();
    let needed = settings.max_degree.max(1) + 1;
    if xs.len() < needed {
        return Err(DhSeriesError::InsufficientSamples {
            needed,
            got: xs.len(),
        });
    }

    let features = Features::learn(&xs, settings.max_degree);
    let rows = features.matrix(&xs);
    let y_mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let y_centred: Vec<f64> = ys.iter().map(|v| v - y_mean).collect();
    let alphas = alpha_path(alpha_max(&rows, &y_centred), settings);

    let mut totals = vec![0.0; alphas.len()];
    let mut used = 0usize;
    for test in kfold(xs.len(), settings.folds, settings.strategy) {
        let train = complement(xs.len(), &test);
        if train.len() < needed {
            trace!("skipping degenerate fold with {} training samples", train.len());
            continue;
        }
        for (total, err) in totals
            .iter_mut()
            .zip(path_errors(&xs, &ys, &train, &test, &alphas, settings))
        {
            *total += err;
        }
        used += 1;
    }
    if used == 0 {
        return Err(DhSeriesError::InsufficientSamples {
            needed: needed + 1,
            got: xs.len(),
        });
    }

    let mse_path: Vec<(f64, f64)> = alphas
        .iter()
        .zip(&totals)
        .map(|(&a, &t)| (a, t / used as f64))
        .collect();
    let (alpha, cv_mse) = mse_path
        .iter()
        .copied()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0.0, f64::NAN));

    // Refit on all samples, warm-starting along the path down to the chosen α.
    let mut beta = vec![0.0; settings.max_degree];
    for &a in alphas.iter().take_while(|&&a| a >= alpha) {
        coordinate_descent(&rows, &y_centred, a, &mut beta, settings);
    }

    Ok(LassoCvFit {
        alpha,
        cv_mse,
        mse_path,
        intercept: y_mean,
        coefficients: beta,
        model: features,
    })
}
