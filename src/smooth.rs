//! Gaussian smoothing of 2-D fields for display
//!
//! The filter is separable: one 1-D pass along longitude, then one along
//! latitude. The kernel is truncated at `round(4σ)` cells and renormalised,
//! and the field is extended past its edges by reflection about the edge
//! (`d c b a | a b c d | d c b a`).
//!
//! Missing cells are treated as zero while filtering and are missing again in
//! the output, so holes never get filled in from their neighbours.

use crate::errors::{DhSeriesError, Result};
use crate::stack::is_missing;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView2, Axis, Zip};

/// Kernel half-width for a standard deviation of `sigma` cells.
pub fn kernel_radius(sigma: f64) -> usize {
    (4.0 * sigma + 0.5) as usize
}

/// Normalised Gaussian weights for offsets `-radius..=radius`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = kernel_radius(sigma) as isize;
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Index into `0..n` for a possibly out-of-range position, reflecting about
/// the edges (the edge sample is repeated).
#[inline]
fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

fn pass_along_rows(input: ArrayView2<'_, f64>, kernel: &[f64]) -> Array2<f64> {
    let radius = (kernel.len() / 2) as isize;
    let nx = input.ncols();
    let mut out = Array2::<f64>::zeros(input.dim());
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let src = input.row(i);
            for j in 0..nx {
                row[j] = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * src[reflect(j as isize + k as isize - radius, nx)])
                    .sum();
            }
        });
    out
}

fn pass_along_columns(input: ArrayView2<'_, f64>, kernel: &[f64]) -> Array2<f64> {
    let radius = (kernel.len() / 2) as isize;
    let ny = input.nrows();
    let mut out = Array2::<f64>::zeros(input.dim());
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            for (k, w) in kernel.iter().enumerate() {
                let src = input.row(reflect(i as isize + k as isize - radius, ny));
                row.scaled_add(*w, &src);
            }
        });
    out
}

/// Gaussian-smoothed copy of `field` with standard deviation `width` in grid
/// cells. Cells missing in `field` are missing in the result.
///
/// # Errors
///
/// Rejects a negative or non-finite `width`.
pub fn gaussian_smooth(field: &Array2<f64>, width: f64) -> Result<Array2<f64>> {
    if !width.is_finite() || width < 0.0 {
        return Err(DhSeriesError::Generic(format!(
            "smoothing width must be a non-negative number, got {width}"
        )));
    }
    if field.is_empty() {
        return Ok(field.clone());
    }

    let holes = field.mapv(is_missing);
    let filled = field.mapv(|v| if is_missing(v) { 0.0 } else { v });
    let kernel = gaussian_kernel(width);

    let smoothed = pass_along_columns(pass_along_rows(filled.view(), &kernel).view(), &kernel);
    Ok(Zip::from(&smoothed)
        .and(&holes)
        .map_collect(|&v, &hole| if hole { f64::NAN } else { v }))
}
