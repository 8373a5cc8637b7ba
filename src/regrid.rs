//! Bilinear regridding of 2-D fields onto a denser mesh
//!
//! Source coordinates may run in either direction along each axis. A target
//! coordinate is located by its fractional index between the two bracketing
//! centers; the four surrounding samples are blended with bilinear weights.

use crate::errors::{DhSeriesError, Result};
use crate::grid::Grid;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// What to do with a target coordinate outside the source centers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    /// Fail with [`DhSeriesError::OutOfBounds`].
    #[default]
    Reject,
    /// Use the nearest edge value along the offending axis.
    Clamp,
}

/// `n` evenly spaced values from `first` to `last` inclusive.
pub fn linspace(first: f64, last: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![first],
        _ => {
            let step = (last - first) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { last } else { first + step * i as f64 })
                .collect()
        }
    }
}

/// Fractional index of `x` along a strictly monotonic axis.
fn fractional_index(axis: &'static str, coords: &[f64], x: f64, mode: Extrapolation) -> Result<f64> {
    let n = coords.len();
    let (first, last) = (coords[0], coords[n - 1]);
    let (lo, hi) = if first <= last { (first, last) } else { (last, first) };
    if !(x >= lo && x <= hi) {
        return match mode {
            Extrapolation::Clamp if x.is_finite() => {
                Ok(if (x < lo) == (first <= last) { 0.0 } else { (n - 1) as f64 })
            }
            _ => Err(DhSeriesError::OutOfBounds {
                axis,
                value: x,
                min: lo,
                max: hi,
            }),
        };
    }
    let increasing = first <= last;
    // First index whose center lies past `x`.
    let upper = coords.partition_point(|&c| if increasing { c <= x } else { c >= x });
    let i = upper.clamp(1, n - 1) - 1;
    let span = coords[i + 1] - coords[i];
    Ok(i as f64 + (x - coords[i]) / span)
}

/// Bilinear blend at fractional indices. Corners with zero weight are
/// ignored, so sampling exactly on a valid center never picks up a missing
/// neighbour.
fn blend(field: &Array2<f64>, fy: f64, fx: f64) -> f64 {
    let (ny, nx) = field.dim();
    let y1 = (fy.floor() as usize).min(ny - 1);
    let x1 = (fx.floor() as usize).min(nx - 1);
    let y2 = (y1 + 1).min(ny - 1);
    let x2 = (x1 + 1).min(nx - 1);
    let dy = fy - y1 as f64;
    let dx = fx - x1 as f64;

    [
        (y1, x1, (1.0 - dy) * (1.0 - dx)),
        (y1, x2, (1.0 - dy) * dx),
        (y2, x1, dy * (1.0 - dx)),
        (y2, x2, dy * dx),
    ]
    .iter()
    .filter(|(_, _, w)| *w > 0.0)
    .map(|&(r, c, w)| w * field[[r, c]])
    .sum()
}

fn check_field(field: &Array2<f64>, grid: &Grid) -> Result<()> {
    let (ny, nx) = grid.shape();
    if field.dim() != (ny, nx) {
        return Err(DhSeriesError::shape_mismatch(
            "regrid field",
            &[ny, nx],
            &[field.nrows(), field.ncols()],
        ));
    }
    Ok(())
}

/// Value of `field` (centers `lon` × `lat`) at one point.
pub fn bilinear_sample(
    field: &Array2<f64>,
    lon: &[f64],
    lat: &[f64],
    x: f64,
    y: f64,
    mode: Extrapolation,
) -> Result<f64> {
    let grid = Grid::new(lon.to_vec(), lat.to_vec())?;
    check_field(field, &grid)?;
    let fx = fractional_index("longitude", grid.lon(), x, mode)?;
    let fy = fractional_index("latitude", grid.lat(), y, mode)?;
    Ok(blend(field, fy, fx))
}

/// Resample `field` onto a mesh `factor` times denser along each axis.
///
/// The new axes run from the first to the last source center with
/// `n · factor` points each, so every target lies inside the source grid.
///
/// # Errors
///
/// Fails for `factor == 0`, an invalid source grid, or a field not shaped
/// `(lat.len(), lon.len())`.
pub fn resample(field: &Array2<f64>, lon: &[f64], lat: &[f64], factor: usize) -> Result<(Vec<f64>, Vec<f64>, Array2<f64>)> {
    if factor == 0 {
        return Err(DhSeriesError::Generic("regrid factor must be at least 1".to_string()));
    }
    let grid = Grid::new(lon.to_vec(), lat.to_vec())?;
    check_field(field, &grid)?;

    let lon2 = linspace(lon[0], lon[lon.len() - 1], lon.len() * factor);
    let lat2 = linspace(lat[0], lat[lat.len() - 1], lat.len() * factor);

    let fx: Vec<f64> = lon2
        .iter()
        .map(|&x| fractional_index("longitude", grid.lon(), x, Extrapolation::Clamp))
        .collect::<Result<_>>()?;
    let fy: Vec<f64> = lat2
        .iter()
        .map(|&y| fractional_index("latitude", grid.lat(), y, Extrapolation::Clamp))
        .collect::<Result<_>>()?;

    let mut out = Array2::<f64>::zeros((lat2.len(), lon2.len()));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(fy.par_iter())
        .for_each(|(mut row, &y)| {
            for (cell, &x) in row.iter_mut().zip(&fx) {
                *cell = blend(field, y, x);
            }
        });
    Ok((lon2, lat2, out))
}
