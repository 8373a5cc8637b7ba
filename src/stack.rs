//! Time × latitude × longitude data stacks
//!
//! A [`DataStack`] owns a `(nz, ny, nx)` array aligned with a time axis of
//! decimal years and a [`Grid`]. Missing samples are stored as NaN; any
//! non-finite value is treated as missing. Every transform returns a new stack
//! and leaves `self` untouched.

use crate::errors::{DhSeriesError, Result};
use crate::grid::Grid;
use crate::region::SubsetIndex;
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};
use std::collections::BTreeMap;

/// Whether a stored value counts as missing.
#[inline]
pub fn is_missing(value: f64) -> bool {
    !value.is_finite()
}

/// Gridded observations over time.
#[derive(Debug, Clone, PartialEq)]
pub struct DataStack {
    time: Vec<f64>,
    grid: Grid,
    values: Array3<f64>,
}

impl DataStack {
    /// # Errors
    ///
    /// Returns [`DhSeriesError::ShapeMismatch`] if `values` is not shaped
    /// `(time.len(), grid.ny(), grid.nx())`, and [`DhSeriesError::InvalidGrid`]
    /// if the time axis is not strictly increasing.
    pub fn new(time: Vec<f64>, grid: Grid, values: Array3<f64>) -> Result<Self> {
        check_time_axis(&time)?;
        let expected = [time.len(), grid.ny(), grid.nx()];
        if values.shape() != expected {
            return Err(DhSeriesError::shape_mismatch("data stack", &expected, values.shape()));
        }
        Ok(Self { time, grid, values })
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    pub fn into_values(self) -> Array3<f64> {
        self.values
    }

    pub fn nz(&self) -> usize {
        self.time.len()
    }

    /// Shape as `(nz, ny, nx)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.values.dim()
    }

    /// The 2-D field at time index `t`.
    pub fn slice(&self, t: usize) -> ArrayView2<'_, f64> {
        self.values.index_axis(Axis(0), t)
    }

    /// The time series at cell `(row, col)`.
    pub fn cell_series(&self, row: usize, col: usize) -> ArrayView1<'_, f64> {
        self.values.slice(s![.., row, col])
    }

    /// Number of non-missing samples per cell, shape `(ny, nx)`.
    pub fn valid_counts(&self) -> Array2<usize> {
        self.values
            .map_axis(Axis(0), |col| col.iter().filter(|v| !is_missing(**v)).count())
    }

    /// Number of missing entries in the whole stack.
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| is_missing(**v)).count()
    }

    /// Same stack with new values, checked against the current shape.
    pub(crate) fn with_values(&self, values: Array3<f64>) -> Result<Self> {
        DataStack::new(self.time.clone(), self.grid.clone(), values)
    }

    /// Copy with every exact `0.0` replaced by NaN.
    ///
    /// Only needed for inputs that encode missing cells as zeros; the rest of
    /// the crate never interprets zero as missing.
    pub fn harmonize_zeros(&self) -> DataStack {
        let values = self.values.mapv(|v| if v == 0.0 { f64::NAN } else { v });
        DataStack {
            time: self.time.clone(),
            grid: self.grid.clone(),
            values,
        }
    }

    /// Samples with `from <= t <= to`. Either bound may be open.
    ///
    /// # Errors
    ///
    /// Returns [`DhSeriesError::InsufficientSamples`] if no time step is left.
    pub fn time_filter(&self, from: Option<f64>, to: Option<f64>) -> Result<DataStack> {
        let keep: Vec<usize> = self
            .time
            .iter()
            .enumerate()
            .filter(|(_, &t)| from.map_or(true, |f| t >= f) && to.map_or(true, |e| t <= e))
            .map(|(k, _)| k)
            .collect();
        if keep.is_empty() {
            return Err(DhSeriesError::InsufficientSamples { needed: 1, got: 0 });
        }
        let time = keep.iter().map(|&k| self.time[k]).collect();
        let values = self.values.select(Axis(0), &keep);
        DataStack::new(time, self.grid.clone(), values)
    }

    /// Sub-stack on the enclosing sub-grid of a region, indexed exactly like
    /// [`crate::grid::AreaGrid::select`] with the same rows and columns.
    pub fn select(&self, index: &SubsetIndex) -> Result<DataStack> {
        let grid = Grid::new(index.lon.clone(), index.lat.clone())?;
        let values = self
            .values
            .select(Axis(1), &index.rows)
            .select(Axis(2), &index.cols);
        DataStack::new(self.time.clone(), grid, values)
    }

    /// Copy with every cell where `mask` is false set missing at all times.
    pub fn masked_outside(&self, mask: &Array2<bool>) -> Result<DataStack> {
        if mask.dim() != self.grid.shape() {
            let (ny, nx) = self.grid.shape();
            let (my, mx) = mask.dim();
            return Err(DhSeriesError::shape_mismatch("region mask", &[ny, nx], &[my, mx]));
        }
        let mut values = self.values.clone();
        for mut field in values.axis_iter_mut(Axis(0)) {
            field.zip_mut_with(mask, |v, &keep| {
                if !keep {
                    *v = f64::NAN;
                }
            });
        }
        self.with_values(values)
    }

    /// Copy with each value multiplied by `factor` (e.g. m → cm).
    pub fn scaled(&self, factor: f64) -> DataStack {
        DataStack {
            time: self.time.clone(),
            grid: self.grid.clone(),
            values: self.values.mapv(|v| v * factor),
        }
    }

    /// Mean over time of every cell, ignoring missing samples. Cells with no
    /// valid sample are NaN.
    pub fn time_mean(&self) -> Array2<f64> {
        self.values.map_axis(Axis(0), |col| {
            let (sum, n) = col
                .iter()
                .filter(|v| !is_missing(**v))
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n > 0 {
                sum / n as f64
            } else {
                f64::NAN
            }
        })
    }
}

fn check_time_axis(time: &[f64]) -> Result<()> {
    if time.iter().any(|t| !t.is_finite()) {
        return Err(DhSeriesError::InvalidGrid(
            "time axis contains non-finite values".to_string(),
        ));
    }
    if !time.windows(2).all(|w| w[1] > w[0]) {
        return Err(DhSeriesError::InvalidGrid(
            "time axis is not strictly increasing".to_string(),
        ));
    }
    Ok(())
}

/// Several named variables sharing one time axis and grid, as read from a
/// gridded data source (elevation change, per-cell error, crossover counts).
#[derive(Debug, Clone)]
pub struct GriddedDataset {
    time: Vec<f64>,
    grid: Grid,
    variables: BTreeMap<String, Array3<f64>>,
}

impl GriddedDataset {
    pub fn new(time: Vec<f64>, grid: Grid) -> Result<Self> {
        check_time_axis(&time)?;
        Ok(Self {
            time,
            grid,
            variables: BTreeMap::new(),
        })
    }

    /// Add (or replace) a variable.
    ///
    /// # Errors
    ///
    /// Fails if the array shape does not match the time axis and grid.
    pub fn insert(&mut self, name: &str, values: Array3<f64>) -> Result<()> {
        let expected = [self.time.len(), self.grid.ny(), self.grid.nx()];
        if values.shape() != expected {
            return Err(DhSeriesError::shape_mismatch(
                &format!("variable '{name}'"),
                &expected,
                values.shape(),
            ));
        }
        self.variables.insert(name.to_string(), values);
        Ok(())
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// A copy of the named variable as a [`DataStack`].
    pub fn stack(&self, name: &str) -> Result<DataStack> {
        let values = self
            .variables
            .get(name)
            .ok_or_else(|| DhSeriesError::VariableNotFound {
                var: name.to_string(),
            })?;
        DataStack::new(self.time.clone(), self.grid.clone(), values.clone())
    }
}
