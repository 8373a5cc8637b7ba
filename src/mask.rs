//! Validity filtering of data stacks
//!
//! Both policies are pure transforms: they return a new [`DataStack`] and
//! never expose a partially filtered state. [`MaskFilter`] composes them.

use crate::errors::Result;
use crate::stack::{is_missing, DataStack};
use log::debug;
use ndarray::s;

/// Set every cell with fewer than `min_valid_samples` non-missing values over
/// time to missing at all time steps.
///
/// Idempotent: a cell that survives keeps all of its samples, so a second pass
/// counts the same number of valid values.
pub fn drop_sparse_series(stack: &DataStack, min_valid_samples: usize) -> Result<DataStack> {
    Ok(drop_sparse_counted(stack, min_valid_samples)?.0)
}

fn drop_sparse_counted(stack: &DataStack, min_valid_samples: usize) -> Result<(DataStack, usize)> {
    let counts = stack.valid_counts();
    let mut values = stack.values().clone();
    let mut dropped = 0;
    for ((row, col), &n) in counts.indexed_iter() {
        if n < min_valid_samples {
            if n > 0 {
                dropped += 1;
            }
            values.slice_mut(s![.., row, col]).fill(f64::NAN);
        }
    }
    Ok((stack.with_values(values)?, dropped))
}

/// Set every value with `|v| > abs_bound` to missing.
pub fn clip_outliers(stack: &DataStack, abs_bound: f64) -> Result<DataStack> {
    Ok(clip_counted(stack, abs_bound)?.0)
}

fn clip_counted(stack: &DataStack, abs_bound: f64) -> Result<(DataStack, usize)> {
    let mut clipped = 0;
    let values = stack.values().mapv(|v| {
        if !is_missing(v) && v.abs() > abs_bound {
            clipped += 1;
            f64::NAN
        } else {
            v
        }
    });
    Ok((stack.with_values(values)?, clipped))
}

/// What a [`MaskFilter`] pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskReport {
    /// Values beyond the absolute bound.
    pub values_clipped: usize,
    /// Cells that had some data but too few samples to keep.
    pub cells_dropped: usize,
}

/// Composition of the outlier and sparse-series policies.
///
/// Outliers are clipped first so that a cell whose only samples are
/// artifacts is also dropped as sparse.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaskFilter {
    pub abs_bound: Option<f64>,
    pub min_valid_samples: Option<usize>,
}

impl MaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_abs_bound(mut self, abs_bound: f64) -> Self {
        self.abs_bound = Some(abs_bound);
        self
    }

    pub fn with_min_valid_samples(mut self, min_valid_samples: usize) -> Self {
        self.min_valid_samples = Some(min_valid_samples);
        self
    }

    pub fn apply(&self, stack: &DataStack) -> Result<(DataStack, MaskReport)> {
        let mut report = MaskReport::default();
        let mut current = stack.clone();

        if let Some(bound) = self.abs_bound {
            let (next, clipped) = clip_counted(&current, bound)?;
            report.values_clipped = clipped;
            current = next;
        }
        if let Some(min) = self.min_valid_samples {
            let (next, dropped) = drop_sparse_counted(&current, min)?;
            report.cells_dropped = dropped;
            current = next;
        }

        debug!(
            "mask filter clipped {} values and dropped {} cells",
            report.values_clipped, report.cells_dropped
        );
        Ok((current, report))
    }
}
