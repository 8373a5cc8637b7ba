//! Area-weighted spatial aggregation
//!
//! Reduces a `(nz, ny, nx)` stack to one value per time step. Missing cells
//! carry zero weight; the weights of the remaining cells are their surface
//! areas, normalised to sum to one. Region selection always goes through one
//! resolved mask that is applied to values and areas alike.

use crate::errors::{DhSeriesError, Result};
use crate::grid::AreaGrid;
use crate::region::{Region, RegionCatalog};
use crate::series::TimeSeries;
use crate::stack::{is_missing, DataStack};
use log::{debug, warn};
use ndarray::parallel::prelude::*;
use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Value reported for a time step in which every selected cell is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllMissingPolicy {
    /// The step is missing in the output series.
    #[default]
    PropagateMissing,
    /// The step is reported as `0.0`.
    ZeroOnAllMissing,
}

impl AllMissingPolicy {
    fn resolve(self) -> Option<f64> {
        match self {
            Self::PropagateMissing => None,
            Self::ZeroOnAllMissing => Some(0.0),
        }
    }
}

/// Area-weighted mean series together with the area that contributed at
/// each step, which is what regional means need to be recombined.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSeries {
    pub series: TimeSeries,
    pub valid_area: Vec<f64>,
}

fn check_shapes(stack: &DataStack, area: &AreaGrid) -> Result<()> {
    let (ny, nx) = stack.grid().shape();
    let (ay, ax) = area.shape();
    if (ny, nx) != (ay, ax) {
        return Err(DhSeriesError::shape_mismatch("area grid", &[ny, nx], &[ay, ax]));
    }
    Ok(())
}

/// `(Σ aᵢ·vᵢ, Σ aᵢ)` over the valid cells of one slice.
fn weighted_sums(field: ArrayView2<'_, f64>, area: &AreaGrid) -> (f64, f64) {
    field
        .iter()
        .zip(area.values().iter())
        .filter(|(v, a)| !is_missing(**v) && **a > 0.0)
        .fold((0.0, 0.0), |(num, den), (v, a)| (num + a * v, den + a))
}

/// Area-weighted mean and contributing area at every time step.
///
/// # Errors
///
/// [`DhSeriesError::ShapeMismatch`] if `area` is not shaped like the stack's grid.
pub fn area_weighted_mean_detailed(
    stack: &DataStack,
    area: &AreaGrid,
    policy: AllMissingPolicy,
) -> Result<WeightedSeries> {
    check_shapes(stack, area)?;
    let (values, valid_area): (Vec<Option<f64>>, Vec<f64>) = stack
        .values()
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|field| {
            let (num, den) = weighted_sums(field, area);
            if den > 0.0 {
                (Some(num / den), den)
            } else {
                (policy.resolve(), 0.0)
            }
        })
        .unzip();
    let series = TimeSeries::new("mean", stack.time().to_vec(), values)?;
    Ok(WeightedSeries { series, valid_area })
}

/// Area-weighted mean of every time slice of `stack`.
pub fn area_weighted_mean(stack: &DataStack, area: &AreaGrid, policy: AllMissingPolicy) -> Result<TimeSeries> {
    Ok(area_weighted_mean_detailed(stack, area, policy)?.series)
}

/// Error of the area-weighted mean for independent per-cell errors:
/// `√(Σ wᵢ² eᵢ²)` with the normalised weights of the valid error cells.
pub fn area_weighted_mean_err(
    errors: &DataStack,
    area: &AreaGrid,
    policy: AllMissingPolicy,
) -> Result<TimeSeries> {
    check_shapes(errors, area)?;
    let values: Vec<Option<f64>> = errors
        .values()
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|field| {
            let (sq, den) = field
                .iter()
                .zip(area.values().iter())
                .filter(|(e, a)| !is_missing(**e) && **a > 0.0)
                .fold((0.0, 0.0), |(sq, den), (e, a)| (sq + a * a * e * e, den + a));
            if den > 0.0 {
                Some(sq.sqrt() / den)
            } else {
                policy.resolve()
            }
        })
        .collect();
    TimeSeries::new("error", errors.time().to_vec(), values)
}

/// The region's enclosing sub-stack and sub-area grid, carved with the same
/// rows, columns and mask. Cells inside the enclosing rectangle but outside
/// the region are missing in the stack and have zero area.
pub fn get_subset(stack: &DataStack, area: &AreaGrid, region: &Region) -> Result<(DataStack, AreaGrid)> {
    check_shapes(stack, area)?;
    let index = region.subset_index(stack.grid())?;
    let mask = region.cell_mask(stack.grid())?;
    let sub_mask = mask.select(Axis(0), &index.rows).select(Axis(1), &index.cols);

    let sub_stack = stack.select(&index)?.masked_outside(&sub_mask)?;
    let sub_area = area.select(&index.rows, &index.cols).masked(&sub_mask)?;
    Ok((sub_stack, sub_area))
}

/// Area-weighted mean over one region of the full grid.
pub fn region_mean(
    stack: &DataStack,
    area: &AreaGrid,
    region: &Region,
    policy: AllMissingPolicy,
) -> Result<WeightedSeries> {
    check_shapes(stack, area)?;
    let mask = region.nonempty_mask(stack.grid())?;
    let mut weighted = area_weighted_mean_detailed(stack, &area.masked(&mask)?, policy)?;
    weighted.series = weighted.series.with_name(&region.name);
    Ok(weighted)
}

/// Aggregated mean (and optionally error) series of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSeries {
    pub name: String,
    pub mean: WeightedSeries,
    pub error: Option<TimeSeries>,
}

/// Series for every region of `catalog`, in catalog order. Regions are
/// aggregated in parallel.
pub fn aggregate_regions(
    stack: &DataStack,
    errors: Option<&DataStack>,
    area: &AreaGrid,
    catalog: &RegionCatalog,
    policy: AllMissingPolicy,
) -> Result<Vec<RegionSeries>> {
    check_shapes(stack, area)?;
    if let Some(errors) = errors {
        check_shapes(errors, area)?;
    }
    let regions: Vec<&Region> = catalog.iter().collect();
    regions
        .par_iter()
        .map(|region| -> Result<RegionSeries> {
            debug!("averaging {}", region.name);
            let mean = region_mean(stack, area, region, policy)?;
            if mean.series.valid_count() == 0 {
                warn!("region '{}' has no valid samples", region.name);
            }
            let error = match errors {
                Some(errors) => {
                    let mask = region.nonempty_mask(errors.grid())?;
                    let err = area_weighted_mean_err(errors, &area.masked(&mask)?, policy)?;
                    Some(err.with_name(&region.name))
                }
                None => None,
            };
            Ok(RegionSeries {
                name: region.name.clone(),
                mean,
                error,
            })
        })
        .collect()
}

/// Recombine regional means into the mean of their union, weighting each
/// region by the area that was valid at that step.
///
/// # Errors
///
/// Fails if the parts do not share one time axis.
pub fn combine_series(name: &str, parts: &[WeightedSeries], policy: AllMissingPolicy) -> Result<TimeSeries> {
    let first = parts
        .first()
        .ok_or_else(|| DhSeriesError::Generic("no series to combine".to_string()))?;
    let time = first.series.time().to_vec();
    for part in parts {
        if part.series.time() != time.as_slice() || part.valid_area.len() != time.len() {
            return Err(DhSeriesError::shape_mismatch(
                &format!("series '{}'", part.series.name),
                &[time.len()],
                &[part.series.len()],
            ));
        }
    }
    let values = (0..time.len())
        .map(|k| {
            let (num, den) = parts
                .iter()
                .filter_map(|p| p.series.values()[k].map(|v| (v, p.valid_area[k])))
                .filter(|(_, a)| *a > 0.0)
                .fold((0.0, 0.0), |(num, den), (v, a)| (num + a * v, den + a));
            if den > 0.0 {
                Some(num / den)
            } else {
                policy.resolve()
            }
        })
        .collect();
    TimeSeries::new(name, time, values)
}
