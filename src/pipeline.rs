//! End-to-end regional analysis
//!
//! ```text
//! dataset ─ harmonize/scale ─ time filter ─ MaskFilter ─┐
//!                 area grid (file or computed, once) ───┴─ per-region mean ─ reference ─ filters ─ trend
//! ```
//!
//! Regions are independent once the stack and area grid are prepared, so
//! aggregation and fitting both fan out over the rayon pool.

use crate::aggregate::aggregate_regions;
use crate::config::AnalysisConfig;
use crate::errors::{DhSeriesError, Result};
use crate::grid::{cell_areas, AreaGrid};
use crate::mask::MaskReport;
use crate::netcdf_io::read_area_grid;
use crate::regrid::resample;
use crate::region::RegionCatalog;
use crate::series::TimeSeries;
use crate::smooth::gaussian_smooth;
use crate::stack::{is_missing, DataStack, GriddedDataset};
use crate::trend::{fit_trend, TrendEstimate};
use log::{debug, info, warn};
use ndarray::{Array2, Zip};
use rayon::prelude::*;
use serde::Serialize;

/// Outcome for one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionReport {
    pub name: String,
    /// Area-weighted mean, relative to the configured reference.
    pub series: TimeSeries,
    pub error: Option<TimeSeries>,
    /// `None` when the series has too few valid samples to fit.
    pub trend: Option<TrendEstimate>,
    /// Why the trend is undetermined, if it is.
    pub undetermined: Option<String>,
}

/// Stacks and area grid after every pre-aggregation step.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub stack: DataStack,
    pub errors: Option<DataStack>,
    pub area: AreaGrid,
    pub mask_report: MaskReport,
}

/// Time-mean field, smoothed and densified for display.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayField {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub values: Array2<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn load_stack(&self, dataset: &GriddedDataset, name: &str) -> Result<DataStack> {
        let mut stack = dataset.stack(name)?;
        if self.config.zero_is_missing {
            stack = stack.harmonize_zeros();
        }
        if self.config.scale != 1.0 {
            stack = stack.scaled(self.config.scale);
        }
        stack.time_filter(self.config.from_time, self.config.to_time)
    }

    /// Apply every step that precedes aggregation and compute the area grid.
    ///
    /// Cells masked out of the data are masked out of the error stack too.
    /// The configuration is validated first.
    pub fn prepare(&self, dataset: &GriddedDataset) -> Result<PreparedData> {
        self.config.validate()?;
        let vars = &self.config.variables;
        let raw = self.load_stack(dataset, &vars.data)?;
        let (stack, mask_report) = self.config.mask_filter().apply(&raw)?;
        info!(
            "{} time steps kept, {} cells dropped, {} values clipped",
            stack.nz(),
            mask_report.cells_dropped,
            mask_report.values_clipped
        );

        let errors = match &vars.error {
            Some(name) => {
                let errors = self.load_stack(dataset, name)?;
                let values = Zip::from(errors.values())
                    .and(stack.values())
                    .map_collect(|&e, &v| if is_missing(v) { f64::NAN } else { e });
                Some(errors.with_values(values)?)
            }
            None => None,
        };

        let area = match &self.config.area_file {
            Some(path) => {
                info!("reading cell areas from {}", path.display());
                read_area_grid(path, stack.grid())?
            }
            None => cell_areas(stack.grid(), self.config.earth_radius),
        };
        debug!("total grid area {:.1} km2", area.total());
        Ok(PreparedData {
            stack,
            errors,
            area,
            mask_report,
        })
    }

    /// Regional mean series and trends for every region of `catalog`, in
    /// catalog order.
    ///
    /// A region without enough valid samples, before or after the series
    /// filters, gets `trend: None` and the reason in `undetermined`; any other
    /// failure aborts the run.
    pub fn run(&self, dataset: &GriddedDataset, catalog: &RegionCatalog) -> Result<Vec<RegionReport>> {
        let prepared = self.prepare(dataset)?;
        self.run_prepared(&prepared, catalog)
    }

    pub fn run_prepared(&self, prepared: &PreparedData, catalog: &RegionCatalog) -> Result<Vec<RegionReport>> {
        self.config.validate()?;
        let regional = aggregate_regions(
            &prepared.stack,
            prepared.errors.as_ref(),
            &prepared.area,
            catalog,
            self.config.all_missing,
        )?;

        regional
            .into_par_iter()
            .map(|region| -> Result<RegionReport> {
                let referenced = region.mean.series.referenced(self.config.reference);
                let outcome = self
                    .config
                    .series_filters
                    .apply(&referenced)
                    .and_then(|series| match fit_trend(&series, &self.config.trend) {
                        Ok(trend) => Ok((series, Some(trend), None)),
                        Err(e @ DhSeriesError::InsufficientSamples { .. }) => Ok((series, None, Some(e))),
                        Err(e) => Err(e),
                    });
                let (series, trend, reason) = match outcome {
                    Ok(fitted) => fitted,
                    Err(e @ DhSeriesError::InsufficientSamples { .. }) => (referenced, None, Some(e)),
                    Err(e) => return Err(e),
                };
                if let Some(e) = &reason {
                    warn!("{}: {e}", region.name);
                }
                let undetermined = reason.map(|e| e.to_string());
                Ok(RegionReport {
                    name: region.name,
                    series,
                    error: region.error,
                    trend,
                    undetermined,
                })
            })
            .collect()
    }

    /// Time-mean of the prepared stack, smoothed with the configured width and
    /// resampled by the configured factor.
    pub fn display_field(&self, prepared: &PreparedData) -> Result<DisplayField> {
        let mean = prepared.stack.time_mean();
        let smoothed = gaussian_smooth(&mean, self.config.smoothing_width)?;
        let grid = prepared.stack.grid();
        let (lon, lat, values) = resample(&smoothed, grid.lon(), grid.lat(), self.config.regrid_factor)?;
        Ok(DisplayField { lon, lat, values })
    }
}
