//! dhseries: regional elevation-change time series from gridded altimetry
//!
//! Takes `(time, lat, lon)` stacks of surface elevation change, reduces them
//! to area-weighted regional time series and fits trends to those series.
//!
//! ## Key Features
//!
//! - **Exact cell areas**: spherical latitude-longitude quadrilaterals, not degree boxes
//! - **Explicit missing data**: NaN in stacks, `None` in series; zero is only a
//!   missing marker when asked for
//! - **Regions**: bounding boxes (wrapping across 0/360), masks or the whole grid
//! - **Trend fitting**: OLS, Huber-robust line, polynomial, CV polynomial and
//!   CV lasso with deterministic folds
//! - **Display fields**: Gaussian smoothing and bilinear regridding
//! - **Parallel Processing**: per-region fan-out on Rayon
//!
//! ## Module Organization
//!
//! - [`grid`]: grid geometry and cell areas
//! - [`stack`]: data stacks, time filtering and multi-variable datasets
//! - [`mask`]: outlier clipping and sparse-series removal
//! - [`region`]: region definitions and catalogs
//! - [`aggregate`]: area-weighted spatial means
//! - [`series`]: time series and their filters
//! - [`trend`]: trend fits, rates and rate errors
//! - [`smooth`]: Gaussian smoothing of 2-D fields
//! - [`regrid`]: bilinear resampling of 2-D fields
//! - [`netcdf_io`]: NetCDF reading and writing
//! - [`config`]: TOML analysis configuration
//! - [`pipeline`]: the end-to-end regional analysis
//! - [`parallel`]: thread pool configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dhseries::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> dhseries::Result<()> {
//! let config = AnalysisConfig::default();
//! let dataset = read_dataset(Path::new("dh_grids.nc"), &config.variables)?;
//! let reports = Pipeline::new(config).run(&dataset, &RegionCatalog::antarctic())?;
//! for report in &reports {
//!     if let Some(trend) = &report.trend {
//!         println!("{}: {:.3}/yr", report.name, trend.rate);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod errors;
pub mod grid;
pub mod mask;
pub mod netcdf_io;
pub mod parallel;
pub mod pipeline;
pub mod region;
pub mod regrid;
pub mod series;
pub mod smooth;
pub mod stack;
pub mod trend;

pub use errors::{DhSeriesError, Result};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::aggregate::{
        aggregate_regions, area_weighted_mean, area_weighted_mean_err, combine_series, get_subset,
        region_mean, AllMissingPolicy, RegionSeries, WeightedSeries,
    };
    pub use crate::config::{AnalysisConfig, VariableNames};
    pub use crate::errors::{DhSeriesError, Result};
    pub use crate::grid::{cell_areas, AreaGrid, Grid, EARTH_RADIUS_KM};
    pub use crate::mask::{clip_outliers, drop_sparse_series, MaskFilter, MaskReport};
    pub use crate::netcdf_io::{read_dataset, write_area_grid, write_report_json, SeriesWriter};
    pub use crate::parallel::ParallelConfig;
    pub use crate::pipeline::{Pipeline, RegionReport};
    pub use crate::region::{Region, RegionCatalog, Selection};
    pub use crate::regrid::{bilinear_sample, resample, Extrapolation};
    pub use crate::series::{Reference, SeriesFilters, TimeSeries};
    pub use crate::smooth::gaussian_smooth;
    pub use crate::stack::{DataStack, GriddedDataset};
    pub use crate::trend::{fit_trend, TrendConfig, TrendEstimate, TrendMethod};
}
