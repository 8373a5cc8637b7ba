//! Analysis configuration loaded from TOML
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration. A minimal file looks like:
//!
//! ```toml
//! min_valid_samples = 10
//! reference = "mean"
//!
//! [variables]
//! data = "dh_mean_mixed_const_xcal"
//! error = "dh_error_xcal"
//!
//! [trend]
//! method = "lasso_cv"
//! fold_strategy = "interleaved"
//!
//! [series_filters]
//! fill_missing = 0.0
//!
//! [[regions]]
//! name = "Amery"
//! bbox = [66.0, 75.0, -74.5, -67.5]
//! ```

use crate::aggregate::AllMissingPolicy;
use crate::errors::{DhSeriesError, Result};
use crate::grid::EARTH_RADIUS_KM;
use crate::mask::MaskFilter;
use crate::region::{RegionCatalog, RegionDef};
use crate::series::{Reference, SeriesFilters};
use crate::trend::TrendConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Names of the coordinate and data variables in the input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableNames {
    pub time: String,
    pub lon: String,
    pub lat: String,
    /// Elevation-change variable, `(time, lat, lon)`.
    pub data: String,
    /// Optional per-cell error variable with the same shape as `data`.
    pub error: Option<String>,
}

impl Default for VariableNames {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            lon: "lon".to_string(),
            lat: "lat".to_string(),
            data: "dh_mean_mixed_const_xcal".to_string(),
            error: None,
        }
    }
}

impl VariableNames {
    /// Every 3-D variable that has to be read.
    pub fn data_variables(&self) -> Vec<&str> {
        std::iter::once(self.data.as_str())
            .chain(self.error.as_deref())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub variables: VariableNames,
    /// Multiplier applied to data and error values after loading (e.g. `100`
    /// for meters to centimeters).
    pub scale: f64,
    /// Units of the values after scaling, written to output files.
    pub units: String,
    /// Cells with fewer valid samples are dropped; `0` disables the filter.
    pub min_valid_samples: usize,
    /// Values with a larger magnitude are treated as missing.
    pub abs_bound: Option<f64>,
    /// Treat exact zeros in the input as missing.
    pub zero_is_missing: bool,
    pub all_missing: AllMissingPolicy,
    pub from_time: Option<f64>,
    pub to_time: Option<f64>,
    pub reference: Reference,
    /// Sphere radius for cell areas, in kilometers.
    pub earth_radius: f64,
    /// Precomputed area grid (as written by `write_area_grid`) used instead
    /// of computing cell areas.
    pub area_file: Option<PathBuf>,
    pub series_filters: SeriesFilters,
    pub trend: TrendConfig,
    /// Gaussian standard deviation for display fields, in grid cells.
    pub smoothing_width: f64,
    /// Densification factor for display fields.
    pub regrid_factor: usize,
    pub regions: Vec<RegionDef>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            variables: VariableNames::default(),
            scale: 1.0,
            units: "m".to_string(),
            min_valid_samples: 10,
            abs_bound: None,
            zero_is_missing: false,
            all_missing: AllMissingPolicy::default(),
            from_time: None,
            to_time: None,
            reference: Reference::default(),
            earth_radius: EARTH_RADIUS_KM,
            area_file: None,
            series_filters: SeriesFilters::default(),
            trend: TrendConfig::default(),
            smoothing_width: 1.5,
            regrid_factor: 10,
            regions: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Parse and [`validate`](Self::validate) a configuration.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that would otherwise only fail deep inside a run,
    /// or fail disguised as missing data.
    ///
    /// # Errors
    ///
    /// Returns [`DhSeriesError::InvalidConfig`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DhSeriesError::InvalidConfig(msg));
        if !(self.scale.is_finite() && self.scale != 0.0) {
            return invalid(format!("scale must be finite and non-zero, got {}", self.scale));
        }
        if !(self.earth_radius.is_finite() && self.earth_radius > 0.0) {
            return invalid(format!("earth_radius must be positive, got {}", self.earth_radius));
        }
        if let Some(bound) = self.abs_bound {
            if !(bound >= 0.0) {
                return invalid(format!("abs_bound must be non-negative, got {bound}"));
            }
        }
        if let (Some(from), Some(to)) = (self.from_time, self.to_time) {
            if from > to {
                return invalid(format!("from_time {from} is after to_time {to}"));
            }
        }
        if !(self.smoothing_width.is_finite() && self.smoothing_width >= 0.0) {
            return invalid(format!(
                "smoothing_width must be non-negative, got {}",
                self.smoothing_width
            ));
        }
        if self.regrid_factor == 0 {
            return invalid("regrid_factor must be at least 1".to_string());
        }
        self.series_filters.validate()?;
        self.trend.validate()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The mask filter described by this configuration.
    pub fn mask_filter(&self) -> MaskFilter {
        let mut filter = MaskFilter::new();
        if let Some(bound) = self.abs_bound {
            filter = filter.with_abs_bound(bound);
        }
        if self.min_valid_samples > 0 {
            filter = filter.with_min_valid_samples(self.min_valid_samples);
        }
        filter
    }

    /// Regions listed inline in the configuration, or `None` if there are none.
    pub fn region_catalog(&self) -> Result<Option<RegionCatalog>> {
        if self.regions.is_empty() {
            return Ok(None);
        }
        RegionCatalog::from_defs(self.regions.clone()).map(Some)
    }
}
