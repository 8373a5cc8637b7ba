//! Defines command-line interface options using `clap` for the dhseries application.

use crate::config::AnalysisConfig;
use crate::region::RegionDef;
use crate::trend::TrendMethod;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Regional elevation-change time series and trends from gridded altimetry
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    name = "dhseries",
    about = "Area-weighted regional time series and trends from gridded elevation-change stacks"
)]
pub struct Args {
    /// Path to the NetCDF file with the (time, lat, lon) stacks
    #[arg(short, long, required_unless_present = "list_regions")]
    pub file: Option<PathBuf>,

    /// TOML analysis configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// TOML file with a [[regions]] list, replacing the built-in catalog
    #[arg(long)]
    pub regions: Option<PathBuf>,

    /// Precomputed cell-area grid (NetCDF with an `area` variable), used instead of computing areas
    #[arg(long)]
    pub area: Option<PathBuf>,

    /// Extra bounding-box region, formatted as <name>:<lon_min>:<lon_max>:<lat_min>:<lat_max>
    #[arg(long, value_parser = parse_region_arg)]
    pub region: Vec<RegionDef>,

    /// Trend method: linear, robust, polynomial, polyfit_cv or lasso_cv
    #[arg(long, value_parser = parse_method_arg)]
    pub method: Option<TrendMethod>,

    /// Only use samples at or after this decimal year
    #[arg(long)]
    pub from: Option<f64>,

    /// Only use samples at or before this decimal year
    #[arg(long)]
    pub to: Option<f64>,

    /// Path to save the regional series as NetCDF
    #[arg(long)]
    pub output_netcdf: Option<PathBuf>,

    /// Path to save the per-region report as JSON
    #[arg(long)]
    pub output_json: Option<PathBuf>,

    /// Path to save the cell-area grid as NetCDF
    #[arg(long)]
    pub output_area: Option<PathBuf>,

    /// Path to save the smoothed, regridded time-mean field as NetCDF
    #[arg(long)]
    pub output_field: Option<PathBuf>,

    /// List the regions that would be analysed and exit
    #[arg(long)]
    pub list_regions: bool,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Fold command-line overrides into a loaded configuration.
    pub fn apply_overrides(&self, config: &mut AnalysisConfig) {
        if let Some(method) = self.method {
            config.trend.method = method;
        }
        if self.from.is_some() {
            config.from_time = self.from;
        }
        if self.to.is_some() {
            config.to_time = self.to;
        }
        if self.area.is_some() {
            config.area_file = self.area.clone();
        }
    }
}

pub fn parse_region_arg(s: &str) -> Result<RegionDef, String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [name, bounds @ ..] if bounds.len() == 4 && !name.is_empty() => {
            let mut bbox = [0.0; 4];
            for (slot, text) in bbox.iter_mut().zip(bounds) {
                *slot = text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid bound '{}' for region '{}'", text, name))?;
            }
            Ok(RegionDef {
                name: name.to_string(),
                bbox: Some(bbox),
            })
        }
        _ => Err("Invalid format: Expected '<name>:<lon_min>:<lon_max>:<lat_min>:<lat_max>'.".to_string()),
    }
}

fn parse_method_arg(s: &str) -> Result<TrendMethod, String> {
    match s {
        "linear" => Ok(TrendMethod::Linear),
        "robust" => Ok(TrendMethod::Robust),
        "polynomial" => Ok(TrendMethod::Polynomial),
        "polyfit_cv" => Ok(TrendMethod::PolyfitCv),
        "lasso_cv" => Ok(TrendMethod::LassoCv),
        _ => Err(format!("Unknown trend method '{}'", s)),
    }
}
