//! NetCDF input and output
//!
//! Reads the time axis, the grid centers and the named `(time, lat, lon)`
//! variables of a gridded altimetry file into a [`GriddedDataset`], and writes
//! area grids, display fields and per-region series back out with a
//! `history` attribute. The JSON report is written alongside with
//! `serde_json`.

use crate::config::VariableNames;
use crate::errors::{DhSeriesError, Result};
use crate::grid::{AreaGrid, Grid};
use crate::pipeline::RegionReport;
use crate::stack::GriddedDataset;
use chrono::Utc;
use log::{debug, info};
use ndarray::{Array2, Array3};
use netcdf::{create, open, AttributeValue, File, Variable};
use std::collections::HashMap;
use std::{fs, path::Path};

fn variable<'f>(file: &'f File, name: &str) -> Result<Variable<'f>> {
    file.variable(name)
        .ok_or_else(|| DhSeriesError::VariableNotFound {
            var: name.to_string(),
        })
}

/// Numeric value of a fill attribute, if the variable has one.
fn fill_value(var: &Variable<'_>, attribute: &str) -> Option<f64> {
    var.attribute(attribute)
        .and_then(|attr| match attr.value().ok()? {
            AttributeValue::Float(v) => Some(f64::from(v)),
            AttributeValue::Double(v) => Some(v),
            AttributeValue::Short(v) => Some(f64::from(v)),
            AttributeValue::Int(v) => Some(f64::from(v)),
            _ => None,
        })
}

/// All values of a variable as `f64`, with fill values replaced by NaN.
fn read_values(var: &Variable<'_>) -> Result<Vec<f64>> {
    let mut data: Vec<f64> = var.get_values::<f64, _>(..)?;
    let fills: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|attr| fill_value(var, attr))
        .collect();
    if !fills.is_empty() {
        for v in data.iter_mut() {
            if fills.contains(v) {
                *v = f64::NAN;
            }
        }
    }
    Ok(data)
}

fn read_axis(file: &File, name: &str) -> Result<Vec<f64>> {
    let var = variable(file, name)?;
    if var.dimensions().len() != 1 {
        return Err(DhSeriesError::Generic(format!(
            "coordinate variable '{name}' must be one-dimensional"
        )));
    }
    read_values(&var)
}

/// A 3-D variable as `(time, lat, lon)`. Variables stored `(time, lon, lat)`
/// are transposed.
fn read_cube(file: &File, name: &str, names: &VariableNames, shape: (usize, usize, usize)) -> Result<Array3<f64>> {
    let var = variable(file, name)?;
    let dims: Vec<(String, usize)> = var
        .dimensions()
        .iter()
        .map(|d| (d.name(), d.len()))
        .collect();
    let lens: Vec<usize> = dims.iter().map(|(_, len)| *len).collect();
    let (nz, ny, nx) = shape;

    let lon_second = dims.get(1).map_or(false, |(dim, _)| *dim == names.lon);
    let data = read_values(&var)?;
    if lens == [nz, ny, nx] && !lon_second {
        Ok(Array3::from_shape_vec((nz, ny, nx), data)?)
    } else if lens == [nz, nx, ny] {
        debug!("transposing '{name}' from (time, lon, lat)");
        let stored = Array3::from_shape_vec((nz, nx, ny), data)?;
        Ok(stored.permuted_axes([0, 2, 1]).as_standard_layout().to_owned())
    } else {
        Err(DhSeriesError::shape_mismatch(&format!("variable '{name}'"), &[nz, ny, nx], &lens))
    }
}

/// Load the coordinates and every data variable named in `names`.
///
/// # Errors
///
/// [`DhSeriesError::VariableNotFound`] for a missing variable and
/// [`DhSeriesError::ShapeMismatch`] when a variable does not span
/// `(time, lat, lon)`.
pub fn read_dataset(path: &Path, names: &VariableNames) -> Result<GriddedDataset> {
    let file = open(path)?;
    let time = read_axis(&file, &names.time)?;
    let lon = read_axis(&file, &names.lon)?;
    let lat = read_axis(&file, &names.lat)?;
    let grid = Grid::new(lon, lat)?;
    let shape = (time.len(), grid.ny(), grid.nx());

    let mut dataset = GriddedDataset::new(time, grid)?;
    for name in names.data_variables() {
        let cube = read_cube(&file, name, names, shape)?;
        dataset.insert(name, cube)?;
    }
    info!(
        "loaded {} from {} ({} × {} × {})",
        names.data_variables().join(", "),
        path.display(),
        shape.0,
        shape.1,
        shape.2
    );
    Ok(dataset)
}

fn history() -> String {
    format!("Created by dhseries on {}", Utc::now().to_rfc3339())
}

/// Create `path`, replacing any existing file.
fn create_fresh(path: &Path) -> Result<netcdf::FileMut> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(create(path)?)
}

fn write_2d(path: &Path, lon: &[f64], lat: &[f64], var_name: &str, units: &str, data: &Array2<f64>) -> Result<()> {
    if data.dim() != (lat.len(), lon.len()) {
        return Err(DhSeriesError::shape_mismatch(
            &format!("field '{var_name}'"),
            &[lat.len(), lon.len()],
            &[data.nrows(), data.ncols()],
        ));
    }
    let mut file = create_fresh(path)?;
    file.add_dimension("lat", lat.len())?;
    file.add_dimension("lon", lon.len())?;

    let mut lat_var = file.add_variable::<f64>("lat", &["lat"])?;
    lat_var.put_attribute("units", "degrees_north")?;
    lat_var.put_values(lat, ..)?;

    let mut lon_var = file.add_variable::<f64>("lon", &["lon"])?;
    lon_var.put_attribute("units", "degrees_east")?;
    lon_var.put_values(lon, ..)?;

    let mut var = file.add_variable::<f64>(var_name, &["lat", "lon"])?;
    var.put_attribute("units", units)?;
    var.put(data.view(), ..)?;

    file.add_attribute("history", history())?;
    Ok(())
}

/// Persist a cell-area grid (km²) so later runs can reuse it.
pub fn write_area_grid(path: &Path, grid: &Grid, area: &AreaGrid) -> Result<()> {
    write_2d(path, grid.lon(), grid.lat(), "area", "km2", area.values())
}

/// Read an area grid written by [`write_area_grid`], checked against `grid`.
pub fn read_area_grid(path: &Path, grid: &Grid) -> Result<AreaGrid> {
    let file = open(path)?;
    let var = variable(&file, "area")?;
    let data = read_values(&var)?;
    let area = Array2::from_shape_vec(grid.shape(), data).map_err(|_| {
        let (ny, nx) = grid.shape();
        let got: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        DhSeriesError::shape_mismatch("area grid", &[ny, nx], &got)
    })?;
    AreaGrid::from_array(area)
}

/// Write a 2-D display field with its own coordinate axes.
pub fn write_field(path: &Path, lon: &[f64], lat: &[f64], var_name: &str, units: &str, field: &Array2<f64>) -> Result<()> {
    write_2d(path, lon, lat, var_name, units, field)
}

/// NetCDF-safe variable name for a region.
pub fn variable_name(region: &str) -> String {
    let name: String = region
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("r_{name}")
    } else {
        name
    }
}

/// Check that every region gets its own NetCDF variables in a series file.
///
/// Each region may produce `<name>`, `<name>_error` and `<name>_fit`; none of
/// these may coincide with another region's or with `time`.
///
/// # Errors
///
/// Returns [`DhSeriesError::InvalidRegion`] for the first region whose
/// variables clash.
pub fn check_variable_names<'r>(regions: impl IntoIterator<Item = &'r str>) -> Result<()> {
    let mut taken: HashMap<String, String> = HashMap::new();
    taken.insert("time".to_string(), "the time axis".to_string());
    for region in regions {
        let base = variable_name(region);
        for name in [base.clone(), format!("{base}_error"), format!("{base}_fit")] {
            if let Some(owner) = taken.get(&name) {
                return Err(DhSeriesError::InvalidRegion {
                    region: region.to_string(),
                    reason: format!("NetCDF variable '{name}' is already used by {owner}"),
                });
            }
            taken.insert(name, format!("region '{region}'"));
        }
    }
    Ok(())
}

/// Writer for per-region series over a shared `time` dimension.
pub struct SeriesWriter<'a> {
    output_path: &'a Path,
    units: Option<&'a str>,
}

impl<'a> SeriesWriter<'a> {
    pub fn new(output_path: &'a Path) -> Self {
        Self {
            output_path,
            units: None,
        }
    }

    /// Units attribute for the series and their errors.
    pub fn with_units(mut self, units: &'a str) -> Self {
        self.units = Some(units);
        self
    }

    /// One variable per region holding the mean series, plus `<name>_error`
    /// and `<name>_fit` where available. Trend results are attached as
    /// attributes of the mean variable.
    ///
    /// Region names are checked with [`check_variable_names`] before the file
    /// is touched.
    pub fn write(&self, time: &[f64], reports: &[RegionReport]) -> Result<()> {
        check_variable_names(reports.iter().map(|r| r.name.as_str()))?;
        if let Some(report) = reports.iter().find(|r| r.series.time() != time) {
            return Err(DhSeriesError::shape_mismatch(
                &format!("series '{}'", report.name),
                &[time.len()],
                &[report.series.len()],
            ));
        }
        let mut file = create_fresh(self.output_path)?;
        file.add_dimension("time", time.len())?;

        let mut time_var = file.add_variable::<f64>("time", &["time"])?;
        time_var.put_attribute("units", "years")?;
        time_var.put_values(time, ..)?;

        for report in reports {
            let base = variable_name(&report.name);

            let mut var = file.add_variable::<f64>(&base, &["time"])?;
            var.put_attribute("long_name", report.name.as_str())?;
            var.put_attribute("valid_samples", report.series.valid_count() as i32)?;
            if let Some(units) = self.units {
                var.put_attribute("units", units)?;
            }
            if let Some(trend) = &report.trend {
                var.put_attribute("trend_method", trend.method.as_str())?;
                var.put_attribute("rate", trend.rate)?;
                var.put_attribute("slope", trend.slope)?;
                var.put_attribute("intercept", trend.intercept)?;
                if let Some(err) = trend.rate_error {
                    var.put_attribute("rate_error", err)?;
                }
            }
            var.put_values(&report.series.to_floats(), ..)?;

            if let Some(error) = &report.error {
                let mut err_var = file.add_variable::<f64>(&format!("{base}_error"), &["time"])?;
                err_var.put_attribute("long_name", format!("{} error", report.name))?;
                if let Some(units) = self.units {
                    err_var.put_attribute("units", units)?;
                }
                err_var.put_values(&error.to_floats(), ..)?;
            }

            if let Some(trend) = &report.trend {
                let fitted: Vec<f64> = trend.curve.iter().map(|(_, v)| *v).collect();
                let mut fit_var = file.add_variable::<f64>(&format!("{base}_fit"), &["time"])?;
                fit_var.put_attribute("long_name", format!("{} {} fit", report.name, trend.method.as_str()))?;
                fit_var.put_values(&fitted, ..)?;
            }
        }

        file.add_attribute("history", history())?;
        Ok(())
    }
}

/// Per-region report serialised as pretty-printed JSON.
pub fn write_report_json(path: &Path, reports: &[RegionReport]) -> Result<()> {
    let text = serde_json::to_string_pretty(reports)?;
    fs::write(path, text)?;
    Ok(())
}
