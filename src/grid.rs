//! Latitude/longitude grid geometry
//!
//! A [`Grid`] is described by its cell centers. Cell edges sit halfway between
//! neighbouring centers, and the two outer edges are extrapolated by half of
//! the adjacent spacing. [`cell_areas`] turns those edges into exact
//! surface areas of latitude-longitude quadrilaterals on a sphere.

use crate::errors::{DhSeriesError, Result};
use ndarray::Array2;

/// Mean equatorial Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6378.0;

/// Rectilinear grid of longitude (x) and latitude (y) cell centers, in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    lon: Vec<f64>,
    lat: Vec<f64>,
}

impl Grid {
    /// Build a grid from cell centers.
    ///
    /// # Errors
    ///
    /// Returns [`DhSeriesError::InvalidGrid`] if either axis has fewer than two
    /// centers, contains non-finite values, or is not strictly monotonic.
    pub fn new(lon: Vec<f64>, lat: Vec<f64>) -> Result<Self> {
        check_axis("longitude", &lon)?;
        check_axis("latitude", &lat)?;
        Ok(Self { lon, lat })
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn nx(&self) -> usize {
        self.lon.len()
    }

    pub fn ny(&self) -> usize {
        self.lat.len()
    }

    /// Spatial shape as `(ny, nx)`, the order used by every 2-D field.
    pub fn shape(&self) -> (usize, usize) {
        (self.ny(), self.nx())
    }

    pub fn lon_edges(&self) -> Vec<f64> {
        cell_edges(&self.lon)
    }

    pub fn lat_edges(&self) -> Vec<f64> {
        cell_edges(&self.lat)
    }
}

fn check_axis(name: &str, centers: &[f64]) -> Result<()> {
    if centers.len() < 2 {
        return Err(DhSeriesError::InvalidGrid(format!(
            "{name} axis needs at least 2 centers, got {}",
            centers.len()
        )));
    }
    if centers.iter().any(|c| !c.is_finite()) {
        return Err(DhSeriesError::InvalidGrid(format!(
            "{name} axis contains non-finite centers"
        )));
    }
    let increasing = centers.windows(2).all(|w| w[1] > w[0]);
    let decreasing = centers.windows(2).all(|w| w[1] < w[0]);
    if !(increasing || decreasing) {
        return Err(DhSeriesError::InvalidGrid(format!(
            "{name} axis is not strictly monotonic"
        )));
    }
    Ok(())
}

/// Edges of the cells whose centers are given. The result has one more
/// element than `centers`.
pub fn cell_edges(centers: &[f64]) -> Vec<f64> {
    let n = centers.len();
    let mut edges = Vec::with_capacity(n + 1);
    if n == 0 {
        return edges;
    }
    if n == 1 {
        edges.push(centers[0]);
        edges.push(centers[0]);
        return edges;
    }
    edges.push(centers[0] - 0.5 * (centers[1] - centers[0]));
    edges.extend(centers.windows(2).map(|w| 0.5 * (w[0] + w[1])));
    edges.push(centers[n - 1] + 0.5 * (centers[n - 1] - centers[n - 2]));
    edges
}

/// Per-cell surface area of a [`Grid`], shape `(ny, nx)`.
///
/// Built once per grid and never modified afterwards; sub-regions borrow
/// their weights from it via [`AreaGrid::select`] or [`AreaGrid::masked`].
#[derive(Debug, Clone, PartialEq)]
pub struct AreaGrid {
    area: Array2<f64>,
}

impl AreaGrid {
    /// Wrap a precomputed area array.
    ///
    /// # Errors
    ///
    /// Returns [`DhSeriesError::InvalidGrid`] if any entry is negative or not finite.
    pub fn from_array(area: Array2<f64>) -> Result<Self> {
        if area.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(DhSeriesError::InvalidGrid(
                "cell areas must be finite and non-negative".to_string(),
            ));
        }
        Ok(Self { area })
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.area
    }

    pub fn shape(&self) -> (usize, usize) {
        self.area.dim()
    }

    pub fn total(&self) -> f64 {
        self.area.sum()
    }

    /// Area grid restricted to the given rows and columns.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> AreaGrid {
        let area = Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| {
            self.area[[rows[i], cols[j]]]
        });
        AreaGrid { area }
    }

    /// Copy with the area of every cell outside `mask` set to zero.
    ///
    /// # Errors
    ///
    /// Fails if `mask` is not shaped like the area grid.
    pub fn masked(&self, mask: &Array2<bool>) -> Result<AreaGrid> {
        if mask.dim() != self.area.dim() {
            let (ny, nx) = self.area.dim();
            let (my, mx) = mask.dim();
            return Err(DhSeriesError::shape_mismatch("region mask", &[ny, nx], &[my, mx]));
        }
        let mut area = self.area.clone();
        area.zip_mut_with(mask, |a, &keep| {
            if !keep {
                *a = 0.0;
            }
        });
        Ok(AreaGrid { area })
    }
}

/// Exact area of every cell of `grid` on a sphere of the given radius.
///
/// For a cell bounded by latitudes `φ₁, φ₂` and longitudes `λ₁, λ₂` the area is
/// `R² · |sin φ₂ − sin φ₁| · |λ₂ − λ₁|` with angles in radians, so cells
/// shrink toward the poles even though they are equal-sized in degrees.
pub fn cell_areas(grid: &Grid, radius: f64) -> AreaGrid {
    let lon_edges: Vec<f64> = grid.lon_edges().into_iter().map(f64::to_radians).collect();
    let sin_lat_edges: Vec<f64> = grid
        .lat_edges()
        .into_iter()
        .map(|e| e.clamp(-90.0, 90.0).to_radians().sin())
        .collect();
    let r2 = radius * radius;

    let area = Array2::from_shape_fn(grid.shape(), |(i, j)| {
        r2 * (sin_lat_edges[i + 1] - sin_lat_edges[i]).abs() * (lon_edges[j + 1] - lon_edges[j]).abs()
    });
    AreaGrid { area }
}

/// Analytic area of the latitude band `[lat1, lat2]` spanning `dlon` degrees
/// of longitude.
pub fn band_area(lat1: f64, lat2: f64, dlon: f64, radius: f64) -> f64 {
    radius * radius * (lat2.to_radians().sin() - lat1.to_radians().sin()).abs() * dlon.to_radians().abs()
}
