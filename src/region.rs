//! Named regions and the catalog that holds them
//!
//! A [`Region`] selects grid cells either by a longitude/latitude bounding box,
//! by an explicit boolean mask, or as the whole grid. The same resolved mask is
//! used to carve values and area weights, so both are always indexed alike.
//!
//! Bounding boxes are inclusive on all four sides. Longitudes are compared
//! modulo 360, so a box written in 0–360 works on a −180–180 grid, and a box
//! with `lon_min > lon_max` wraps across the 0/360 seam.

use crate::errors::{DhSeriesError, Result};
use crate::grid::Grid;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a region picks its cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    BoundingBox {
        lon_min: f64,
        lon_max: f64,
        lat_min: f64,
        lat_max: f64,
    },
    /// Explicit `(ny, nx)` mask, true where the cell belongs to the region.
    Mask(Array2<bool>),
    Whole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub selection: Selection,
}

/// Rows and columns of the rectangular sub-grid that encloses a region,
/// plus the coordinates of that sub-grid.
///
/// Longitudes of a wrapping box are unwrapped so they stay monotonic.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetIndex {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
}

impl Region {
    /// A bounding-box region.
    ///
    /// # Errors
    ///
    /// Returns [`DhSeriesError::InvalidRegion`] for non-finite bounds or
    /// `lat_min > lat_max`.
    pub fn bounding_box(
        name: &str,
        lon_min: f64,
        lon_max: f64,
        lat_min: f64,
        lat_max: f64,
    ) -> Result<Self> {
        let invalid = |reason: &str| DhSeriesError::InvalidRegion {
            region: name.to_string(),
            reason: reason.to_string(),
        };
        if ![lon_min, lon_max, lat_min, lat_max].iter().all(|v| v.is_finite()) {
            return Err(invalid("bounds must be finite"));
        }
        if lat_min > lat_max {
            return Err(invalid("lat_min is greater than lat_max"));
        }
        Ok(Self {
            name: name.to_string(),
            selection: Selection::BoundingBox {
                lon_min,
                lon_max,
                lat_min,
                lat_max,
            },
        })
    }

    pub fn mask(name: &str, mask: Array2<bool>) -> Self {
        Self {
            name: name.to_string(),
            selection: Selection::Mask(mask),
        }
    }

    pub fn whole(name: &str) -> Self {
        Self {
            name: name.to_string(),
            selection: Selection::Whole,
        }
    }

    /// Boolean `(ny, nx)` mask of the cells of `grid` that belong to this region.
    ///
    /// # Errors
    ///
    /// Fails if an explicit mask is not shaped like the grid.
    pub fn cell_mask(&self, grid: &Grid) -> Result<Array2<bool>> {
        match &self.selection {
            Selection::Whole => Ok(Array2::from_elem(grid.shape(), true)),
            Selection::Mask(mask) => {
                if mask.dim() != grid.shape() {
                    let (ny, nx) = grid.shape();
                    let (my, mx) = mask.dim();
                    return Err(DhSeriesError::shape_mismatch(
                        &format!("mask of region '{}'", self.name),
                        &[ny, nx],
                        &[my, mx],
                    ));
                }
                Ok(mask.clone())
            }
            Selection::BoundingBox {
                lon_min,
                lon_max,
                lat_min,
                lat_max,
            } => {
                let lon_in: Vec<bool> = grid
                    .lon()
                    .iter()
                    .map(|&x| lon_offset(x, *lon_min, *lon_max).is_some())
                    .collect();
                let lat_in: Vec<bool> = grid
                    .lat()
                    .iter()
                    .map(|&y| y >= *lat_min && y <= *lat_max)
                    .collect();
                Ok(Array2::from_shape_fn(grid.shape(), |(i, j)| lat_in[i] && lon_in[j]))
            }
        }
    }

    /// Mask that selects at least one cell.
    ///
    /// # Errors
    ///
    /// Returns [`DhSeriesError::EmptyRegion`] when the region misses the grid.
    pub fn nonempty_mask(&self, grid: &Grid) -> Result<Array2<bool>> {
        let mask = self.cell_mask(grid)?;
        if !mask.iter().any(|&m| m) {
            return Err(DhSeriesError::EmptyRegion {
                region: self.name.clone(),
            });
        }
        Ok(mask)
    }

    /// Enclosing sub-grid of this region on `grid`.
    pub fn subset_index(&self, grid: &Grid) -> Result<SubsetIndex> {
        let mask = self.nonempty_mask(grid)?;
        let rows: Vec<usize> = mask
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().any(|&m| m))
            .map(|(i, _)| i)
            .collect();
        let mut cols: Vec<usize> = mask
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, col)| col.iter().any(|&m| m))
            .map(|(j, _)| j)
            .collect();
        let lat = rows.iter().map(|&i| grid.lat()[i]).collect();

        let lon = match &self.selection {
            Selection::BoundingBox { lon_min, lon_max, .. } => {
                let offset = |j: usize| lon_offset(grid.lon()[j], *lon_min, *lon_max).unwrap_or(0.0);
                cols.sort_by(|&a, &b| offset(a).total_cmp(&offset(b)));
                cols.iter().map(|&j| lon_min + offset(j)).collect()
            }
            _ => cols.iter().map(|&j| grid.lon()[j]).collect(),
        };

        Ok(SubsetIndex { rows, cols, lon, lat })
    }
}

/// Distance east of `lon_min` if `x` lies in the (possibly wrapping) box.
fn lon_offset(x: f64, lon_min: f64, lon_max: f64) -> Option<f64> {
    let width = lon_max - lon_min;
    let offset = (x - lon_min).rem_euclid(360.0);
    if width >= 360.0 {
        return Some(offset);
    }
    let span = if width >= 0.0 { width } else { width.rem_euclid(360.0) };
    (offset <= span + 1e-9).then_some(offset)
}

/// Serialisable form of a region, as written in configuration files.
///
/// A missing `bbox` means the whole grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDef {
    pub name: String,
    /// `[lon_min, lon_max, lat_min, lat_max]` in degrees.
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
}

impl TryFrom<RegionDef> for Region {
    type Error = DhSeriesError;

    fn try_from(def: RegionDef) -> Result<Self> {
        match def.bbox {
            Some([lon_min, lon_max, lat_min, lat_max]) => {
                Region::bounding_box(&def.name, lon_min, lon_max, lat_min, lat_max)
            }
            None => Ok(Region::whole(&def.name)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    regions: Vec<RegionDef>,
}

/// Ordered collection of uniquely named regions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionCatalog {
    regions: Vec<Region>,
}

impl RegionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`DhSeriesError::InvalidRegion`] if the name is already taken.
    pub fn insert(&mut self, region: Region) -> Result<()> {
        if self.get(&region.name).is_some() {
            return Err(DhSeriesError::InvalidRegion {
                region: region.name,
                reason: "duplicate region name".to_string(),
            });
        }
        self.regions.push(region);
        Ok(())
    }

    pub fn from_defs(defs: Vec<RegionDef>) -> Result<Self> {
        let mut catalog = Self::new();
        for def in defs {
            catalog.insert(Region::try_from(def)?)?;
        }
        Ok(catalog)
    }

    /// Parse a `[[regions]]` table list.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(text)?;
        Self::from_defs(file.regions)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Whether the regions are pairwise disjoint on `grid` and together cover
    /// every cell.
    pub fn is_partition(&self, grid: &Grid) -> Result<bool> {
        let mut hits = Array2::<u32>::zeros(grid.shape());
        for region in &self.regions {
            let mask = region.cell_mask(grid)?;
            hits.zip_mut_with(&mask, |h, &m| {
                if m {
                    *h += 1;
                }
            });
        }
        Ok(hits.iter().all(|&h| h == 1))
    }

    /// Approximate boxes for the major Antarctic ice-shelf systems, longitudes
    /// in 0–360, plus the whole grid as "All Antarctica".
    pub fn antarctic() -> Self {
        let boxes: [(&str, f64, f64, f64, f64); 8] = [
            ("Queen Maud", 350.0, 40.0, -72.0, -68.0),
            ("Amery", 66.0, 75.0, -74.5, -67.5),
            ("Wilkes-Victoria", 85.0, 165.0, -70.0, -64.0),
            ("Ross", 154.0, 204.0, -86.0, -77.0),
            ("Amundsen", 225.0, 262.0, -76.0, -72.0),
            ("Bellingshausen", 262.0, 295.0, -73.5, -68.0),
            ("Larsen", 295.0, 305.0, -70.0, -64.0),
            ("Filchner-Ronne", 278.0, 334.0, -83.0, -74.0),
        ];
        let mut regions: Vec<Region> = boxes
            .iter()
            .map(|&(name, lon_min, lon_max, lat_min, lat_max)| Region {
                name: name.to_string(),
                selection: Selection::BoundingBox {
                    lon_min,
                    lon_max,
                    lat_min,
                    lat_max,
                },
            })
            .collect();
        regions.push(Region::whole("All Antarctica"));
        Self { regions }
    }
}

impl<'a> IntoIterator for &'a RegionCatalog {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}
