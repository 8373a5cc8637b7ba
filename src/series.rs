//! Per-region time series and the light filters applied to them before
//! trend fitting.
//!
//! Missing samples are `None`, never a sentinel number.

use crate::errors::{DhSeriesError, Result};
use crate::trend::linear::linear_fit;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// What to subtract from a series so it is expressed relative to a baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    #[default]
    None,
    Mean,
    First,
}

/// Ordered `(time, value)` samples aligned with a stack's time axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub name: String,
    time: Vec<f64>,
    values: Vec<Option<f64>>,
}

impl TimeSeries {
    /// # Errors
    ///
    /// Returns [`DhSeriesError::ShapeMismatch`] if the two vectors differ in length.
    pub fn new(name: &str, time: Vec<f64>, values: Vec<Option<f64>>) -> Result<Self> {
        if time.len() != values.len() {
            return Err(DhSeriesError::shape_mismatch(
                &format!("series '{name}'"),
                &[time.len()],
                &[values.len()],
            ));
        }
        Ok(Self {
            name: name.to_string(),
            time,
            values,
        })
    }

    /// Build from plain floats, mapping every non-finite value to `None`.
    pub fn from_floats(name: &str, time: Vec<f64>, values: &[f64]) -> Result<Self> {
        let values = values.iter().map(|&v| v.is_finite().then_some(v)).collect();
        Self::new(name, time, values)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().flatten().count()
    }

    /// Times and values of the non-missing samples.
    pub fn valid_pairs(&self) -> (Vec<f64>, Vec<f64>) {
        self.time
            .iter()
            .zip(&self.values)
            .filter_map(|(&t, v)| v.map(|v| (t, v)))
            .unzip()
    }

    /// Values with missing samples as NaN, for writers and plotting code.
    pub fn to_floats(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
    }

    fn with_values(&self, values: Vec<Option<f64>>) -> Self {
        Self {
            name: self.name.clone(),
            time: self.time.clone(),
            values,
        }
    }

    /// Missing samples replaced by `value`.
    pub fn fill_missing(&self, value: f64) -> Self {
        self.with_values(self.values.iter().map(|v| Some(v.unwrap_or(value))).collect())
    }

    /// Series shifted so the chosen baseline is zero. A series with no valid
    /// sample is returned unchanged.
    pub fn referenced(&self, reference: Reference) -> Self {
        let (_, valid) = self.valid_pairs();
        let offset = match reference {
            Reference::None => return self.clone(),
            Reference::Mean if !valid.is_empty() => valid.iter().sum::<f64>() / valid.len() as f64,
            Reference::First if !valid.is_empty() => valid[0],
            _ => return self.clone(),
        };
        self.with_values(self.values.iter().map(|v| v.map(|v| v - offset)).collect())
    }

    /// Rate of change by finite differences with constant sample spacing `dt`:
    /// centred in the interior, one-sided at both ends. A derivative is missing
    /// wherever one of the samples it needs is missing.
    pub fn gradient(&self, dt: f64) -> Self {
        let n = self.values.len();
        let v = &self.values;
        let out = (0..n)
            .map(|i| {
                if n < 2 {
                    return None;
                }
                let (a, b, h) = if i == 0 {
                    (v[0], v[1], dt)
                } else if i == n - 1 {
                    (v[n - 2], v[n - 1], dt)
                } else {
                    (v[i - 1], v[i + 1], 2.0 * dt)
                };
                Some((b? - a?) / h)
            })
            .collect();
        self.with_values(out)
    }

    /// Series with its least-squares straight line removed.
    pub fn detrend(&self) -> Result<Self> {
        let (t, y) = self.valid_pairs();
        let fit = linear_fit(&t, &y)?;
        Ok(self.with_values(
            self.time
                .iter()
                .zip(&self.values)
                .map(|(&t, v)| v.map(|v| v - (fit.slope * t + fit.intercept)))
                .collect(),
        ))
    }

    /// Hodrick-Prescott trend component with smoothing parameter `lambda`.
    ///
    /// Valid samples are treated as consecutive; missing samples stay missing.
    ///
    /// # Errors
    ///
    /// Needs at least three valid samples.
    pub fn hp_filter(&self, lambda: f64) -> Result<Self> {
        let (_, y) = self.valid_pairs();
        let n = y.len();
        if n < 3 {
            return Err(DhSeriesError::InsufficientSamples { needed: 3, got: n });
        }

        // Second-difference operator D, (n - 2) × n.
        let mut d = DMatrix::<f64>::zeros(n - 2, n);
        for i in 0..n - 2 {
            d[(i, i)] = 1.0;
            d[(i, i + 1)] = -2.0;
            d[(i, i + 2)] = 1.0;
        }
        let system = DMatrix::<f64>::identity(n, n) + (d.transpose() * &d) * lambda;
        let rhs = DVector::from_vec(y);
        let trend = system
            .cholesky()
            .ok_or_else(|| DhSeriesError::Generic("HP filter system is not positive definite".to_string()))?
            .solve(&rhs);

        let mut k = 0;
        let values = self
            .values
            .iter()
            .map(|v| {
                v.map(|_| {
                    let out = trend[k];
                    k += 1;
                    out
                })
            })
            .collect();
        Ok(self.with_values(values))
    }

    /// Plotting range: the floor of the minimum and the ceiling of the
    /// maximum valid value, widened so that zero is always included.
    pub fn limits(&self) -> Option<(f64, f64)> {
        let (_, y) = self.valid_pairs();
        if y.is_empty() {
            return None;
        }
        let min = y.iter().copied().fold(f64::INFINITY, f64::min).min(0.0);
        let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(0.0);
        Some((min.floor(), max.ceil()))
    }
}

/// Optional transforms applied to every regional series before its trend is
/// fitted. They run in a fixed order: fill, Hodrick-Prescott, detrend,
/// gradient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesFilters {
    /// Replace missing samples by this value.
    pub fill_missing: Option<f64>,
    /// Keep only the Hodrick-Prescott trend with this smoothing parameter.
    pub hp_lambda: Option<f64>,
    pub detrend: bool,
    /// Replace the series by its rate of change for this sample spacing (years).
    pub gradient_dt: Option<f64>,
}

impl SeriesFilters {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(lambda) = self.hp_lambda {
            if !(lambda.is_finite() && lambda >= 0.0) {
                return Err(DhSeriesError::InvalidConfig(format!(
                    "hp_lambda must be finite and non-negative, got {lambda}"
                )));
            }
        }
        if let Some(dt) = self.gradient_dt {
            if !(dt.is_finite() && dt > 0.0) {
                return Err(DhSeriesError::InvalidConfig(format!(
                    "gradient_dt must be positive, got {dt}"
                )));
            }
        }
        if self.fill_missing.map_or(false, |v| !v.is_finite()) {
            return Err(DhSeriesError::InvalidConfig(
                "fill_missing must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates [`DhSeriesError::InsufficientSamples`] from the
    /// Hodrick-Prescott filter and detrending.
    pub fn apply(&self, series: &TimeSeries) -> Result<TimeSeries> {
        let mut out = match self.fill_missing {
            Some(value) => series.fill_missing(value),
            None => series.clone(),
        };
        if let Some(lambda) = self.hp_lambda {
            out = out.hp_filter(lambda)?;
        }
        if self.detrend {
            out = out.detrend()?;
        }
        if let Some(dt) = self.gradient_dt {
            out = out.gradient(dt);
        }
        Ok(out)
    }
}
