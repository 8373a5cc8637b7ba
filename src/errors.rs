//! Centralized error handling for dhseries
//!
//! Every fallible operation in the crate returns [`Result`], so callers can tell
//! a configuration mistake (shape mismatch, unknown variable) apart from a data
//! condition (too few samples to fit a trend).

use thiserror::Error;

/// Main error type for dhseries operations
#[derive(Error, Debug)]
pub enum DhSeriesError {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Configuration file could not be parsed
    #[error("Could not parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Report serialisation errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Variable not found in the data source
    #[error("Variable '{var}' not found in file")]
    VariableNotFound { var: String },

    /// Two arrays that must be indexed identically are not
    #[error("Shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Coordinates that cannot describe a grid
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// Region definition that cannot be applied
    #[error("Invalid region '{region}': {reason}")]
    InvalidRegion { region: String, reason: String },

    /// Region selects no cell of the grid
    #[error("Region '{region}' does not select any grid cell")]
    EmptyRegion { region: String },

    /// Not enough valid samples to determine a fit
    #[error("Undetermined fit: needed at least {needed} valid samples, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    /// A target coordinate lies outside the source grid
    #[error("Coordinate {value} on axis '{axis}' is outside [{min}, {max}]")]
    OutOfBounds {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Settings that no analysis can run with
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

impl DhSeriesError {
    pub(crate) fn shape_mismatch(what: &str, expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            what: what.to_string(),
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

impl From<String> for DhSeriesError {
    fn from(error: String) -> Self {
        DhSeriesError::Generic(error)
    }
}

impl From<&str> for DhSeriesError {
    fn from(error: &str) -> Self {
        DhSeriesError::Generic(error.to_string())
    }
}

/// Result type alias for dhseries operations
pub type Result<T> = std::result::Result<T, DhSeriesError>;
