//! Thread pool configuration
//!
//! Region fan-out, slice reductions and smoothing passes all run on Rayon's
//! global pool; this module sizes it once at startup.

use crate::errors::{DhSeriesError, Result};
use log::{debug, info};
use rayon::ThreadPoolBuilder;

/// Configuration for parallel processing
#[derive(Debug, Clone, Default)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Set up the global Rayon thread pool with the specified configuration
    pub fn setup_global_pool(&self) -> Result<()> {
        match self.num_threads {
            Some(0) => Err(DhSeriesError::ThreadPool(
                "thread count must be at least 1".to_string(),
            )),
            Some(num_threads) => {
                ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build_global()
                    .map_err(|e| {
                        DhSeriesError::ThreadPool(format!(
                            "Failed to initialize thread pool with {} threads: {}",
                            num_threads, e
                        ))
                    })?;
                info!("Configured parallel processing with {} threads", num_threads);
                Ok(())
            }
            None => {
                debug!("Using default thread pool configuration");
                Ok(())
            }
        }
    }

    /// Create a configuration that uses all available CPU cores
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
}

impl ParallelInfo {
    pub fn current() -> Self {
        Self {
            current_threads: rayon::current_num_threads(),
            available_cores: num_cpus::get(),
        }
    }

    pub fn log(&self) {
        debug!(
            "Rayon threads: {}, available CPU cores: {}",
            self.current_threads, self.available_cores
        );
    }
}
