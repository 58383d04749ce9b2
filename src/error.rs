//! Pipeline error kinds.
//!
//! Mirrors the manual `Display` + `std::error::Error` style used throughout
//! the collector layer rather than pulling in a derive-macro error crate.

use std::fmt;

#[derive(Debug)]
pub enum PipelineError {
    /// Missing required column, negative dimension, unparseable timestamp.
    InvalidInput(String),
    /// Unresolvable schema, or rulebook `meta.version` prefix isn't "2".
    BadRulebookBinding(String),
    /// `length_m <= 0` or `width_m <= 0`.
    InvalidSegment(String),
    /// Run completed but no bin ever had nonzero count/density.
    EmptyOccupancy {
        occupied_bins: usize,
        nonzero_density_bins: usize,
    },
    /// Coarsening exhausted its strategy steps without meeting budget.
    BudgetExceeded { bin_size_km: f64, dt_seconds: u32 },
    /// Serializer would exceed the gzip size cap or the feature cap.
    DatasetTooLarge(String),
    /// Unrecoverable filesystem/object-store error.
    IoFailure(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            PipelineError::BadRulebookBinding(msg) => write!(f, "bad rulebook binding: {msg}"),
            PipelineError::InvalidSegment(msg) => write!(f, "invalid segment: {msg}"),
            PipelineError::EmptyOccupancy {
                occupied_bins,
                nonzero_density_bins,
            } => write!(
                f,
                "empty occupancy: occupied_bins={occupied_bins} nonzero_density_bins={nonzero_density_bins}"
            ),
            PipelineError::BudgetExceeded {
                bin_size_km,
                dt_seconds,
            } => write!(
                f,
                "budget exceeded: final bin_size_km={bin_size_km} dt_seconds={dt_seconds}"
            ),
            PipelineError::DatasetTooLarge(msg) => write!(f, "dataset too large: {msg}"),
            PipelineError::IoFailure(msg) => write!(f, "io failure: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IoFailure(e.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        PipelineError::InvalidInput(e.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        PipelineError::InvalidInput(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::IoFailure(e.to_string())
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(e: polars::error::PolarsError) -> Self {
        PipelineError::IoFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
