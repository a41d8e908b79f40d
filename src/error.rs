//! error hierarchy for the fabric numerics

use thiserror::Error;

/// root error type for every fallible fabric operation
#[derive(Error, Debug)]
pub enum FabricError {
    /// invalid configuration value
    #[error("config error: {0}")]
    Config(String),

    /// lattice shape or spacing out of range
    #[error("lattice error: {0}")]
    Lattice(String),

    /// metric components are malformed (asymmetric, non-finite)
    #[error("invalid metric: {0}")]
    InvalidMetric(String),

    /// metric cannot be inverted at a lattice point
    #[error("metric tensor is degenerate at lattice index {index}")]
    DegenerateMetric { index: usize },

    /// metric does not have signature (-,+,+,+)
    #[error("metric tensor is not Lorentzian at lattice index {index}")]
    NonLorentzian { index: usize },

    /// NaN/Inf encountered while the policy is `Reject`
    #[error("non-finite values in {context}: {count} entries")]
    NonFinite { context: String, count: usize },

    /// two arrays that must agree in length do not
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// entity/component bookkeeping failure
    #[error("ecs error: {0}")]
    Ecs(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FabricResult<T> = Result<T, FabricError>;
