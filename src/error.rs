//! Error types for the planning pipeline

use thiserror::Error;

/// Errors surfaced by planning requests
#[derive(Error, Debug)]
pub enum PlanningError {
    /// The caller handed the pipeline something it cannot plan with
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The polynomial solver did not converge or rejected its inputs
    #[error("optimization failed: {0}")]
    OptimizationFailed(String),

    /// A downstream sink could not accept a published message
    #[error("publish failed: {0}")]
    PublishFailure(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PlanningError>;
