///! Error types for semantic matching
use resilience_core_types::DriverError;
use thiserror::Error;

/// Errors that can occur during semantic analysis
#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for semantic operations
pub type Result<T> = std::result::Result<T, SemanticError>;
