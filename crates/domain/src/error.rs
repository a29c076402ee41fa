//! Unified error type for domain operations.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DomainError {
    /// Parse error (for value objects and enum names)
    #[error("Parse error: {0}")]
    Parse(String),
}
