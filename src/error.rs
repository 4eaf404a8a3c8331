//! Error module for the Rusty Rates library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq, Clone)]
pub enum RateNetError {
    /// Error for invalid parameters, e.g., a negative in-degree or a non-positive time step.
    InvalidParameter(String),
    /// Error for incompatible dimensions, e.g., latent features that do not match the requested rank.
    DimensionMismatch(String),
    /// Error for a structure tag that cannot be interpreted for a population pair.
    InvalidStructure(String),
    /// Error for a connectivity block written over an already assembled block.
    BlockOverlap(String),
    /// Error for I/O operations.
    IOError(String),
}

impl RateNetError {
    /// Whether the error belongs to the configuration category, i.e., it is raised while building a network.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, RateNetError::IOError(_))
    }
}

impl fmt::Display for RateNetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RateNetError::InvalidParameter(e) => write!(f, "Invalid parameters: {}", e),
            RateNetError::DimensionMismatch(e) => write!(f, "Dimension mismatch: {}", e),
            RateNetError::InvalidStructure(e) => write!(f, "Invalid structure: {}", e),
            RateNetError::BlockOverlap(e) => write!(f, "Overlapping connectivity blocks: {}", e),
            RateNetError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for RateNetError {}
