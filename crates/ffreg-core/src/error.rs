//! Error types for geometry, grid and filter operations.

use thiserror::Error;

/// Errors raised while building domains, control grids, pyramids or masks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Non-positive extent, spacing or grid size along an axis.
    #[error("Invalid domain along axis {axis}: {reason}")]
    InvalidDomain { axis: usize, reason: String },

    /// Malformed resolution schedule.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Buffer or parameter length does not match the expected size.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Resolution level outside the schedule.
    #[error("Level {level} out of range ({levels} levels)")]
    LevelOutOfRange { level: usize, levels: usize },

    /// Pyramid level whose buffer was already released.
    #[error("Level {level} buffer already released")]
    BufferReleased { level: usize },

    /// Tensor data could not be moved to or from host memory.
    #[error("Tensor data error: {0}")]
    TensorData(String),
}

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, GeometryError>;

impl GeometryError {
    /// Create an invalid domain error for an axis.
    pub fn invalid_domain(axis: usize, reason: impl Into<String>) -> Self {
        Self::InvalidDomain {
            axis,
            reason: reason.into(),
        }
    }

    /// Create an invalid schedule error.
    pub fn invalid_schedule(msg: impl Into<String>) -> Self {
        Self::InvalidSchedule(msg.into())
    }

    /// Create a tensor data error.
    pub fn tensor_data(msg: impl Into<String>) -> Self {
        Self::TensorData(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_domain_display() {
        let err = GeometryError::invalid_domain(2, "extent must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid domain along axis 2: extent must be positive"
        );
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = GeometryError::DimensionMismatch {
            expected: 12,
            actual: 9,
        };
        assert!(err.to_string().contains("expected 12"));
    }
}
