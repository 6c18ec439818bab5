//! Error types for registration operations.
//!
//! Every variant carries the structured context (level, side, mask index,
//! key) a caller needs to log and abort without parsing message strings.

use ffreg_core::GeometryError;
use thiserror::Error;

use crate::mask::ImageSide;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Bad grid or domain input, schedule, or tensor transfer failure.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Two geometries that must agree do not.
    #[error("Geometry mismatch for {what}: expected {expected}, got {actual}")]
    GeometryMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    /// Mask erosion failed or produced an empty mask.
    #[error("Mask erosion failed at level {level} for {side} mask {mask_index}: {reason}")]
    MaskErosion {
        level: usize,
        side: ImageSide,
        mask_index: usize,
        reason: String,
    },

    /// Fixed and moving point sets differ in length.
    #[error("Point count mismatch: {fixed} fixed points, {moving} moving points")]
    PointCountMismatch { fixed: usize, moving: usize },

    /// Parameter vector does not match the transform.
    #[error("Parameter count mismatch: expected {expected}, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    /// A configuration value is present but unusable.
    #[error("Invalid configuration for {key}: {reason}")]
    InvalidConfiguration { key: String, reason: String },

    /// A required configuration key is absent.
    #[error("Missing required parameter {key}")]
    MissingParameter { key: String },

    /// Level outside the resolution schedule.
    #[error("Level {level} out of range ({levels} levels)")]
    LevelOutOfRange { level: usize, levels: usize },

    /// A component was used before its lifecycle set it up.
    #[error("{component} is not initialized: {reason}")]
    NotInitialized { component: &'static str, reason: String },

    /// Failure reported by the external optimizer.
    #[error("Optimizer error: {0}")]
    Optimizer(String),

    /// A level failed and the registration stopped.
    #[error("Registration aborted at level {level}: {source}")]
    Aborted {
        level: usize,
        #[source]
        source: Box<RegistrationError>,
    },
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a geometry mismatch error.
    pub fn geometry_mismatch(what: impl Into<String>, expected: impl ToString, actual: impl ToString) -> Self {
        Self::GeometryMismatch {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a mask erosion error.
    pub fn mask_erosion(level: usize, side: ImageSide, mask_index: usize, reason: impl Into<String>) -> Self {
        Self::MaskErosion {
            level,
            side,
            mask_index,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-initialized error.
    pub fn not_initialized(component: &'static str, reason: impl Into<String>) -> Self {
        Self::NotInitialized {
            component,
            reason: reason.into(),
        }
    }

    /// Create an optimizer error.
    pub fn optimizer(msg: impl Into<String>) -> Self {
        Self::Optimizer(msg.into())
    }

    /// Wrap an error as the abort reason for a level.
    pub fn aborted(level: usize, source: RegistrationError) -> Self {
        Self::Aborted {
            level,
            source: Box::new(source),
        }
    }

    /// Level at which the registration stopped, if this is an abort.
    pub fn aborted_level(&self) -> Option<usize> {
        match self {
            Self::Aborted { level, .. } => Some(*level),
            _ => None,
        }
    }
}
