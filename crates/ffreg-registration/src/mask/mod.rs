//! Region-of-interest masks across resolution levels.
//!
//! - [`eligibility`]: which masks get eroded at a level, from layered
//!   configuration.
//! - [`spatial_object`]: host-side inside/outside queries on a mask.
//! - [`orchestrator`]: per-level mask construction and pyramid buffer
//!   release.

pub mod eligibility;
pub mod orchestrator;
pub mod spatial_object;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use eligibility::{MaskEligibility, MaskEligibilityResolver, MaskResolver};
pub use orchestrator::{erosion_radius, LevelScope, MaskPyramidOrchestrator};
pub use spatial_object::MaskSpatialObject;

/// Which image a mask or pyramid belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageSide {
    Fixed,
    Moving,
}

impl ImageSide {
    /// Capitalised form used inside configuration keys.
    pub fn key_name(self) -> &'static str {
        match self {
            ImageSide::Fixed => "Fixed",
            ImageSide::Moving => "Moving",
        }
    }
}

impl fmt::Display for ImageSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSide::Fixed => write!(f, "fixed"),
            ImageSide::Moving => write!(f, "moving"),
        }
    }
}
