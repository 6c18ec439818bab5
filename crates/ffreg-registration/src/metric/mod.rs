//! Cost functions.
//!
//! This module contains the cost contract used by the registration driver
//! and the corresponding-points distance metric.

pub mod corresponding_points;
pub mod trait_;

pub use corresponding_points::{CorrespondingPointsDistanceMetric, DistanceMode};
pub use trait_::{CombinedCost, CostFunction, RegistrationComponent};
