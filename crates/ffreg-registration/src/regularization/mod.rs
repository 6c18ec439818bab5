//! Regularization terms on transform parameters.
//!
//! * **RigidityPenaltyTerm**: orthonormality, properness and linearity
//!   conditions on the local Jacobian and Hessians of a B-spline
//!   deformation, weighted by a rigidity coefficient map.

pub mod coefficient_map;
pub mod rigidity;
pub mod trait_;

pub use coefficient_map::CoefficientMap;
pub use rigidity::{RigidityComponents, RigidityPenaltyTerm, RigidityWeights};
pub use trait_::PenaltyTerm;
