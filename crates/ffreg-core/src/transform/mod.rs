//! Transform types and operations.
//!
//! This module provides the parametric transform trait and the
//! implementations used during registration.

pub mod bspline;
pub mod trait_;
pub mod translation;

pub use bspline::{BSplineDeformation, SupportWeights};
pub use trait_::{ParameterJacobian, ParametricTransform};
pub use translation::TranslationTransform;
